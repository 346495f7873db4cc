pub mod config;
pub mod error;
pub mod types;
pub mod value;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use types::{value_of, Dataset, Row};
