//! Rule-based segmentation.
//!
//! Rules are small boolean expressions over column values, e.g.
//! `quantity > 100 and price < 50`. They are parsed into an [`Expr`] tree and
//! evaluated against each row; nothing in a rule is ever executed as code.
//!
//! Grammar:
//!
//! ```text
//! expr       := and ( ("or" | "||") and )*
//! and        := not ( ("and" | "&&") not )*
//! not        := ("not" | "!") not | comparison
//! comparison := primary ( cmp_op primary )?
//! primary    := number | string | true | false | null | column | "(" expr ")"
//! cmp_op     := "==" | "!=" | ">" | "<" | ">=" | "<="
//! ```
//!
//! Column names are matched whole-word against the dataset's column list,
//! longest first, so names containing spaces work unquoted.

use std::cmp::Ordering;

use datalens_core::value::parse_strict;
use datalens_core::{value_of, Row};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleError {
    #[error("empty rule")]
    Empty,
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of rule")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Ge => ordering != Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Scalar {
    /// Row values become numbers when they are numeric, strings otherwise.
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => Scalar::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => {
                let n = parse_strict(s);
                if n.is_nan() {
                    Scalar::Str(s.clone())
                } else {
                    Scalar::Number(n)
                }
            }
            other => Scalar::Str(other.to_string()),
        }
    }

    fn as_number(&self) -> f64 {
        match self {
            Scalar::Number(n) => *n,
            Scalar::Bool(b) => f64::from(u8::from(*b)),
            Scalar::Str(s) => parse_strict(s),
            Scalar::Null => f64::NAN,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Scalar::Number(n) => *n != 0.0 && !n.is_nan(),
            Scalar::Str(s) => !s.is_empty(),
            Scalar::Bool(b) => *b,
            Scalar::Null => false,
        }
    }
}

fn loose_eq(left: &Scalar, right: &Scalar) -> bool {
    match (left, right) {
        (Scalar::Null, Scalar::Null) => true,
        (Scalar::Null, _) | (_, Scalar::Null) => false,
        (Scalar::Str(a), Scalar::Str(b)) => a == b,
        _ => left.as_number() == right.as_number(),
    }
}

fn ordering(left: &Scalar, right: &Scalar) -> Option<Ordering> {
    match (left, right) {
        (Scalar::Null, _) | (_, Scalar::Null) => None,
        (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
        _ => left.as_number().partial_cmp(&right.as_number()),
    }
}

fn compare(left: &Scalar, op: CmpOp, right: &Scalar) -> bool {
    match op {
        CmpOp::Eq => loose_eq(left, right),
        CmpOp::Ne => !loose_eq(left, right),
        _ => ordering(left, right).is_some_and(|o| op.accepts(o)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    Column(String),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn parse(input: &str, columns: &[String]) -> Result<Expr, RuleError> {
        let tokens = tokenize(input, columns)?;
        if tokens.is_empty() {
            return Err(RuleError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(RuleError::UnexpectedToken(token.to_string())),
        }
    }

    pub fn eval(&self, row: &Row) -> Scalar {
        match self {
            Expr::Literal(s) => s.clone(),
            Expr::Column(name) => Scalar::from_value(value_of(row, name)),
            Expr::Compare(l, op, r) => Scalar::Bool(compare(&l.eval(row), *op, &r.eval(row))),
            Expr::And(l, r) => Scalar::Bool(l.eval(row).truthy() && r.eval(row).truthy()),
            Expr::Or(l, r) => Scalar::Bool(l.eval(row).truthy() || r.eval(row).truthy()),
            Expr::Not(inner) => Scalar::Bool(!inner.eval(row).truthy()),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.eval(row).truthy()
    }
}

// --- tokenizer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Column(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Op(CmpOp),
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Column(c) => f.write_str(c),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Null => f.write_str("null"),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Not => f.write_str("not"),
            Token::Op(op) => f.write_str(match op {
                CmpOp::Eq => "==",
                CmpOp::Ne => "!=",
                CmpOp::Gt => ">",
                CmpOp::Lt => "<",
                CmpOp::Ge => ">=",
                CmpOp::Le => "<=",
            }),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// Symbol table, longest spelling first.
const SYMBOLS: [(&str, Option<CmpOp>); 13] = [
    ("===", Some(CmpOp::Eq)),
    ("!==", Some(CmpOp::Ne)),
    ("==", Some(CmpOp::Eq)),
    ("!=", Some(CmpOp::Ne)),
    (">=", Some(CmpOp::Ge)),
    ("<=", Some(CmpOp::Le)),
    ("&&", None),
    ("||", None),
    (">", Some(CmpOp::Gt)),
    ("<", Some(CmpOp::Lt)),
    ("!", None),
    ("(", None),
    (")", None),
];

fn symbol_token(symbol: &str, op: Option<CmpOp>) -> Token {
    match (symbol, op) {
        (_, Some(op)) => Token::Op(op),
        ("&&", None) => Token::And,
        ("||", None) => Token::Or,
        ("!", None) => Token::Not,
        ("(", None) => Token::LParen,
        _ => Token::RParen,
    }
}

/// Byte length of the number literal at the start of `rest`: a sign or digit,
/// more digits and dots, then an optional `e[+-]digits` exponent.
fn number_len(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut end = 1;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            end = exp;
        }
    }
    end
}

fn tokenize(input: &str, columns: &[String]) -> Result<Vec<Token>, RuleError> {
    let mut by_length: Vec<&String> = columns.iter().filter(|c| !c.is_empty()).collect();
    by_length.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut tokens = Vec::new();
    let mut pos = 0;

    'outer: while pos < input.len() {
        let rest = &input[pos..];
        let Some(c) = rest.chars().next() else { break };

        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }

        if c == '"' || c == '\'' {
            let body = &rest[1..];
            let end = body.find(c).ok_or(RuleError::UnterminatedString)?;
            tokens.push(Token::Str(body[..end].to_string()));
            pos += end + 2;
            continue;
        }

        for column in &by_length {
            if rest.starts_with(column.as_str()) {
                let after = rest[column.len()..].chars().next();
                let ends_in_word = column.chars().last().is_some_and(is_word_char);
                if !(ends_in_word && after.is_some_and(is_word_char)) {
                    tokens.push(Token::Column((*column).clone()));
                    pos += column.len();
                    continue 'outer;
                }
            }
        }

        let starts_number = c.is_ascii_digit()
            || ((c == '-' || c == '.')
                && rest[1..].chars().next().is_some_and(|n| n.is_ascii_digit()));
        if starts_number {
            let len = number_len(rest);
            let literal = &rest[..len];
            let n = literal
                .parse::<f64>()
                .map_err(|_| RuleError::UnexpectedToken(literal.to_string()))?;
            tokens.push(Token::Number(n));
            pos += len;
            continue;
        }

        if let Some((symbol, op)) = SYMBOLS.iter().find(|(s, _)| rest.starts_with(s)) {
            tokens.push(symbol_token(symbol, *op));
            pos += symbol.len();
            continue;
        }

        if is_word_char(c) {
            let len = rest
                .char_indices()
                .find(|(_, ch)| !is_word_char(*ch))
                .map_or(rest.len(), |(i, _)| i);
            let word = &rest[..len];
            let token = match word.to_ascii_lowercase().as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => return Err(RuleError::UnknownIdentifier(word.to_string())),
            };
            tokens.push(token);
            pos += len;
            continue;
        }

        return Err(RuleError::UnexpectedChar(c, pos));
    }

    Ok(tokens)
}

// --- recursive descent parser ---

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, RuleError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, RuleError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, RuleError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, RuleError> {
        let left = self.parse_primary()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, RuleError> {
        match self.next().ok_or(RuleError::UnexpectedEnd)? {
            Token::Number(n) => Ok(Expr::Literal(Scalar::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Scalar::Str(s))),
            Token::True => Ok(Expr::Literal(Scalar::Bool(true))),
            Token::False => Ok(Expr::Literal(Scalar::Bool(false))),
            Token::Null => Ok(Expr::Literal(Scalar::Null)),
            Token::Column(name) => Ok(Expr::Column(name)),
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(RuleError::UnexpectedToken(other.to_string())),
                    None => Err(RuleError::UnexpectedEnd),
                }
            }
            other => Err(RuleError::UnexpectedToken(other.to_string())),
        }
    }
}

// --- segmentation ---

/// A rule as written plus its compiled form. A rule that fails to compile
/// never matches.
#[derive(Debug, Clone)]
pub struct Rule {
    pub text: String,
    compiled: Result<Expr, RuleError>,
}

impl Rule {
    pub fn compile(text: impl Into<String>, columns: &[String]) -> Self {
        let text = text.into();
        let compiled = Expr::parse(&text, columns);
        if let Err(err) = &compiled {
            warn!(rule = %text, error = %err, "Rule failed to parse, it will match no rows");
        }
        Self { text, compiled }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.compiled.as_ref().is_ok_and(|expr| expr.matches(row))
    }

    pub fn error(&self) -> Option<&RuleError> {
        self.compiled.as_ref().err()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleFit {
    /// Segment per row: the first matching rule's index, or `rule_count` for
    /// rows that matched nothing.
    pub assignments: Vec<usize>,
    pub rule_count: usize,
}

impl RuleFit {
    pub fn default_count(&self) -> usize {
        self.assignments
            .iter()
            .filter(|&&a| a == self.rule_count)
            .count()
    }
}

/// Assign each row to the first rule it satisfies.
pub fn rule_segments(rows: &[Row], rules: &[String], columns: &[String]) -> RuleFit {
    let compiled: Vec<Rule> = rules
        .iter()
        .map(|text| Rule::compile(text.as_str(), columns))
        .collect();

    let assignments: Vec<usize> = rows
        .iter()
        .map(|row| {
            compiled
                .iter()
                .position(|rule| rule.matches(row))
                .unwrap_or(compiled.len())
        })
        .collect();

    let fit = RuleFit {
        assignments,
        rule_count: compiled.len(),
    };
    debug!(
        rules = fit.rule_count,
        rows = rows.len(),
        unmatched = fit.default_count(),
        "Rules evaluated"
    );
    fit
}
