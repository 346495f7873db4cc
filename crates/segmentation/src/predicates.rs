//! Filter conditions and their evaluation against dataset rows.

use std::cmp::Ordering;

use datalens_core::value::{display_string, parse_date, parse_strict, to_number, value_date};
use datalens_core::{value_of, EngineError, EngineResult, Row};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::inference::ColumnProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Between,
    InList,
    Contains,
    DateBetween,
    /// Any operator name this engine does not know. Never filters out a row.
    #[serde(other)]
    Unknown,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::LessThan => "less_than",
            FilterOperator::Between => "between",
            FilterOperator::InList => "in_list",
            FilterOperator::Contains => "contains",
            FilterOperator::DateBetween => "date_between",
            FilterOperator::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    pub id: String,
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub value2: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub values: Vec<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub date_from: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub date_to: Option<String>,
}

impl FilterCondition {
    pub fn new(
        id: impl Into<String>,
        column: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            column: column.into(),
            operator,
            value: value.into(),
            value2: None,
            values: Vec::new(),
            date_from: None,
            date_to: None,
        }
    }

    pub fn between(
        id: impl Into<String>,
        column: impl Into<String>,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> Self {
        Self::new(id, column, FilterOperator::Between, low).with_value2(high)
    }

    pub fn in_list(id: impl Into<String>, column: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(id, column, FilterOperator::InList, "").with_values(values)
    }

    pub fn date_between(
        id: impl Into<String>,
        column: impl Into<String>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Self {
        let mut condition = Self::new(id, column, FilterOperator::DateBetween, "");
        condition.date_from = from.map(str::to_string);
        condition.date_to = to.map(str::to_string);
        condition
    }

    pub fn with_value2(mut self, value2: impl Into<String>) -> Self {
        self.value2 = Some(value2.into());
        self
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }

    /// Reject conditions whose operator is missing the values it needs.
    pub fn validate(&self) -> EngineResult<()> {
        match self.operator {
            FilterOperator::Equals
            | FilterOperator::NotEquals
            | FilterOperator::GreaterThan
            | FilterOperator::LessThan
            | FilterOperator::Contains => {
                if self.value.trim().is_empty() {
                    return Err(EngineError::malformed(&self.id, "value is required"));
                }
            }
            FilterOperator::Between => {
                if parse_strict(&self.value).is_nan() {
                    return Err(EngineError::malformed(
                        &self.id,
                        "between requires a numeric lower bound",
                    ));
                }
                if let Some(high) = non_empty(&self.value2) {
                    if parse_strict(high).is_nan() {
                        return Err(EngineError::malformed(
                            &self.id,
                            "between upper bound must be numeric",
                        ));
                    }
                }
            }
            FilterOperator::InList => {
                if self.values.is_empty() {
                    return Err(EngineError::malformed(&self.id, "values list is empty"));
                }
            }
            FilterOperator::DateBetween => {
                let from = non_empty(&self.date_from);
                let to = non_empty(&self.date_to);
                if from.is_none() && to.is_none() {
                    return Err(EngineError::malformed(
                        &self.id,
                        "date_between requires dateFrom or dateTo",
                    ));
                }
                for bound in [from, to].into_iter().flatten() {
                    if parse_date(bound).is_none() {
                        return Err(EngineError::malformed(
                            &self.id,
                            format!("unparsable date bound '{bound}'"),
                        ));
                    }
                }
            }
            FilterOperator::Unknown => {}
        }
        Ok(())
    }

    /// Evaluate against one row. Assumes the condition passed [`validate`].
    ///
    /// [`validate`]: FilterCondition::validate
    pub fn matches(&self, row: &Row) -> bool {
        let actual = value_of(row, &self.column);
        match self.operator {
            FilterOperator::Equals => display_string(actual) == self.value,
            FilterOperator::NotEquals => display_string(actual) != self.value,
            FilterOperator::Contains => display_string(actual)
                .to_lowercase()
                .contains(&self.value.to_lowercase()),
            FilterOperator::GreaterThan => {
                compare_ordered(actual, &self.value) == Some(Ordering::Greater)
            }
            FilterOperator::LessThan => compare_ordered(actual, &self.value) == Some(Ordering::Less),
            FilterOperator::Between => {
                let low = parse_strict(&self.value);
                let high = non_empty(&self.value2).map(parse_strict).unwrap_or(low);
                let n = to_number(actual);
                // NaN on any side fails both comparisons.
                n >= low && n <= high
            }
            FilterOperator::InList => {
                let actual = display_string(actual);
                self.values.iter().any(|v| *v == actual)
            }
            FilterOperator::DateBetween => {
                let (Some(from), Some(to)) = (non_empty(&self.date_from), non_empty(&self.date_to))
                else {
                    return true;
                };
                match (value_date(actual), parse_date(from), parse_date(to)) {
                    (Some(d), Some(from), Some(to)) => from <= d && d <= to,
                    _ => false,
                }
            }
            FilterOperator::Unknown => true,
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

/// Numeric ordering when both sides are numbers, date ordering when both are
/// dates, otherwise no ordering at all.
fn compare_ordered(actual: &serde_json::Value, expected: &str) -> Option<Ordering> {
    let a = to_number(actual);
    let b = parse_strict(expected);
    if !a.is_nan() && !b.is_nan() {
        return a.partial_cmp(&b);
    }
    let a = value_date(actual)?;
    let b = parse_date(expected)?;
    Some(a.cmp(&b))
}

pub fn validate_conditions(conditions: &[FilterCondition]) -> EngineResult<()> {
    conditions.iter().try_for_each(FilterCondition::validate)
}

/// Structural validation plus column existence and operator legality for the
/// column's inferred kind.
pub fn validate_against_profiles(
    conditions: &[FilterCondition],
    profiles: &[ColumnProfile],
) -> EngineResult<()> {
    for condition in conditions {
        condition.validate()?;
        let profile = profiles
            .iter()
            .find(|p| p.name == condition.column)
            .ok_or_else(|| EngineError::UnknownColumn(condition.column.clone()))?;
        if condition.operator != FilterOperator::Unknown && !profile.kind.allows(&condition.operator)
        {
            return Err(EngineError::OperatorNotAllowed {
                column: condition.column.clone(),
                kind: profile.kind.to_string(),
                operator: condition.operator.as_str().to_string(),
            });
        }
    }
    Ok(())
}

/// A row passes a condition set only if it passes every condition.
pub fn matches_all(row: &Row, conditions: &[FilterCondition]) -> bool {
    conditions.iter().all(|c| c.matches(row))
}

/// Rows satisfying every condition, as new records.
pub fn evaluate_filters(rows: &[Row], conditions: &[FilterCondition]) -> EngineResult<Vec<Row>> {
    validate_conditions(conditions)?;
    let kept: Vec<Row> = rows
        .iter()
        .filter(|row| matches_all(row, conditions))
        .cloned()
        .collect();
    debug!(
        conditions = conditions.len(),
        input_rows = rows.len(),
        kept_rows = kept.len(),
        "Filters applied"
    );
    Ok(kept)
}

fn scalar_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        other => Some(display_string(&other)),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_to_string(value))
}

fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(scalar_to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ColumnKind;
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_equals_is_string_coerced() {
        let cond = FilterCondition::new("f", "qty", FilterOperator::Equals, "5");
        assert!(cond.matches(&row(&[("qty", json!(5))])));
        assert!(cond.matches(&row(&[("qty", json!("5"))])));
        assert!(!cond.matches(&row(&[("qty", json!(6))])));

        let cond = FilterCondition::new("f", "qty", FilterOperator::NotEquals, "5");
        assert!(cond.matches(&row(&[("qty", json!(6))])));
        assert!(cond.matches(&row(&[])));
    }

    #[test]
    fn test_null_renders_as_empty_string() {
        let null_row = row(&[("status", serde_json::Value::Null)]);
        let missing_row = row(&[]);

        let literal_null = FilterCondition::new("f", "status", FilterOperator::Equals, "null");
        assert!(!literal_null.matches(&null_row));
        assert!(!literal_null.matches(&missing_row));
        assert!(literal_null.matches(&row(&[("status", json!("null"))])));

        let listed = FilterCondition::in_list("f", "status", vec!["null".into()]);
        assert!(!listed.matches(&null_row));

        let fragment = FilterCondition::new("f", "status", FilterOperator::Contains, "nul");
        assert!(!fragment.matches(&null_row));

        let not_null = FilterCondition::new("f", "status", FilterOperator::NotEquals, "null");
        assert!(not_null.matches(&null_row));
    }

    #[test]
    fn test_contains_ignores_case() {
        let cond = FilterCondition::new("f", "name", FilterOperator::Contains, "WID");
        assert!(cond.matches(&row(&[("name", json!("Blue widget"))])));
        assert!(!cond.matches(&row(&[("name", json!("gadget"))])));
    }

    #[test]
    fn test_ordering_fails_on_non_numeric() {
        let gt = FilterCondition::new("f", "price", FilterOperator::GreaterThan, "10");
        assert!(gt.matches(&row(&[("price", json!(11))])));
        assert!(gt.matches(&row(&[("price", json!("10.5"))])));
        assert!(!gt.matches(&row(&[("price", json!(10))])));
        assert!(!gt.matches(&row(&[("price", json!("n/a"))])));
        assert!(!gt.matches(&row(&[])));

        let lt = FilterCondition::new("f", "price", FilterOperator::LessThan, "10");
        assert!(lt.matches(&row(&[("price", json!(-1))])));
        assert!(!lt.matches(&row(&[("price", json!("n/a"))])));
    }

    #[test]
    fn test_ordering_on_dates() {
        let after = FilterCondition::new("f", "day", FilterOperator::GreaterThan, "2024-01-01");
        assert!(after.matches(&row(&[("day", json!("2024-01-02"))])));
        assert!(after.matches(&row(&[("day", json!("02/01/2024"))])));
        assert!(!after.matches(&row(&[("day", json!("2023-12-31"))])));

        let before = FilterCondition::new("f", "day", FilterOperator::LessThan, "2024-01-01");
        assert!(before.matches(&row(&[("day", json!("2023-12-31"))])));
    }

    #[test]
    fn test_between_is_inclusive() {
        let cond = FilterCondition::between("f", "amount", "10", "20");
        assert!(cond.matches(&row(&[("amount", json!(10))])));
        assert!(cond.matches(&row(&[("amount", json!(20))])));
        assert!(cond.matches(&row(&[("amount", json!("15"))])));
        assert!(!cond.matches(&row(&[("amount", json!(20.01))])));
        assert!(!cond.matches(&row(&[("amount", json!("abc"))])));
    }

    #[test]
    fn test_between_without_upper_is_exact() {
        let cond = FilterCondition::new("f", "amount", FilterOperator::Between, "10");
        assert!(cond.matches(&row(&[("amount", json!(10))])));
        assert!(!cond.matches(&row(&[("amount", json!(11))])));
    }

    #[test]
    fn test_in_list() {
        let cond = FilterCondition::in_list("f", "status", vec!["A".into(), "C".into()]);
        assert!(cond.matches(&row(&[("status", json!("A"))])));
        assert!(!cond.matches(&row(&[("status", json!("B"))])));
    }

    #[test]
    fn test_date_between() {
        let cond =
            FilterCondition::date_between("f", "day", Some("2024-01-01"), Some("2024-01-31"));
        assert!(cond.matches(&row(&[("day", json!("2024-01-01"))])));
        assert!(cond.matches(&row(&[("day", json!("2024-01-31"))])));
        assert!(!cond.matches(&row(&[("day", json!("2024-02-01"))])));
        assert!(!cond.matches(&row(&[("day", json!("soon"))])));

        // A single bound is accepted but matches every row.
        let open = FilterCondition::date_between("f", "day", Some("2024-01-01"), None);
        assert!(open.validate().is_ok());
        assert!(open.matches(&row(&[("day", json!("1999-01-01"))])));
    }

    #[test]
    fn test_unknown_operator_passes_everything() {
        let cond: FilterCondition = serde_json::from_value(json!({
            "id": "f",
            "column": "x",
            "operator": "starts_with",
            "value": "a"
        }))
        .unwrap();
        assert_eq!(cond.operator, FilterOperator::Unknown);
        assert!(cond.validate().is_ok());
        assert!(cond.matches(&row(&[("x", json!("zzz"))])));
    }

    #[test]
    fn test_malformed_conditions_rejected() {
        let missing = FilterCondition::new("f1", "x", FilterOperator::Equals, "");
        assert!(matches!(
            missing.validate(),
            Err(EngineError::MalformedCondition { ref id, .. }) if id == "f1"
        ));

        let empty_list = FilterCondition::in_list("f2", "x", vec![]);
        assert!(empty_list.validate().is_err());

        let no_bounds = FilterCondition::date_between("f3", "x", None, None);
        assert!(no_bounds.validate().is_err());

        let bad_date = FilterCondition::date_between("f4", "x", Some("someday"), None);
        assert!(bad_date.validate().is_err());

        let bad_between = FilterCondition::between("f5", "x", "low", "20");
        assert!(bad_between.validate().is_err());

        let rows = vec![row(&[("x", json!(1))])];
        assert!(evaluate_filters(&rows, &[missing]).is_err());
    }

    #[test]
    fn test_deserialize_numeric_values() {
        let cond: FilterCondition = serde_json::from_value(json!({
            "id": "f",
            "column": "amount",
            "operator": "between",
            "value": 10,
            "value2": 20.5,
            "values": null
        }))
        .unwrap();
        assert_eq!(cond.value, "10");
        assert_eq!(cond.value2.as_deref(), Some("20.5"));
        assert!(cond.values.is_empty());
    }

    #[test]
    fn test_validate_against_profiles() {
        let profiles = vec![ColumnProfile {
            name: "status".into(),
            kind: ColumnKind::Categorical,
            min_value: None,
            max_value: None,
            categories: Some(vec!["A".into()]),
            unique_value_count: 1,
        }];
        let ok = FilterCondition::in_list("f", "status", vec!["A".into()]);
        assert!(validate_against_profiles(&[ok], &profiles).is_ok());

        let illegal = FilterCondition::new("f", "status", FilterOperator::GreaterThan, "1");
        assert!(matches!(
            validate_against_profiles(&[illegal], &profiles),
            Err(EngineError::OperatorNotAllowed { .. })
        ));

        let unknown = FilterCondition::new("f", "ghost", FilterOperator::Equals, "1");
        assert!(matches!(
            validate_against_profiles(&[unknown], &profiles),
            Err(EngineError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_evaluate_filters_and_semantics() {
        let rows = vec![
            row(&[("status", json!("A")), ("amount", json!(15))]),
            row(&[("status", json!("A")), ("amount", json!(25))]),
            row(&[("status", json!("B")), ("amount", json!(12))]),
        ];
        let conditions = vec![
            FilterCondition::new("s", "status", FilterOperator::Equals, "A"),
            FilterCondition::between("a", "amount", "10", "20"),
        ];
        let kept = evaluate_filters(&rows, &conditions).unwrap();
        assert_eq!(kept, vec![rows[0].clone()]);
    }

    #[test]
    fn test_empty_condition_set_keeps_all() {
        let rows = vec![row(&[("x", json!(1))]), row(&[])];
        assert_eq!(evaluate_filters(&rows, &[]).unwrap().len(), 2);
    }
}
