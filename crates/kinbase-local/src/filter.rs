//! Filter descriptors and their compilation into a parameterized `WHERE`.
//!
//! Only identifiers are written into the SQL text, always quoted. Every
//! caller-supplied value is bound as a positional `?` parameter, in the order
//! the placeholders appear.

use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde_json::Value;

use crate::coerce;
use crate::error::LocalError;
use crate::schema::{SchemaCatalog, UNICODE_LOWER};

// ─────────────────────────────────────────────
// Descriptors
// ─────────────────────────────────────────────

/// One filter of a query. Filters of a request are ANDed together.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawFilter")]
pub enum Filter {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column IN (values...)`; an empty list matches nothing.
    In { column: String, values: Vec<Value> },
    /// `column IS NULL`
    IsNull { column: String },
    /// Case-insensitive `LIKE`, Unicode-aware.
    ILike { column: String, pattern: String },
    /// Negated comparison on `column`.
    Not { column: String, op: NotOp },
    /// OR-group of comparisons parsed from `column.op.value[,...]`.
    Or(Vec<OrTerm>),
}

/// The comparison under a [`Filter::Not`].
#[derive(Debug, Clone, PartialEq)]
pub enum NotOp {
    /// `column IS NOT NULL`
    IsNull,
    /// `column != value`
    NotEqual(Value),
}

/// One `column.op.value` term of an OR-group.
///
/// The value stays text: OR-groups bypass boolean coercion, so
/// `is_living.eq.true` compares against the string `"true"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrTerm {
    pub column: String,
    pub op: CompareOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    /// Maps an operator code; anything unrecognised is treated as `eq`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            _ => Self::Eq,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq { column: column.into(), value: value.into() }
    }

    pub fn in_list<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull { column: column.into() }
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Self::Not { column: column.into(), op: NotOp::IsNull }
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Not { column: column.into(), op: NotOp::NotEqual(value.into()) }
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::ILike { column: column.into(), pattern: pattern.into() }
    }

    /// Parses an OR condition string such as `father_id.eq.A,mother_id.eq.B`.
    pub fn or(conditions: &str) -> Result<Self, LocalError> {
        parse_or_conditions(conditions).map(Self::Or)
    }
}

/// Splits `column.op.value[,column.op.value...]` into terms.
///
/// Values may contain periods (`birth_date.gte.1900.01.01` keeps
/// `1900.01.01`). Values may not contain commas.
pub fn parse_or_conditions(conditions: &str) -> Result<Vec<OrTerm>, LocalError> {
    conditions
        .split(',')
        .map(|segment| {
            let mut parts = segment.split('.');
            let column = parts.next().unwrap_or_default().trim();
            let op = parts.next();
            let value: Vec<&str> = parts.collect();
            match op {
                Some(op) if !column.is_empty() && !value.is_empty() => Ok(OrTerm {
                    column: column.to_string(),
                    op: CompareOp::from_code(op),
                    value: value.join("."),
                }),
                _ => Err(LocalError::InvalidFilter(format!(
                    "malformed or-condition '{segment}', expected column.op.value"
                ))),
            }
        })
        .collect()
}

// ─────────────────────────────────────────────
// Wire form
// ─────────────────────────────────────────────

/// Loose JSON shape of a filter, as sent by the application:
/// `{"type": "eq", "column": "id", "value": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFilter {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub conditions: Option<String>,
}

impl TryFrom<RawFilter> for Filter {
    type Error = LocalError;

    fn try_from(raw: RawFilter) -> Result<Self, Self::Error> {
        let kind = raw.kind.as_str();
        if kind == "or" {
            let conditions = raw
                .conditions
                .or_else(|| raw.value.as_str().map(str::to_string))
                .ok_or_else(|| LocalError::InvalidFilter("or filter needs 'conditions'".into()))?;
            return Filter::or(&conditions);
        }

        let column = raw
            .column
            .ok_or_else(|| LocalError::InvalidFilter(format!("{kind} filter needs a 'column'")))?;

        match kind {
            "eq" => Ok(Filter::Eq { column, value: raw.value }),
            "in" => {
                let values = match (raw.values, raw.value) {
                    (Some(values), _) => values,
                    (None, Value::Array(values)) => values,
                    (None, Value::Null) => Vec::new(),
                    (None, other) => {
                        return Err(LocalError::InvalidFilter(format!(
                            "in filter on '{column}' needs a list, got {other}"
                        )))
                    }
                };
                Ok(Filter::In { column, values })
            }
            "is" => match raw.value {
                Value::Null => Ok(Filter::IsNull { column }),
                other => Err(LocalError::InvalidFilter(format!(
                    "only 'is null' is supported, got is {other} on '{column}'"
                ))),
            },
            "ilike" => match raw.value {
                Value::String(pattern) => Ok(Filter::ILike { column, pattern }),
                other => Err(LocalError::InvalidFilter(format!(
                    "ilike on '{column}' needs a string pattern, got {other}"
                ))),
            },
            "not" => match raw.operator.as_deref() {
                Some("is") if raw.value.is_null() => Ok(Filter::Not { column, op: NotOp::IsNull }),
                Some("eq") | Some("neq") => Ok(Filter::Not { column, op: NotOp::NotEqual(raw.value) }),
                other => Err(LocalError::InvalidFilter(format!(
                    "unsupported negation {other:?} on '{column}'"
                ))),
            },
            other => Err(LocalError::InvalidFilter(format!("unknown filter type '{other}'"))),
        }
    }
}

// ─────────────────────────────────────────────
// Compilation
// ─────────────────────────────────────────────

/// A compiled predicate: either empty, or ` WHERE ...` with its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<SqlValue>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }
}

/// Quotes an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Compiles `filters` against `table` into a single ANDed predicate.
///
/// No filters yields an empty predicate, which matches every row.
pub fn build(filters: &[Filter], table: &str, catalog: &SchemaCatalog) -> Predicate {
    if filters.is_empty() {
        return Predicate::default();
    }

    let mut params = Vec::new();
    let conditions: Vec<String> = filters
        .iter()
        .map(|filter| compile(filter, table, catalog, &mut params))
        .collect();

    Predicate {
        clause: format!(" WHERE {}", conditions.join(" AND ")),
        params,
    }
}

fn compile(filter: &Filter, table: &str, catalog: &SchemaCatalog, params: &mut Vec<SqlValue>) -> String {
    let bind = |column: &str, value: &Value| coerce::to_sql(&coerce::filter_value(catalog, table, column, value));

    match filter {
        Filter::Eq { column, value } => {
            params.push(bind(column, value));
            format!("{} = ?", quote_ident(column))
        }
        Filter::In { column, values } => {
            if values.is_empty() {
                return "1 = 0".to_string();
            }
            params.extend(values.iter().map(|v| bind(column, v)));
            let placeholders = vec!["?"; values.len()].join(", ");
            format!("{} IN ({})", quote_ident(column), placeholders)
        }
        Filter::IsNull { column } => format!("{} IS NULL", quote_ident(column)),
        Filter::ILike { column, pattern } => {
            params.push(SqlValue::Text(pattern.clone()));
            format!("{UNICODE_LOWER}({}) LIKE {UNICODE_LOWER}(?)", quote_ident(column))
        }
        Filter::Not { column, op: NotOp::IsNull } => format!("{} IS NOT NULL", quote_ident(column)),
        Filter::Not { column, op: NotOp::NotEqual(value) } => {
            params.push(bind(column, value));
            format!("{} != ?", quote_ident(column))
        }
        Filter::Or(terms) => {
            let parts: Vec<String> = terms
                .iter()
                .map(|term| {
                    params.push(SqlValue::Text(term.value.clone()));
                    format!("{} {} ?", quote_ident(&term.column), term.op.sql())
                })
                .collect();
            format!("({})", parts.join(" OR "))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::TableMeta;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new().with_table(
            "persons",
            TableMeta {
                boolean_columns: &["is_living"],
                document_columns: &[],
                tracks_updated_at: true,
            },
        )
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn no_filters_is_empty_predicate() {
        let p = build(&[], "persons", &catalog());
        assert!(p.is_empty());
        assert!(p.params.is_empty());
    }

    #[test]
    fn filters_are_anded_in_order() {
        let p = build(
            &[Filter::eq("last_name", "Curie"), Filter::not_null("birth_date")],
            "persons",
            &catalog(),
        );
        assert_eq!(p.clause, r#" WHERE "last_name" = ? AND "birth_date" IS NOT NULL"#);
        assert_eq!(p.params, vec![text("Curie")]);
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let p = build(&[Filter::In { column: "id".into(), values: vec![] }], "persons", &catalog());
        assert_eq!(p.clause, " WHERE 1 = 0");
        assert!(p.params.is_empty());
    }

    #[test]
    fn in_list_binds_each_value() {
        let p = build(&[Filter::in_list("id", ["a", "b", "c"])], "persons", &catalog());
        assert_eq!(p.clause, r#" WHERE "id" IN (?, ?, ?)"#);
        assert_eq!(p.params, vec![text("a"), text("b"), text("c")]);
    }

    #[test]
    fn booleans_are_coerced_on_boolean_columns() {
        let p = build(
            &[Filter::eq("is_living", true), Filter::neq("is_living", false)],
            "persons",
            &catalog(),
        );
        assert_eq!(p.params, vec![SqlValue::Integer(1), SqlValue::Integer(0)]);
    }

    #[test]
    fn null_tests_have_no_params() {
        let p = build(&[Filter::is_null("death_date")], "persons", &catalog());
        assert_eq!(p.clause, r#" WHERE "death_date" IS NULL"#);
        assert!(p.params.is_empty());
    }

    #[test]
    fn ilike_lowercases_both_sides() {
        let p = build(&[Filter::ilike("first_name", "%émi%")], "persons", &catalog());
        assert_eq!(
            p.clause,
            r#" WHERE unicode_lower("first_name") LIKE unicode_lower(?)"#
        );
        assert_eq!(p.params, vec![text("%émi%")]);
    }

    #[test]
    fn or_group_compiles_to_parenthesized_terms() {
        let filter = Filter::or("father_id.eq.A,mother_id.eq.B").unwrap();
        let p = build(&[filter], "families", &catalog());
        assert_eq!(p.clause, r#" WHERE ("father_id" = ? OR "mother_id" = ?)"#);
        assert_eq!(p.params, vec![text("A"), text("B")]);
    }

    #[test]
    fn or_values_keep_their_periods() {
        let terms = parse_or_conditions("birth_date.gte.1900.01.01,notes.like.a.b").unwrap();
        assert_eq!(terms[0].value, "1900.01.01");
        assert_eq!(terms[0].op, CompareOp::Gte);
        // unknown operator codes fall back to equality
        assert_eq!(terms[1].op, CompareOp::Eq);
        assert_eq!(terms[1].value, "a.b");
    }

    #[test]
    fn or_values_are_not_coerced() {
        let filter = Filter::or("is_living.eq.true").unwrap();
        let p = build(&[filter], "persons", &catalog());
        assert_eq!(p.params, vec![text("true")]);
    }

    #[test]
    fn malformed_or_is_rejected() {
        assert!(Filter::or("father_id.eq").is_err());
        assert!(Filter::or("father_id.eq.A,").is_err());
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("order"), r#""order""#);
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
        let p = build(&[Filter::eq("x\" OR 1=1 --", "v")], "persons", &catalog());
        assert_eq!(p.clause, r#" WHERE "x"" OR 1=1 --" = ?"#);
    }

    #[test]
    fn wire_descriptors_are_validated() {
        let f: Filter = serde_json::from_value(json!({"type": "eq", "column": "id", "value": "p1"})).unwrap();
        assert_eq!(f, Filter::eq("id", "p1"));

        let f: Filter = serde_json::from_value(json!({"type": "in", "column": "id", "value": []})).unwrap();
        assert_eq!(f, Filter::In { column: "id".into(), values: vec![] });

        let f: Filter = serde_json::from_value(json!({"type": "not", "column": "d", "operator": "is", "value": null})).unwrap();
        assert_eq!(f, Filter::not_null("d"));

        let f: Filter = serde_json::from_value(json!({"type": "or", "conditions": "a.eq.1,b.eq.2"})).unwrap();
        assert!(matches!(f, Filter::Or(ref terms) if terms.len() == 2));

        assert!(serde_json::from_value::<Filter>(json!({"type": "is", "column": "d", "value": true})).is_err());
        assert!(serde_json::from_value::<Filter>(json!({"type": "gt", "column": "d", "value": 1})).is_err());
        assert!(serde_json::from_value::<Filter>(json!({"type": "eq", "value": 1})).is_err());
    }
}
