//! SOQL query building
//!
//! Builds `SELECT` statements from an object name, a field list, structured
//! conditions and an optional raw filter. Identifiers are validated and
//! literals escaped; a raw `WHERE` clause supplied by a tool caller is passed
//! through as-is.

use crate::error::{Result, SalesforceMcpError, ValidationError};

/// A single structured condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `field = 'value'`
    Equals { field: String, value: String },

    /// `field LIKE '%term%'`, with wildcards in `term` escaped
    Contains { field: String, term: String },
}

impl Condition {
    /// Exact match
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Substring match
    pub fn contains(field: impl Into<String>, term: impl Into<String>) -> Self {
        Condition::Contains {
            field: field.into(),
            term: term.into(),
        }
    }

    fn to_soql(&self) -> Result<String> {
        match self {
            Condition::Equals { field, value } => {
                validate_identifier(field)?;
                Ok(format!("{} = '{}'", field, escape_literal(value)))
            }
            Condition::Contains { field, term } => {
                validate_identifier(field)?;
                Ok(format!("{} LIKE '%{}%'", field, escape_like(term)))
            }
        }
    }
}

/// A `SELECT` over one object
#[derive(Debug, Clone, Default)]
pub struct SoqlQuery {
    pub object: String,
    pub fields: Vec<String>,
    pub conditions: Vec<Condition>,
    pub raw_filter: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u32>,
}

impl SoqlQuery {
    /// Start a query over `object`
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            ..Default::default()
        }
    }

    /// Select these fields
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Add a structured condition (ANDed with the others)
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add a caller-supplied filter clause (ANDed with the conditions)
    pub fn with_raw_filter(mut self, filter: Option<String>) -> Self {
        self.raw_filter = filter.filter(|f| !f.trim().is_empty());
        self
    }

    /// Order by a field
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Cap the number of rows
    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Render as a SOQL statement
    pub fn to_soql(&self) -> Result<String> {
        validate_identifier(&self.object)?;

        if self.fields.is_empty() {
            return Err(SalesforceMcpError::Validation(ValidationError::MissingField {
                field: "fields".to_string(),
            }));
        }
        for field in &self.fields {
            validate_identifier(field)?;
        }

        let mut soql = format!("SELECT {} FROM {}", self.fields.join(", "), self.object);

        let mut clauses = self
            .conditions
            .iter()
            .map(Condition::to_soql)
            .collect::<Result<Vec<_>>>()?;
        if let Some(raw) = &self.raw_filter {
            clauses.push(format!("({})", raw.trim()));
        }
        if !clauses.is_empty() {
            soql.push_str(" WHERE ");
            soql.push_str(&clauses.join(" AND "));
        }

        if let Some(order_by) = &self.order_by {
            validate_identifier(order_by)?;
            soql.push_str(&format!(" ORDER BY {}", order_by));
        }

        if let Some(limit) = self.limit {
            soql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok(soql)
    }
}

/// Object and field names: letters, digits, `_`, and `.` for relationship paths
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(SalesforceMcpError::Validation(ValidationError::InvalidIdentifier {
            name: name.to_string(),
        }))
    }
}

/// Escape a value for use inside a single-quoted SOQL literal
pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escape a LIKE term so `%` and `_` match literally
pub fn escape_like(term: &str) -> String {
    escape_literal(term).replace('%', "\\%").replace('_', "\\_")
}
