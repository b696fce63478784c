//! Utility functions for records, selections and text rendering
//!
//! Everything a tool result shows the user goes through here, so the
//! numbering and labels stay identical between the search tools and the
//! guided case flow.

use serde_json::{json, Value};

use crate::error::FlowAbort;
use crate::salesforce::types::{PicklistEntry, Record, SaveResult};

/// Key Salesforce adds to every returned record
const ATTRIBUTES_KEY: &str = "attributes";

/// Copy of `record` with `attributes.type` set, as the collections API requires
pub fn with_type_attribute(object: &str, mut record: Record) -> Record {
    record.insert(ATTRIBUTES_KEY.to_string(), json!({ "type": object }));
    record
}

/// String value of a field, if present and a string
pub fn record_str<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}

/// Record ID, accepting both `Id` and `id`
pub fn record_id(record: &Record) -> Option<&str> {
    record_str(record, "Id")
        .or_else(|| record_str(record, "id"))
        .filter(|id| !id.trim().is_empty())
}

/// Render a scalar for display
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(format_value).collect::<Vec<_>>().join("; "),
        Value::Object(_) => value.to_string(),
    }
}

/// One line of `Field: value` pairs; relationship objects flatten to `Parent.Field`
pub fn format_record_line(record: &Record) -> String {
    let mut parts = Vec::new();
    flatten_into(record, "", &mut parts);
    parts.join(", ")
}

fn flatten_into(record: &Record, prefix: &str, parts: &mut Vec<String>) {
    for (key, value) in record {
        if key == ATTRIBUTES_KEY {
            continue;
        }
        match value {
            Value::Object(nested) => flatten_into(nested, &format!("{}{}.", prefix, key), parts),
            _ => parts.push(format!("{}{}: {}", prefix, key, format_value(value))),
        }
    }
}

/// `1. first`, `2. second`, ... one per line
pub fn numbered_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Picklist label, marked when it is the default
pub fn picklist_label(entry: &PicklistEntry) -> String {
    if entry.default_value {
        format!("{} (Default)", entry.display_label())
    } else {
        entry.display_label().to_string()
    }
}

/// Numbered picklist, e.g. `1. High` / `2. Low (Default)`
pub fn format_picklist(entries: &[&PicklistEntry]) -> String {
    let labels: Vec<String> = entries.iter().map(|e| picklist_label(e)).collect();
    numbered_list(&labels)
}

/// `Acme Corp (ID: 001...)`
pub fn account_label(record: &Record) -> String {
    format!(
        "{} (ID: {})",
        record_str(record, "Name").unwrap_or("(unnamed)"),
        record_id(record).unwrap_or("unknown")
    )
}

/// `Jane Doe - jane@example.com (ID: 003...)`, email omitted when absent
pub fn contact_label(record: &Record) -> String {
    let name = record_str(record, "Name").unwrap_or("(unnamed)");
    let id = record_id(record).unwrap_or("unknown");
    match record_str(record, "Email") {
        Some(email) if !email.is_empty() => format!("{} - {} (ID: {})", name, email, id),
        _ => format!("{} (ID: {})", name, id),
    }
}

/// Parse a 1-based choice among `count` items into a 0-based index.
///
/// Anything non-numeric or outside `[1, count]` is an invalid selection.
pub fn parse_selection(input: &str, count: usize) -> std::result::Result<usize, FlowAbort> {
    let trimmed = input.trim();
    match trimmed.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Ok(n - 1),
        _ => Err(FlowAbort::InvalidSelection {
            input: trimmed.to_string(),
            max: count,
        }),
    }
}

/// Like [`parse_selection`], but blank input means "none"
pub fn parse_optional_selection(
    input: &str,
    count: usize,
) -> std::result::Result<Option<usize>, FlowAbort> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    parse_selection(input, count).map(Some)
}

/// Outcome of one DML tool call
#[derive(Debug, Clone)]
pub struct DmlReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub text: String,
}

/// Tally DML results against the submitted record count.
///
/// A record with no corresponding result counts as a failure, so the two
/// counts always add up to `record_count`.
pub fn summarize_dml(
    operation: &str,
    object: &str,
    record_count: usize,
    results: &[SaveResult],
) -> DmlReport {
    let mut success_count = 0;
    let mut failure_count = 0;
    let mut lines = Vec::with_capacity(record_count);

    for index in 0..record_count {
        match results.get(index) {
            Some(result) if result.success => {
                success_count += 1;
                let created = match result.created {
                    Some(true) => " [created]",
                    Some(false) => " [updated]",
                    None => "",
                };
                lines.push(format!(
                    "Record {}: Success (ID: {}){}",
                    index + 1,
                    result.id.as_deref().unwrap_or("n/a"),
                    created
                ));
            }
            Some(result) => {
                failure_count += 1;
                let errors = if result.errors.is_empty() {
                    "unknown error".to_string()
                } else {
                    result
                        .errors
                        .iter()
                        .map(|e| {
                            let mut text = e.message.clone();
                            if let Some(code) = &e.status_code {
                                text.push_str(&format!(" [{}]", code));
                            }
                            if !e.fields.is_empty() {
                                text.push_str(&format!(" (fields: {})", e.fields.join(", ")));
                            }
                            text
                        })
                        .collect::<Vec<_>>()
                        .join("; ")
                };
                lines.push(format!("Record {}: Failed - {}", index + 1, errors));
            }
            None => {
                failure_count += 1;
                lines.push(format!("Record {}: Failed - no result returned", index + 1));
            }
        }
    }

    let mut text = format!(
        "{} operation on {} complete.\nSuccessful: {}\nFailed: {}\n",
        operation, object, success_count, failure_count
    );
    if !lines.is_empty() {
        text.push('\n');
        text.push_str(&lines.join("\n"));
    }

    DmlReport {
        success_count,
        failure_count,
        text,
    }
}
