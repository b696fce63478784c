//! Salesforce REST API type definitions
//!
//! These types mirror the REST API responses and are used for serialization/deserialization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SalesforceApiError, SalesforceMcpError};

/// A record: field API name to value. Shape depends entirely on the object's schema.
pub type Record = Map<String, Value>;

/// Field data types reported by describe metadata.
///
/// Unrecognised types are kept in [`FieldType::Other`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    TextArea,
    Email,
    Phone,
    Url,
    Id,
    Boolean,
    Date,
    DateTime,
    Int,
    Long,
    Double,
    Currency,
    Percent,
    Picklist,
    MultiPicklist,
    Reference,
    Other(String),
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "string" => FieldType::String,
            "textarea" => FieldType::TextArea,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "url" => FieldType::Url,
            "id" => FieldType::Id,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "int" => FieldType::Int,
            "long" => FieldType::Long,
            "double" => FieldType::Double,
            "currency" => FieldType::Currency,
            "percent" => FieldType::Percent,
            "picklist" => FieldType::Picklist,
            "multipicklist" => FieldType::MultiPicklist,
            "reference" => FieldType::Reference,
            _ => FieldType::Other(raw),
        }
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

impl FieldType {
    /// API name of the type
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::TextArea => "textarea",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Url => "url",
            FieldType::Id => "id",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Currency => "currency",
            FieldType::Percent => "percent",
            FieldType::Picklist => "picklist",
            FieldType::MultiPicklist => "multipicklist",
            FieldType::Reference => "reference",
            FieldType::Other(raw) => raw,
        }
    }

    /// How a value of this type is collected from the user
    pub fn input_kind(&self) -> InputKind {
        match self {
            FieldType::Reference => InputKind::Reference,
            FieldType::Picklist | FieldType::MultiPicklist => InputKind::Picklist,
            FieldType::Boolean => InputKind::Boolean,
            FieldType::Int | FieldType::Long => InputKind::Integer,
            FieldType::Double | FieldType::Currency | FieldType::Percent => InputKind::Number,
            FieldType::Date | FieldType::DateTime => InputKind::Temporal,
            FieldType::String
            | FieldType::TextArea
            | FieldType::Email
            | FieldType::Phone
            | FieldType::Url
            | FieldType::Id
            | FieldType::Other(_) => InputKind::Text,
        }
    }
}

/// Input strategy for a field type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Reference,
    Picklist,
    Boolean,
    Integer,
    Number,
    Temporal,
    Text,
}

/// A picklist entry from describe metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PicklistEntry {
    /// Display label (may be absent on some orgs; falls back to the value)
    #[serde(default)]
    pub label: Option<String>,

    /// API value
    pub value: String,

    /// Whether this is the field's default value
    #[serde(default)]
    pub default_value: bool,

    /// Inactive entries cannot be chosen
    #[serde(default = "default_true")]
    pub active: bool,
}

impl PicklistEntry {
    /// Label to show, falling back to the API value
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.value)
    }
}

fn default_true() -> bool {
    true
}

/// A field descriptor from describe metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescribe {
    /// Field API name
    pub name: String,

    /// Field label
    pub label: String,

    /// Data type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether the field accepts null
    #[serde(default)]
    pub nillable: bool,

    /// Whether the field can be set on create
    #[serde(default)]
    pub createable: bool,

    /// Whether the platform fills in a value on create
    #[serde(default)]
    pub defaulted_on_create: bool,

    /// Picklist entries (picklist types only)
    #[serde(default)]
    pub picklist_values: Vec<PicklistEntry>,

    /// Target objects (reference types only)
    #[serde(default)]
    pub reference_to: Vec<String>,
}

impl FieldDescribe {
    /// A field the caller must supply on create
    pub fn is_required_on_create(&self) -> bool {
        self.createable && !self.nillable && !self.defaulted_on_create
    }

    /// Active picklist entries, in schema order
    pub fn active_picklist_values(&self) -> Vec<&PicklistEntry> {
        self.picklist_values.iter().filter(|p| p.active).collect()
    }
}

/// Describe result for an object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDescribe {
    /// Object API name
    pub name: String,

    /// Object label
    #[serde(default)]
    pub label: String,

    /// Field descriptors
    #[serde(default)]
    pub fields: Vec<FieldDescribe>,
}

impl ObjectDescribe {
    /// Look up a field by API name
    pub fn field(&self, name: &str) -> Option<&FieldDescribe> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields the caller must supply on create
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDescribe> {
        self.fields.iter().filter(|f| f.is_required_on_create())
    }

    /// Active values of a picklist field
    pub fn picklist(&self, field: &str) -> Result<Vec<&PicklistEntry>> {
        let descriptor = self.field(field).ok_or_else(|| {
            SalesforceMcpError::Salesforce(SalesforceApiError::FieldNotFound {
                object: self.name.clone(),
                field: field.to_string(),
            })
        })?;

        if descriptor.field_type.input_kind() != InputKind::Picklist {
            return Err(SalesforceMcpError::Salesforce(SalesforceApiError::NotAPicklist {
                object: self.name.clone(),
                field: field.to_string(),
            }));
        }

        Ok(descriptor.active_picklist_values())
    }
}

/// One error attached to a DML result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveError {
    /// Error message
    pub message: String,

    /// Platform status code, e.g. REQUIRED_FIELD_MISSING
    #[serde(default)]
    pub status_code: Option<String>,

    /// Fields the error applies to
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Per-record outcome of a DML call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    /// Record ID, when known
    #[serde(default)]
    pub id: Option<String>,

    /// Whether the record was saved
    pub success: bool,

    /// Errors for a failed record
    #[serde(default)]
    pub errors: Vec<SaveError>,

    /// Upsert only: whether a new record was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
}

impl SaveResult {
    /// A successful result with an ID
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            success: true,
            errors: Vec::new(),
            created: None,
        }
    }

    /// A failed result with one error
    pub fn failed(message: impl Into<String>, status_code: Option<&str>) -> Self {
        Self {
            id: None,
            success: false,
            errors: vec![SaveError {
                message: message.into(),
                status_code: status_code.map(|c| c.to_string()),
                fields: Vec::new(),
            }],
            created: None,
        }
    }
}

/// SOQL query response page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Total number of matching records
    pub total_size: u64,

    /// Whether this is the last page
    pub done: bool,

    /// Records in this page
    #[serde(default)]
    pub records: Vec<Record>,

    /// Path of the next page
    #[serde(default)]
    pub next_records_url: Option<String>,
}

/// Error body returned by the REST API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub message: String,

    #[serde(default)]
    pub error_code: Option<String>,
}

/// Body of an sObject Collections create/update/upsert request.
///
/// Each record must carry `attributes.type`; see [`crate::salesforce::utils::with_type_attribute`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRequest {
    pub all_or_none: bool,
    pub records: Vec<Record>,
}
