//! MCP Tool definitions and handlers
//!
//! Defines all available tools and their implementations. Every handler
//! returns [`Result<String>`]; [`ToolHandler::call_tool`] turns that into the
//! wire result, so a failure is always reported as `isError: true`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::case::{render_case_metadata, CaseFlow};
use crate::config::salesforce::case_fields::CASE_NUMBER;
use crate::config::salesforce::objects::{ACCOUNT, CASE, CONTACT};
use crate::config::salesforce::DEFAULT_SEARCH_LIMIT;
use crate::error::{
    McpError, Result, SalesforceApiError, SalesforceMcpError, ValidationError,
};
use crate::mcp::prompt::Prompter;
use crate::mcp::types::{CallToolResult, Tool};
use crate::salesforce::connection::Connection;
use crate::salesforce::soql::{Condition, SoqlQuery};
use crate::salesforce::types::{Record, SaveResult};
use crate::salesforce::utils::{
    account_label, contact_label, format_picklist, format_record_line, numbered_list,
    record_id, record_str, summarize_dml,
};

/// Tool names
pub mod names {
    pub const QUERY_RECORDS: &str = "salesforce_query_records";
    pub const DML_RECORDS: &str = "salesforce_dml_records";
    pub const GET_CASE_METADATA: &str = "salesforce_get_case_metadata";
    pub const SEARCH_ACCOUNTS: &str = "salesforce_search_accounts";
    pub const SEARCH_CONTACTS: &str = "salesforce_search_contacts";
    pub const GET_PICKLIST_VALUES: &str = "salesforce_get_picklist_values";
    pub const CREATE_CASE: &str = "salesforce_create_case";
}

/// DML operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmlOperation {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl DmlOperation {
    fn as_str(&self) -> &'static str {
        match self {
            DmlOperation::Insert => "insert",
            DmlOperation::Update => "update",
            DmlOperation::Delete => "delete",
            DmlOperation::Upsert => "upsert",
        }
    }
}

/// Tool handler
pub struct ToolHandler {
    connection: Arc<dyn Connection>,
    prompter: Arc<dyn Prompter>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(connection: Arc<dyn Connection>, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            connection,
            prompter,
        }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def(names::QUERY_RECORDS, "Query records from any Salesforce object using SOQL, with optional filtering and limit", query_records_schema()),
            tool_def(names::DML_RECORDS, "Insert, update, delete or upsert Salesforce records. Inserting a Case starts the guided case creation instead", dml_records_schema()),
            tool_def(names::GET_CASE_METADATA, "Lists the required fields of the Case object and the values of its Priority, Status, Type and Origin picklists", json!({"type": "object", "properties": {}})),
            tool_def(names::SEARCH_ACCOUNTS, "Searches accounts by partial name match", search_accounts_schema()),
            tool_def(names::SEARCH_CONTACTS, "Lists the contacts of an account", search_contacts_schema()),
            tool_def(names::GET_PICKLIST_VALUES, "Lists the active values of a picklist field", get_picklist_values_schema()),
            tool_def(names::CREATE_CASE, "Creates a Case by walking the user through account, contact, details and picklist selection, then asking for confirmation", json!({"type": "object", "properties": {}})),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        tracing::debug!("Calling tool {}", name);

        let result = match name {
            names::QUERY_RECORDS => self.handle_query_records(args).await,
            names::DML_RECORDS => self.handle_dml_records(args).await,
            names::GET_CASE_METADATA => self.handle_get_case_metadata().await,
            names::SEARCH_ACCOUNTS => self.handle_search_accounts(args).await,
            names::SEARCH_CONTACTS => self.handle_search_contacts(args).await,
            names::GET_PICKLIST_VALUES => self.handle_get_picklist_values(args).await,
            names::CREATE_CASE => self.handle_create_case().await,
            _ => Err(SalesforceMcpError::Mcp(McpError::UnknownTool {
                name: name.to_string(),
            })),
        };

        if let Err(e) = &result {
            tracing::warn!("Tool {} failed: {}", name, e);
        }
        result.into()
    }

    // ==================== Tool Handlers ====================

    async fn handle_query_records(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            object_name: String,
            fields: Vec<String>,
            where_clause: Option<String>,
            limit: Option<u32>,
        }

        let args: Args = parse_args(args)?;

        let query = SoqlQuery::new(args.object_name.as_str())
            .select(args.fields)
            .with_raw_filter(args.where_clause)
            .limit(positive_limit(args.limit)?);
        let records = self.connection.find(&query).await?;

        if records.is_empty() {
            return Ok(format!("No {} records found.", args.object_name));
        }

        let lines: Vec<String> = records
            .iter()
            .enumerate()
            .map(|(i, r)| format!("Record {}: {}", i + 1, format_record_line(r)))
            .collect();

        Ok(format!(
            "Query returned {} {} record(s):\n\n{}",
            records.len(),
            args.object_name,
            lines.join("\n")
        ))
    }

    async fn handle_dml_records(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            operation: DmlOperation,
            object_name: String,
            #[serde(default)]
            records: Vec<Record>,
            external_id_field: Option<String>,
        }

        let args: Args = parse_args(args)?;
        let operation = args.operation;
        let object = args.object_name.as_str();

        if operation == DmlOperation::Insert && object.eq_ignore_ascii_case(CASE) {
            tracing::info!(
                "Case insert requested with {} record(s); switching to guided case creation",
                args.records.len()
            );
            let results = CaseFlow::new(self.connection.as_ref(), self.prompter.as_ref())
                .run()
                .await?;
            let report = summarize_dml(operation.as_str(), CASE, 1, &results);
            return Ok(format!(
                "Cases are created through guided case creation; the supplied records were not used.\n\n{}",
                report.text
            ));
        }

        if args.records.is_empty() {
            return Err(SalesforceMcpError::Validation(ValidationError::InvalidParameter {
                name: "records".to_string(),
                message: "at least one record is required".to_string(),
            }));
        }

        let record_count = args.records.len();

        let results = match operation {
            DmlOperation::Insert => self.connection.create(object, args.records).await?,
            DmlOperation::Update => {
                require_ids(&args.records)?;
                self.connection.update(object, args.records).await?
            }
            DmlOperation::Delete => {
                let ids = require_ids(&args.records)?;
                self.connection.destroy(object, &ids).await?
            }
            DmlOperation::Upsert => {
                let external_id_field = args
                    .external_id_field
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| {
                        SalesforceMcpError::Validation(ValidationError::MissingField {
                            field: "externalIdField (required for upsert)".to_string(),
                        })
                    })?;
                self.connection
                    .upsert(object, external_id_field, args.records)
                    .await?
            }
        };

        let report = summarize_dml(operation.as_str(), object, record_count, &results);
        tracing::info!(
            "{} on {}: {} succeeded, {} failed",
            operation.as_str(),
            object,
            report.success_count,
            report.failure_count
        );

        Ok(report.text)
    }

    async fn handle_get_case_metadata(&self) -> Result<String> {
        let describe = self.connection.describe(CASE).await?;
        Ok(render_case_metadata(&describe))
    }

    async fn handle_search_accounts(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            search_term: String,
            limit: Option<u32>,
        }

        let args: Args = parse_args(args)?;
        let term = args.search_term.trim();

        let accounts = self
            .connection
            .find(
                &SoqlQuery::new(ACCOUNT)
                    .select(["Id", "Name"])
                    .with_condition(Condition::contains("Name", term))
                    .order_by("Name")
                    .limit(Some(positive_limit(args.limit)?.unwrap_or(DEFAULT_SEARCH_LIMIT))),
            )
            .await?;

        if accounts.is_empty() {
            return Ok(format!("No accounts found matching '{}'.", term));
        }

        let labels: Vec<String> = accounts.iter().map(account_label).collect();
        Ok(format!(
            "Found {} account(s) matching '{}':\n{}",
            accounts.len(),
            term,
            numbered_list(&labels)
        ))
    }

    async fn handle_search_contacts(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            account_id: String,
        }

        let args: Args = parse_args(args)?;
        let account_id = args.account_id.trim();

        let contacts = self
            .connection
            .find(
                &SoqlQuery::new(CONTACT)
                    .select(["Id", "Name", "Email"])
                    .with_condition(Condition::equals("AccountId", account_id))
                    .order_by("Name"),
            )
            .await?;

        if contacts.is_empty() {
            return Ok(format!("No contacts found for account {}.", account_id));
        }

        let labels: Vec<String> = contacts.iter().map(contact_label).collect();
        Ok(format!(
            "Found {} contact(s) for account {}:\n{}",
            contacts.len(),
            account_id,
            numbered_list(&labels)
        ))
    }

    async fn handle_get_picklist_values(&self, args: Value) -> Result<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            object_name: Option<String>,
            field_name: String,
        }

        let args: Args = parse_args(args)?;
        let object = args.object_name.as_deref().unwrap_or(CASE);

        let describe = self.connection.describe(object).await?;
        let entries = describe.picklist(&args.field_name)?;

        if entries.is_empty() {
            return Ok(format!(
                "{}.{} has no active picklist values.",
                object, args.field_name
            ));
        }

        Ok(format!(
            "Picklist values for {}.{}:\n{}",
            object,
            args.field_name,
            format_picklist(&entries)
        ))
    }

    async fn handle_create_case(&self) -> Result<String> {
        let results = CaseFlow::new(self.connection.as_ref(), self.prompter.as_ref())
            .run()
            .await?;
        let id = created_id(&results)?;

        match self.connection.retrieve(CASE, &id, &[CASE_NUMBER]).await {
            Ok(record) => Ok(format!(
                "Case created successfully.\nCase Number: {}\nID: {}",
                record_str(&record, CASE_NUMBER).unwrap_or("(unknown)"),
                id
            )),
            Err(e) => {
                tracing::warn!("Case {} created but its number could not be read: {}", id, e);
                Ok(format!("Case created successfully.\nID: {}", id))
            }
        }
    }
}

/// Deserialize tool arguments; a missing argument object counts as empty
fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| {
        SalesforceMcpError::Mcp(McpError::InvalidArguments {
            message: e.to_string(),
        })
    })
}

/// A `limit` argument must be at least 1 when given
fn positive_limit(limit: Option<u32>) -> Result<Option<u32>> {
    match limit {
        Some(0) => Err(SalesforceMcpError::Validation(ValidationError::InvalidParameter {
            name: "limit".to_string(),
            message: "must be a positive integer".to_string(),
        })),
        other => Ok(other),
    }
}

/// Ids of every record, failing if any record lacks one
fn require_ids(records: &[Record]) -> Result<Vec<String>> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            record_id(r).map(str::to_string).ok_or_else(|| {
                SalesforceMcpError::Validation(ValidationError::MissingField {
                    field: format!("Id (record {})", i + 1),
                })
            })
        })
        .collect()
}

/// Id of a single-record create, or the platform's reason for rejecting it
fn created_id(results: &[SaveResult]) -> Result<String> {
    match results.first() {
        Some(SaveResult {
            success: true,
            id: Some(id),
            ..
        }) => Ok(id.clone()),
        Some(result) => Err(SalesforceMcpError::Salesforce(SalesforceApiError::SaveFailed {
            object: CASE.to_string(),
            message: result
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        })),
        None => Err(SalesforceMcpError::Salesforce(SalesforceApiError::SaveFailed {
            object: CASE.to_string(),
            message: "no result returned".to_string(),
        })),
    }
}

// ==================== Schema Definitions ====================

fn tool_def(name: &str, description: &str, input_schema: Value) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn query_records_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "objectName": {
                "type": "string",
                "description": "API name of the object to query, e.g. Account or Custom__c"
            },
            "fields": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Fields to retrieve; relationship paths like Account.Name are allowed"
            },
            "whereClause": {
                "type": "string",
                "description": "Optional SOQL WHERE clause without the WHERE keyword"
            },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "description": "Maximum number of records to return"
            }
        },
        "required": ["objectName", "fields"]
    })
}

fn dml_records_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "operation": {
                "type": "string",
                "enum": ["insert", "update", "delete", "upsert"],
                "description": "Type of DML operation"
            },
            "objectName": {
                "type": "string",
                "description": "API name of the object"
            },
            "records": {
                "type": "array",
                "items": {"type": "object"},
                "description": "Records to process; update and delete require Id on every record"
            },
            "externalIdField": {
                "type": "string",
                "description": "External ID field used to match records (required for upsert)"
            }
        },
        "required": ["operation", "objectName", "records"]
    })
}

fn search_accounts_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "searchTerm": {
                "type": "string",
                "description": "Part of the account name"
            },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "description": "Maximum number of accounts to return (default 20)"
            }
        },
        "required": ["searchTerm"]
    })
}

fn search_contacts_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "accountId": {
                "type": "string",
                "description": "ID of the account whose contacts to list"
            }
        },
        "required": ["accountId"]
    })
}

fn get_picklist_values_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "objectName": {
                "type": "string",
                "description": "API name of the object (default Case)"
            },
            "fieldName": {
                "type": "string",
                "description": "API name of the picklist field"
            }
        },
        "required": ["fieldName"]
    })
}
