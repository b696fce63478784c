//! Integration tests for Salesforce MCP Server
//!
//! These tests verify the MCP protocol handling, the tool handlers and the
//! guided case creation. They run against an in-memory org and a scripted
//! user; no real API calls are made.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use salesforce_mcp_server_rust::case::CaseFlow;
use salesforce_mcp_server_rust::error::{
    FlowAbort, Result, SalesforceApiError, SalesforceMcpError,
};
use salesforce_mcp_server_rust::mcp::prompt::Prompter;
use salesforce_mcp_server_rust::mcp::server::McpServer;
use salesforce_mcp_server_rust::mcp::tools::ToolHandler;
use salesforce_mcp_server_rust::mcp::transport::Transport;
use salesforce_mcp_server_rust::mcp::types::CallToolResult;
use salesforce_mcp_server_rust::salesforce::connection::Connection;
use salesforce_mcp_server_rust::salesforce::soql::{Condition, SoqlQuery};
use salesforce_mcp_server_rust::salesforce::types::{ObjectDescribe, Record, SaveResult};

const NEW_CASE_ID: &str = "500000000000001AAA";
const NEW_CASE_NUMBER: &str = "00001001";

/// Helper to create a JSON-RPC request
fn make_request(id: i64, method: &str, params: Option<Value>) -> Value {
    let mut request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(p) = params {
        request["params"] = p;
    }
    request
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

fn picklist(values: &[(&str, bool, bool)]) -> Value {
    Value::Array(
        values
            .iter()
            .map(|(v, default, active)| {
                json!({"label": v, "value": v, "defaultValue": default, "active": active})
            })
            .collect(),
    )
}

fn case_describe() -> Value {
    json!({
        "name": "Case",
        "label": "Case",
        "fields": [
            {"name": "Id", "label": "Case ID", "type": "id", "nillable": false, "createable": false},
            {"name": "CaseNumber", "label": "Case Number", "type": "string", "nillable": false,
             "createable": false, "defaultedOnCreate": true},
            {"name": "AccountId", "label": "Account ID", "type": "reference", "nillable": true,
             "createable": true, "referenceTo": ["Account"]},
            {"name": "ContactId", "label": "Contact ID", "type": "reference", "nillable": true,
             "createable": true, "referenceTo": ["Contact"]},
            {"name": "SuppliedEmail", "label": "Web Email", "type": "email", "nillable": true, "createable": true},
            {"name": "SuppliedName", "label": "Web Name", "type": "string", "nillable": true, "createable": true},
            {"name": "Subject", "label": "Subject", "type": "string", "nillable": true, "createable": true},
            {"name": "Description", "label": "Description", "type": "textarea", "nillable": true, "createable": true},
            {"name": "Origin", "label": "Case Origin", "type": "picklist", "nillable": true, "createable": true,
             "picklistValues": picklist(&[("Phone", false, true), ("Fax", false, false), ("Email", false, true), ("Web", false, true)])},
            {"name": "Status", "label": "Status", "type": "picklist", "nillable": false, "createable": true,
             "defaultedOnCreate": true,
             "picklistValues": picklist(&[("New", true, true), ("Working", false, true), ("Closed", false, true)])},
            {"name": "Priority", "label": "Priority", "type": "picklist", "nillable": true, "createable": true,
             "picklistValues": json!([
                 {"label": "High", "value": "High"},
                 {"label": "Low", "value": "Low", "defaultValue": true}
             ])},
            {"name": "Type", "label": "Case Type", "type": "picklist", "nillable": true, "createable": true,
             "picklistValues": picklist(&[("Problem", false, true), ("Question", false, true)])}
        ]
    })
}

/// Org state and a log of every call made against it
struct MockConnection {
    describes: Mutex<Vec<ObjectDescribe>>,
    records: Vec<(String, Record)>,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<(String, Record)>>,
}

impl MockConnection {
    fn new() -> Self {
        let describes = vec![
            serde_json::from_value(case_describe()).unwrap(),
            serde_json::from_value(json!({
                "name": "Account",
                "fields": [
                    {"name": "Name", "label": "Account Name", "type": "string", "nillable": false, "createable": true},
                    {"name": "Industry", "label": "Industry", "type": "picklist", "nillable": true, "createable": true,
                     "picklistValues": picklist(&[("Banking", false, true), ("Energy", false, true)])}
                ]
            }))
            .unwrap(),
        ];

        let records = vec![
            ("Account", json!({"Id": "001A", "Name": "Acme Corp"})),
            ("Account", json!({"Id": "001B", "Name": "Acme Industries"})),
            ("Account", json!({"Id": "001C", "Name": "Globex"})),
            ("Contact", json!({"Id": "003A", "Name": "Jane Doe", "Email": "jane@acme.example", "AccountId": "001B"})),
            ("Contact", json!({"Id": "003B", "Name": "John Roe", "AccountId": "001B"})),
            ("Product2", json!({"Id": "01tA", "Name": "Widget"})),
        ];

        Self {
            describes: Mutex::new(describes),
            records: records
                .into_iter()
                .map(|(o, r)| (o.to_string(), record(r)))
                .collect(),
            calls: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Add a field to the Case describe
    fn with_case_field(self, field: Value) -> Self {
        {
            let mut describes = self.describes.lock().unwrap();
            let case = describes.iter_mut().find(|d| d.name == "Case").unwrap();
            case.fields.push(serde_json::from_value(field).unwrap());
        }
        self
    }

    /// Add records of one object to the org
    fn with_records(mut self, object: &str, records: impl IntoIterator<Item = Value>) -> Self {
        self.records
            .extend(records.into_iter().map(|r| (object.to_string(), record(r))));
        self
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn created_cases(&self) -> Vec<Record> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == "Case")
            .map(|(_, r)| r.clone())
            .collect()
    }
}

fn matches_condition(record: &Record, condition: &Condition) -> bool {
    match condition {
        Condition::Equals { field, value } => {
            record.get(field).and_then(Value::as_str) == Some(value.as_str())
        }
        Condition::Contains { field, term } => record
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|v| v.to_lowercase().contains(&term.to_lowercase())),
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn describe(&self, object: &str) -> Result<ObjectDescribe> {
        self.log(format!("describe:{}", object));
        self.describes
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.name == object)
            .cloned()
            .ok_or_else(|| {
                SalesforceMcpError::Salesforce(SalesforceApiError::RequestFailed {
                    status: 404,
                    error_code: Some("NOT_FOUND".to_string()),
                    message: format!("The requested resource does not exist: {}", object),
                })
            })
    }

    async fn find(&self, query: &SoqlQuery) -> Result<Vec<Record>> {
        // Same validation as the real client
        query.to_soql()?;
        self.log(format!("find:{}", query.object));

        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(self
            .records
            .iter()
            .filter(|(o, _)| *o == query.object)
            .map(|(_, r)| r)
            .filter(|r| query.conditions.iter().all(|c| matches_condition(r, c)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn retrieve(&self, object: &str, id: &str, fields: &[&str]) -> Result<Record> {
        self.log(format!("retrieve:{}:{}", object, id));
        if object == "Case" && id == NEW_CASE_ID && fields == ["CaseNumber"] {
            return Ok(record(json!({"Id": id, "CaseNumber": NEW_CASE_NUMBER})));
        }
        Err(SalesforceMcpError::Salesforce(SalesforceApiError::RecordNotFound {
            object: object.to_string(),
            id: id.to_string(),
        }))
    }

    async fn create(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>> {
        self.log(format!("create:{}", object));
        let results = records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if object == "Case" {
                    SaveResult::ok(NEW_CASE_ID)
                } else if r.contains_key("Name") {
                    SaveResult::ok(format!("001NEW{}", i))
                } else {
                    SaveResult::failed(
                        "Required fields are missing: [Name]",
                        Some("REQUIRED_FIELD_MISSING"),
                    )
                }
            })
            .collect();
        self.created
            .lock()
            .unwrap()
            .extend(records.into_iter().map(|r| (object.to_string(), r)));
        Ok(results)
    }

    async fn update(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>> {
        self.log(format!("update:{}", object));
        Ok(records
            .iter()
            .map(|r| SaveResult::ok(r["Id"].as_str().unwrap_or_default()))
            .collect())
    }

    async fn destroy(&self, object: &str, ids: &[String]) -> Result<Vec<SaveResult>> {
        self.log(format!("destroy:{}", object));
        Ok(ids
            .iter()
            .map(|id| {
                if id.starts_with("gone") {
                    SaveResult::failed("entity is deleted", Some("ENTITY_IS_DELETED"))
                } else {
                    SaveResult::ok(id.as_str())
                }
            })
            .collect())
    }

    async fn upsert(
        &self,
        object: &str,
        external_id_field: &str,
        records: Vec<Record>,
    ) -> Result<Vec<SaveResult>> {
        self.log(format!("upsert:{}:{}", object, external_id_field));
        Ok(records
            .iter()
            .enumerate()
            .map(|(i, _)| SaveResult {
                created: Some(i == 0),
                ..SaveResult::ok(format!("001UP{}", i))
            })
            .collect())
    }
}

/// Answers prompts from a fixed script; running out cancels
struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn remaining(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn prompt(&self, message: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(message.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(SalesforceMcpError::Flow(FlowAbort::Cancelled))
    }
}

fn handler(connection: &Arc<MockConnection>, prompter: &Arc<ScriptedPrompter>) -> ToolHandler {
    ToolHandler::new(connection.clone(), prompter.clone())
}

/// A full run: Acme search picks Acme Industries, skips the contact
const ACME_SCRIPT: [&str; 11] = [
    "Acme",
    "2",
    "",
    "ann@example.com",
    "Ann Smith",
    "Printer on fire",
    "",
    "3",
    "1",
    "1",
    "y",
];

mod mcp_protocol_tests {
    use super::*;

    fn server() -> McpServer {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&[]));
        McpServer::new(
            handler(&connection, &prompter),
            Arc::new(Transport::new(tokio::io::empty(), tokio::io::sink())),
        )
    }

    async fn send(server: &mut McpServer, request: Value) -> Value {
        let response = server.handle_message(&request.to_string()).await.unwrap();
        serde_json::to_value(response.expect("expected a response")).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let mut server = server();

        let response = send(&mut server, make_request(1, "initialize", Some(json!({
            "protocolVersion": "2025-06-18",
            "clientInfo": {"name": "test-client", "version": "1.0.0"},
            "capabilities": {"elicitation": {}}
        })))).await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], "2025-06-18");
        assert_eq!(response["result"]["serverInfo"]["name"], "salesforce");
        assert!(response["result"]["capabilities"]["tools"].is_object());

        let response = send(&mut server, make_request(2, "initialize", Some(json!({
            "protocolVersion": "1999-01-01",
            "capabilities": {}
        })))).await;
        assert_eq!(response["result"]["protocolVersion"], "2025-06-18");
    }

    #[tokio::test]
    async fn test_initialized_notification_has_no_response() {
        let mut server = server();
        assert!(!server.is_initialized());

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(response.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_list_tools() {
        let mut server = server();
        let response = send(&mut server, make_request(3, "tools/list", None)).await;

        let tools = response["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            vec![
                "salesforce_query_records",
                "salesforce_dml_records",
                "salesforce_get_case_metadata",
                "salesforce_search_accounts",
                "salesforce_search_contacts",
                "salesforce_get_picklist_values",
                "salesforce_create_case",
            ]
        );
        for tool in tools {
            assert_eq!(tool["inputSchema"]["type"], "object");
        }

        for index in [0, 3] {
            let limit = &tools[index]["inputSchema"]["properties"]["limit"];
            assert_eq!(limit["type"], "integer");
            assert_eq!(limit["minimum"], 1);
        }

        let dml = &tools[1]["inputSchema"];
        assert_eq!(dml["properties"]["operation"]["enum"], json!(["insert", "update", "delete", "upsert"]));
    }

    #[tokio::test]
    async fn test_ping_and_unknown_method() {
        let mut server = server();

        let response = send(&mut server, make_request(4, "ping", None)).await;
        assert_eq!(response["result"], json!({}));

        let response = send(&mut server, make_request(5, "resources/list", None)).await;
        assert_eq!(response["error"]["code"], -32601);
        assert!(response["result"].is_null());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let mut server = server();
        let response = server.handle_message("{not json").await.unwrap().unwrap();
        assert!(response.id.is_none());

        let response = serde_json::to_value(response).unwrap();
        assert!(response["id"].is_null());
        assert!(response.as_object().unwrap().contains_key("id"));
        assert_eq!(response["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_call_tool_errors() {
        let mut server = server();

        let response = send(&mut server, make_request(6, "tools/call", None)).await;
        assert_eq!(response["error"]["code"], -32602);

        let response = send(&mut server, make_request(7, "tools/call", Some(json!({
            "name": "send_email",
            "arguments": {}
        })))).await;
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(response["result"]["content"][0]["text"], "Error: MCP protocol error: Unknown tool: send_email");
    }

    #[tokio::test]
    async fn test_guided_case_over_elicitation() {
        use salesforce_mcp_server_rust::mcp::prompt::ElicitationPrompter;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (server_in, mut client_out) = tokio::io::duplex(64 * 1024);
        let (server_out, mut client_in) = tokio::io::duplex(64 * 1024);
        let transport = Arc::new(Transport::new(server_in, server_out));

        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ElicitationPrompter::new(transport.clone()));
        let mut server = McpServer::new(ToolHandler::new(connection.clone(), prompter), transport);

        // Globex is the only match, and it has no contacts
        let answers = [
            "Globex",
            "ops@globex.example",
            "Hank Scorpio",
            "Reactor alarm",
            "It keeps beeping",
            "1",
            "2",
            "1",
            "y",
        ];
        let mut script = make_request(1, "tools/call", Some(json!({
            "name": "salesforce_create_case",
            "arguments": {}
        })))
        .to_string();
        script.push('\n');
        for (i, answer) in answers.iter().enumerate() {
            script.push_str(&json!({
                "jsonrpc": "2.0",
                "id": format!("elicit-{}", i + 1),
                "result": {"action": "accept", "content": {"response": answer}}
            }).to_string());
            script.push('\n');
        }
        client_out.write_all(script.as_bytes()).await.unwrap();
        drop(client_out);

        assert_ok!(server.run().await);
        drop(server);

        let mut output = String::new();
        client_in.read_to_string(&mut output).await.unwrap();
        let messages: Vec<Value> = output.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

        assert_eq!(messages.len(), answers.len() + 1);
        assert!(messages[..answers.len()]
            .iter()
            .all(|m| m["method"] == "elicitation/create"));

        let result = &messages[answers.len()];
        assert_eq!(result["id"], 1);
        assert_eq!(result["result"]["isError"], false);
        assert_eq!(
            result["result"]["content"][0]["text"],
            format!("Case created successfully.\nCase Number: {}\nID: {}", NEW_CASE_NUMBER, NEW_CASE_ID)
        );

        let cases = connection.created_cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0]["AccountId"], "001C");
        assert_eq!(cases[0]["SuppliedName"], "Hank Scorpio");
        assert_eq!(cases[0]["Status"], "Working");
        assert_eq!(cases[0]["Description"], "It keeps beeping");
    }
}

mod query_tool_tests {
    use super::*;

    #[tokio::test]
    async fn test_query_renders_one_line_per_record() {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&[]));

        let result = handler(&connection, &prompter)
            .call_tool("salesforce_query_records", json!({
                "objectName": "Account",
                "fields": ["Id", "Name"],
                "limit": 2
            }))
            .await;

        assert!(!result.is_error);
        assert_eq!(
            result.first_text(),
            "Query returned 2 Account record(s):\n\nRecord 1: Id: 001A, Name: Acme Corp\nRecord 2: Id: 001B, Name: Acme Industries"
        );
    }

    #[tokio::test]
    async fn test_query_rejects_bad_identifiers() {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&[]));

        let result = handler(&connection, &prompter)
            .call_tool("salesforce_query_records", json!({
                "objectName": "Account; DELETE",
                "fields": ["Id"]
            }))
            .await;

        assert!(result.is_error);
        assert!(result.first_text().contains("Invalid identifier"));
        assert!(connection.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_or_fractional_limit_is_rejected() {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&[]));
        let tools = handler(&connection, &prompter);

        let result = tools
            .call_tool("salesforce_query_records", json!({
                "objectName": "Account",
                "fields": ["Id"],
                "limit": 0
            }))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().contains("Invalid parameter: limit"));

        let result = tools
            .call_tool("salesforce_search_accounts", json!({"searchTerm": "Acme", "limit": 0}))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().contains("Invalid parameter: limit"));

        let result = tools
            .call_tool("salesforce_search_accounts", json!({"searchTerm": "Acme", "limit": 1.5}))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().contains("Invalid tool arguments"));

        assert!(connection.calls().is_empty());
    }

    #[tokio::test]
    async fn test_query_missing_arguments() {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&[]));

        let result = handler(&connection, &prompter)
            .call_tool("salesforce_query_records", json!({"objectName": "Account"}))
            .await;

        assert!(result.is_error);
        assert!(result.first_text().contains("Invalid tool arguments"));
    }
}

mod dml_tool_tests {
    use super::*;

    async fn dml(connection: &Arc<MockConnection>, args: Value) -> CallToolResult {
        let prompter = Arc::new(ScriptedPrompter::new(&[]));
        handler(connection, &prompter)
            .call_tool("salesforce_dml_records", args)
            .await
    }

    #[tokio::test]
    async fn test_partial_insert_failure_is_not_an_error() {
        let connection = Arc::new(MockConnection::new());
        let result = dml(&connection, json!({
            "operation": "insert",
            "objectName": "Account",
            "records": [{"Name": "One"}, {"Industry": "Energy"}, {"Name": "Three"}]
        }))
        .await;

        assert!(!result.is_error);
        let text = result.first_text();
        assert!(text.starts_with("insert operation on Account complete.\nSuccessful: 2\nFailed: 1\n"));
        assert!(text.contains("Record 1: Success (ID: 001NEW0)"));
        assert!(text.contains(
            "Record 2: Failed - Required fields are missing: [Name] [REQUIRED_FIELD_MISSING]"
        ));
        assert!(text.contains("Record 3: Success (ID: 001NEW2)"));
    }

    #[tokio::test]
    async fn test_upsert_requires_external_id_field() {
        let connection = Arc::new(MockConnection::new());

        for args in [
            json!({"operation": "upsert", "objectName": "Account", "records": [{"Name": "A"}]}),
            json!({"operation": "upsert", "objectName": "Account", "records": [{"Name": "A"}], "externalIdField": "  "}),
        ] {
            let result = dml(&connection, args).await;
            assert!(result.is_error);
            assert!(result.first_text().contains("externalIdField"));
        }

        assert!(connection.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_reports_created_and_updated() {
        let connection = Arc::new(MockConnection::new());
        let result = dml(&connection, json!({
            "operation": "upsert",
            "objectName": "Account",
            "externalIdField": "External_Id__c",
            "records": [{"External_Id__c": "X1"}, {"External_Id__c": "X2"}]
        }))
        .await;

        assert!(!result.is_error);
        assert!(result.first_text().contains("Record 1: Success (ID: 001UP0) [created]"));
        assert!(result.first_text().contains("Record 2: Success (ID: 001UP1) [updated]"));
        assert_eq!(connection.calls(), vec!["upsert:Account:External_Id__c"]);
    }

    #[tokio::test]
    async fn test_update_requires_ids_before_calling() {
        let connection = Arc::new(MockConnection::new());
        let result = dml(&connection, json!({
            "operation": "update",
            "objectName": "Account",
            "records": [{"Id": "001A", "Name": "Acme"}, {"Name": "No id"}]
        }))
        .await;

        assert!(result.is_error);
        assert!(result.first_text().contains("Id (record 2)"));
        assert!(connection.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_tally_adds_up() {
        let connection = Arc::new(MockConnection::new());
        let result = dml(&connection, json!({
            "operation": "delete",
            "objectName": "Account",
            "records": [{"Id": "001A"}, {"Id": "gone1"}, {"id": "001C"}]
        }))
        .await;

        assert!(!result.is_error);
        assert!(result.first_text().contains("Successful: 2\nFailed: 1\n"));
        assert!(result.first_text().contains("Record 2: Failed - entity is deleted [ENTITY_IS_DELETED]"));
    }

    #[tokio::test]
    async fn test_unknown_operation_and_empty_records() {
        let connection = Arc::new(MockConnection::new());

        let result = dml(&connection, json!({
            "operation": "merge", "objectName": "Account", "records": [{"Id": "001A"}]
        }))
        .await;
        assert!(result.is_error);

        let result = dml(&connection, json!({
            "operation": "insert", "objectName": "Account", "records": []
        }))
        .await;
        assert!(result.is_error);
        assert!(result.first_text().contains("records"));

        assert!(connection.calls().is_empty());
    }

    #[tokio::test]
    async fn test_case_insert_runs_guided_flow() {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&ACME_SCRIPT));

        let result = handler(&connection, &prompter)
            .call_tool("salesforce_dml_records", json!({
                "operation": "insert",
                "objectName": "Case",
                "records": [{"Subject": "Ignored", "Priority": "Low"}]
            }))
            .await;

        assert!(!result.is_error, "{}", result.first_text());
        assert!(result.first_text().contains("Successful: 1\nFailed: 0\n"));
        assert_eq!(prompter.remaining(), 0);

        let cases = connection.created_cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0]["Subject"], "Printer on fire");
        assert_eq!(cases[0]["Priority"], "High");
    }
}

mod lookup_tool_tests {
    use super::*;

    async fn call(name: &str, args: Value) -> CallToolResult {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&[]));
        handler(&connection, &prompter).call_tool(name, args).await
    }

    #[tokio::test]
    async fn test_search_accounts_numbered() {
        let result = call("salesforce_search_accounts", json!({"searchTerm": "Acme"})).await;

        assert!(!result.is_error);
        assert_eq!(
            result.first_text(),
            "Found 2 account(s) matching 'Acme':\n1. Acme Corp (ID: 001A)\n2. Acme Industries (ID: 001B)"
        );
    }

    #[tokio::test]
    async fn test_search_accounts_no_match_is_not_an_error() {
        let result = call("salesforce_search_accounts", json!({"searchTerm": "Initech"})).await;

        assert!(!result.is_error);
        assert_eq!(result.first_text(), "No accounts found matching 'Initech'.");
    }

    #[tokio::test]
    async fn test_search_contacts() {
        let result = call("salesforce_search_contacts", json!({"accountId": "001B"})).await;
        assert!(!result.is_error);
        assert_eq!(
            result.first_text(),
            "Found 2 contact(s) for account 001B:\n1. Jane Doe - jane@acme.example (ID: 003A)\n2. John Roe (ID: 003B)"
        );

        let result = call("salesforce_search_contacts", json!({"accountId": "001A"})).await;
        assert!(!result.is_error);
        assert_eq!(result.first_text(), "No contacts found for account 001A.");
    }

    #[tokio::test]
    async fn test_picklist_values_default_marker() {
        let result = call("salesforce_get_picklist_values", json!({"fieldName": "Priority"})).await;

        assert!(!result.is_error);
        assert_eq!(result.first_text(), "Picklist values for Case.Priority:\n1. High\n2. Low (Default)");
    }

    #[tokio::test]
    async fn test_picklist_values_errors() {
        let result = call("salesforce_get_picklist_values", json!({"fieldName": "Subject"})).await;
        assert!(result.is_error);
        assert!(result.first_text().contains("Field Subject on Case is not a picklist"));

        let result = call("salesforce_get_picklist_values", json!({
            "objectName": "Account",
            "fieldName": "Rating"
        }))
        .await;
        assert!(result.is_error);
        assert!(result.first_text().contains("Field Rating not found on Account"));

        let result = call("salesforce_get_picklist_values", json!({
            "objectName": "Widget__c",
            "fieldName": "Size__c"
        }))
        .await;
        assert!(result.is_error);
        assert!(result.first_text().contains("(404) [NOT_FOUND]"));
    }

    #[tokio::test]
    async fn test_case_metadata() {
        let result = call("salesforce_get_case_metadata", json!({})).await;

        assert!(!result.is_error);
        let text = result.first_text();
        assert!(text.contains("Required Fields:\n(none)"));
        assert!(text.contains("Origin Values:\n1. Phone\n2. Email\n3. Web"));
        assert!(text.contains("Status Values:\n1. New (Default)\n2. Working\n3. Closed"));
        assert!(!text.contains("Fax"));
    }
}

mod case_flow_tests {
    use super::*;

    fn setup(answers: &[&str]) -> (MockConnection, ScriptedPrompter) {
        (MockConnection::new(), ScriptedPrompter::new(answers))
    }

    #[tokio::test]
    async fn test_selection_picks_indexed_account() {
        let (connection, prompter) = setup(&ACME_SCRIPT);

        let draft = assert_ok!(CaseFlow::new(&connection, &prompter).collect().await);

        assert_eq!(draft.get("AccountId"), Some(&json!("001B")));
        assert_eq!(draft.get("Origin"), Some(&json!("Web")));
        assert_eq!(draft.get("Status"), Some(&json!("New")));
        assert!(!draft.has("Description"));

        let prompts = prompter.prompts();
        assert!(prompts[1].contains("1. Acme Corp (ID: 001A)\n2. Acme Industries (ID: 001B)"));
        assert!(prompts[7].contains("1. Phone\n2. Email\n3. Web"));

        let confirmation = prompts.last().unwrap();
        assert!(confirmation.contains("- Account ID: Acme Industries (001B)"));
        assert!(confirmation.contains("- Subject: Printer on fire"));
        assert!(confirmation.ends_with("Create this case? (y/n)"));
    }

    #[tokio::test]
    async fn test_out_of_range_selection_aborts() {
        for bad in ["0", "3", "two", ""] {
            let (connection, prompter) = setup(&["Acme", bad]);

            let err = assert_err!(CaseFlow::new(&connection, &prompter).run().await);
            match err {
                SalesforceMcpError::Flow(FlowAbort::InvalidSelection { input, max }) => {
                    assert_eq!(input, bad);
                    assert_eq!(max, 2);
                }
                other => panic!("unexpected error: {:?}", other),
            }
            assert!(connection.created_cases().is_empty());
        }
    }

    #[tokio::test]
    async fn test_out_of_range_contact_aborts() {
        let (connection, prompter) = setup(&["Acme", "2", "3"]);

        let err = assert_err!(CaseFlow::new(&connection, &prompter).run().await);
        match err {
            SalesforceMcpError::Flow(FlowAbort::InvalidSelection { input, max }) => {
                assert_eq!(input, "3");
                assert_eq!(max, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!connection.calls().contains(&"create:Case".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_picklist_selection_aborts() {
        let (connection, prompter) = setup(&["Acme", "2", "", "a@b.c", "Ann", "Subj", "", "4"]);

        let err = assert_err!(CaseFlow::new(&connection, &prompter).run().await);
        match err {
            SalesforceMcpError::Flow(FlowAbort::InvalidSelection { input, max }) => {
                assert_eq!(input, "4");
                assert_eq!(max, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(prompter.prompts().last().unwrap().contains("1. Phone\n2. Email\n3. Web"));
        assert!(!connection.calls().contains(&"create:Case".to_string()));
        assert!(connection.created_cases().is_empty());
    }

    #[tokio::test]
    async fn test_long_search_results_are_marked_truncated() {
        let connection = MockConnection::new().with_records(
            "Account",
            (1..=25).map(|i| json!({"Id": format!("001X{:02}", i), "Name": format!("Acme Branch {:02}", i)})),
        );
        let prompter = ScriptedPrompter::new(&["branch", "21"]);

        let err = assert_err!(CaseFlow::new(&connection, &prompter).run().await);
        assert!(matches!(
            err,
            SalesforceMcpError::Flow(FlowAbort::InvalidSelection { max: 20, .. })
        ));

        let listing = &prompter.prompts()[1];
        assert!(listing.starts_with("More than 20 Account records match 'branch'. Showing the first 20;"));
        assert!(listing.contains("20. Acme Branch 20 (ID: 001X20)"));
        assert!(!listing.contains("Acme Branch 21"));
    }

    #[tokio::test]
    async fn test_no_matching_account_aborts() {
        let (connection, prompter) = setup(&["Initech"]);

        let err = assert_err!(CaseFlow::new(&connection, &prompter).collect().await);
        assert!(matches!(
            err,
            SalesforceMcpError::Flow(FlowAbort::NoMatches { ref object, ref term })
                if object == "Account" && term == "Initech"
        ));
    }

    #[tokio::test]
    async fn test_single_match_is_selected_without_asking() {
        let (connection, prompter) = setup(&[
            "globex", "ops@globex.example", "Hank", "Reactor", "", "1", "1", "2", "y",
        ]);

        let draft = assert_ok!(CaseFlow::new(&connection, &prompter).collect().await);
        assert_eq!(draft.get("AccountId"), Some(&json!("001C")));
        assert_eq!(draft.get("Priority"), Some(&json!("Low")));

        // No selection prompt and no contact prompt for Globex
        assert!(prompter.prompts()[1].contains("email address"));
    }

    #[tokio::test]
    async fn test_skipped_contact_requires_web_details() {
        let (connection, prompter) = setup(&[
            "Acme", "2", "", "", "   ", "ann@example.com", "", "Ann Smith", "Subject", "", "1", "1", "1", "y",
        ]);

        let draft = assert_ok!(CaseFlow::new(&connection, &prompter).collect().await);

        assert!(!draft.has("ContactId"));
        assert_eq!(draft.get("SuppliedEmail"), Some(&json!("ann@example.com")));
        assert_eq!(draft.get("SuppliedName"), Some(&json!("Ann Smith")));

        let prompts = prompter.prompts();
        assert_eq!(prompts.iter().filter(|p| p.contains("email address")).count(), 3);
        assert_eq!(prompts.iter().filter(|p| p.contains("name of the person")).count(), 2);
        assert!(prompts[2].contains("1. Jane Doe - jane@acme.example (ID: 003A)\n2. John Roe (ID: 003B)"));
    }

    #[tokio::test]
    async fn test_selected_contact_skips_web_details() {
        let (connection, prompter) = setup(&["Acme", "2", "1", "Subject", "Details", "1", "1", "1", "Y"]);

        let draft = assert_ok!(CaseFlow::new(&connection, &prompter).collect().await);

        assert_eq!(draft.get("ContactId"), Some(&json!("003A")));
        assert_eq!(draft.get("Description"), Some(&json!("Details")));
        assert!(!draft.has("SuppliedEmail"));
        assert!(!draft.has("SuppliedName"));
        assert_eq!(prompter.remaining(), 0);
    }

    #[tokio::test]
    async fn test_declined_confirmation_creates_nothing() {
        for answer in ["n", "yes", ""] {
            let mut script = ACME_SCRIPT.to_vec();
            *script.last_mut().unwrap() = answer;
            let (connection, prompter) = setup(&script);

            let err = assert_err!(CaseFlow::new(&connection, &prompter).run().await);
            assert!(matches!(err, SalesforceMcpError::Flow(FlowAbort::Declined)));
            assert!(!connection.calls().contains(&"create:Case".to_string()));
        }
    }

    #[tokio::test]
    async fn test_confirmed_flow_creates_one_case() {
        let (connection, prompter) = setup(&ACME_SCRIPT);

        let results = assert_ok!(CaseFlow::new(&connection, &prompter).run().await);
        assert_eq!(results, vec![SaveResult::ok(NEW_CASE_ID)]);

        let cases = connection.created_cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(
            Value::Object(cases[0].clone()),
            json!({
                "AccountId": "001B",
                "SuppliedEmail": "ann@example.com",
                "SuppliedName": "Ann Smith",
                "Subject": "Printer on fire",
                "Origin": "Web",
                "Status": "New",
                "Priority": "High"
            })
        );
    }

    #[tokio::test]
    async fn test_remaining_required_fields_by_type() {
        let connection = MockConnection::new()
            .with_case_field(json!({"name": "Escalated__c", "label": "Escalated", "type": "boolean",
                                    "nillable": false, "createable": true}))
            .with_case_field(json!({"name": "Hours__c", "label": "Hours", "type": "double",
                                    "nillable": false, "createable": true}))
            .with_case_field(json!({"name": "Seats__c", "label": "Seats", "type": "int",
                                    "nillable": false, "createable": true}))
            .with_case_field(json!({"name": "Product__c", "label": "Product", "type": "reference",
                                    "nillable": false, "createable": true, "referenceTo": ["Product2"]}))
            .with_case_field(json!({"name": "Severity__c", "label": "Severity", "type": "picklist",
                                    "nillable": false, "createable": true,
                                    "picklistValues": picklist(&[("S1", false, true), ("S2", true, true)])}))
            .with_case_field(json!({"name": "Due__c", "label": "Due", "type": "date",
                                    "nillable": false, "createable": true}));

        let mut script = ACME_SCRIPT[..10].to_vec();
        script.extend(["TRUE", "2.5", "12", "widget", "2", "2026-11-01", "y"]);
        let prompter = ScriptedPrompter::new(&script);

        let draft = assert_ok!(CaseFlow::new(&connection, &prompter).collect().await);

        assert_eq!(draft.get("Escalated__c"), Some(&json!(true)));
        assert_eq!(draft.get("Hours__c"), Some(&json!(2.5)));
        assert_eq!(draft.get("Seats__c"), Some(&json!(12)));
        assert_eq!(draft.get("Product__c"), Some(&json!("01tA")));
        assert_eq!(draft.get("Severity__c"), Some(&json!("S2")));
        assert_eq!(draft.get("Due__c"), Some(&json!("2026-11-01")));
        assert!(connection.calls().contains(&"find:Product2".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_number_aborts() {
        let connection = MockConnection::new().with_case_field(json!({
            "name": "Hours__c", "label": "Hours", "type": "currency",
            "nillable": false, "createable": true
        }));
        let mut script = ACME_SCRIPT[..10].to_vec();
        script.push("lots");
        let prompter = ScriptedPrompter::new(&script);

        let err = assert_err!(CaseFlow::new(&connection, &prompter).run().await);
        assert_eq!(
            err.to_string(),
            "Case creation aborted: 'lots' is not a valid number for Hours"
        );
        assert!(connection.created_cases().is_empty());
    }

    #[tokio::test]
    async fn test_create_case_tool_reports_case_number() {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&ACME_SCRIPT));

        let result = handler(&connection, &prompter)
            .call_tool("salesforce_create_case", json!({}))
            .await;

        assert!(!result.is_error);
        assert_eq!(
            result.first_text(),
            format!("Case created successfully.\nCase Number: {}\nID: {}", NEW_CASE_NUMBER, NEW_CASE_ID)
        );
        assert!(connection.calls().contains(&format!("retrieve:Case:{}", NEW_CASE_ID)));
    }

    #[tokio::test]
    async fn test_create_case_tool_reports_abort_as_error() {
        let connection = Arc::new(MockConnection::new());
        let prompter = Arc::new(ScriptedPrompter::new(&["Acme", "9"]));

        let result = handler(&connection, &prompter)
            .call_tool("salesforce_create_case", Value::Null)
            .await;

        assert!(result.is_error);
        assert_eq!(
            result.first_text(),
            "Error: Case creation aborted: invalid selection '9': expected a number between 1 and 2"
        );
    }
}
