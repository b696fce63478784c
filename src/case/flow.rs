//! Guided case creation
//!
//! A strictly sequential script: pick an account, optionally a contact (or
//! give a web email and name), enter subject and description, choose origin,
//! status and priority, fill any other required fields, confirm, create.
//!
//! Each step takes the [`CaseDraft`] built so far and returns it updated, or
//! fails with a [`FlowAbort`]. Nothing is written until the user confirms,
//! and an abort discards the whole draft.

use std::collections::BTreeMap;

use serde_json::{Number, Value};

use crate::config::salesforce::case_fields::*;
use crate::config::salesforce::objects::{ACCOUNT, CASE, CONTACT};
use crate::config::salesforce::DEFAULT_SEARCH_LIMIT;
use crate::error::{FlowAbort, Result, SalesforceMcpError};
use crate::mcp::prompt::Prompter;
use crate::salesforce::connection::Connection;
use crate::salesforce::soql::{Condition, SoqlQuery};
use crate::salesforce::types::{FieldDescribe, InputKind, ObjectDescribe, Record, SaveResult};
use crate::salesforce::utils::{
    account_label, contact_label, format_picklist, format_value, numbered_list,
    parse_optional_selection, parse_selection, record_id, record_str,
};

/// The case record assembled by the flow
#[derive(Debug, Clone, Default)]
pub struct CaseDraft {
    fields: Record,

    /// Human-readable names for reference values, keyed by field
    display: BTreeMap<String, String>,
}

impl CaseDraft {
    /// An empty draft
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Set a reference field, remembering what it points at
    pub fn with_reference(mut self, field: &str, id: &str, name: &str) -> Self {
        self.display.insert(field.to_string(), name.to_string());
        self.with(field, id)
    }

    /// Whether a field has been set
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Current value of a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The record to submit
    pub fn into_record(self) -> Record {
        self.fields
    }

    /// One `- Label: value` line per field
    pub fn summary(&self, describe: &ObjectDescribe) -> String {
        self.fields
            .iter()
            .map(|(name, value)| {
                let label = describe
                    .field(name)
                    .map(|f| f.label.as_str())
                    .unwrap_or(name.as_str());
                match self.display.get(name) {
                    Some(shown) => format!("- {}: {} ({})", label, shown, format_value(value)),
                    None => format!("- {}: {}", label, format_value(value)),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs the guided flow against a connection and a prompter
pub struct CaseFlow<'a> {
    connection: &'a dyn Connection,
    prompter: &'a dyn Prompter,
}

impl<'a> CaseFlow<'a> {
    /// Create a flow
    pub fn new(connection: &'a dyn Connection, prompter: &'a dyn Prompter) -> Self {
        Self {
            connection,
            prompter,
        }
    }

    /// Run every step and submit the confirmed draft as a single-record create
    pub async fn run(&self) -> Result<Vec<SaveResult>> {
        let draft = self.collect().await?;

        tracing::info!("Case confirmed; submitting");
        self.connection.create(CASE, vec![draft.into_record()]).await
    }

    /// Run every step up to and including confirmation
    pub async fn collect(&self) -> Result<CaseDraft> {
        tracing::info!("Guided case creation started");

        let draft = self.select_account(CaseDraft::new()).await?;
        let draft = self.select_contact(draft).await?;
        let draft = self.collect_web_contact(draft).await?;
        let draft = self.collect_details(draft).await?;

        let describe = self.connection.describe(CASE).await?;
        let draft = self.collect_picklists(draft, &describe).await?;
        let draft = self.collect_remaining_required(draft, &describe).await?;

        self.confirm(draft, &describe).await
    }

    /// Step 1: search for the account
    async fn select_account(&self, draft: CaseDraft) -> Result<CaseDraft> {
        let account = self.search_and_select(ACCOUNT, "account").await?;
        let id = record_id(&account).unwrap_or_default().to_string();
        let name = record_str(&account, "Name").unwrap_or_default().to_string();

        tracing::debug!("Selected account {} ({})", name, id);
        Ok(draft.with_reference(ACCOUNT_ID, &id, &name))
    }

    /// Step 2: optionally pick one of the account's contacts
    async fn select_contact(&self, draft: CaseDraft) -> Result<CaseDraft> {
        let Some(account_id) = draft
            .get(ACCOUNT_ID)
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return Ok(draft);
        };

        let contacts = self
            .connection
            .find(
                &SoqlQuery::new(CONTACT)
                    .select(["Id", "Name", "Email"])
                    .with_condition(Condition::equals(ACCOUNT_ID, account_id.as_str()))
                    .order_by("Name"),
            )
            .await?;

        if contacts.is_empty() {
            tracing::debug!("Account {} has no contacts", account_id);
            return Ok(draft);
        }

        let labels: Vec<String> = contacts.iter().map(contact_label).collect();
        let answer = self
            .prompter
            .prompt(&format!(
                "Contacts for this account:\n{}\n\nEnter the number of the contact for this case, or leave blank to skip:",
                numbered_list(&labels)
            ))
            .await?;

        match parse_optional_selection(&answer, contacts.len())? {
            Some(index) => {
                let contact = &contacts[index];
                Ok(draft.with_reference(
                    CONTACT_ID,
                    record_id(contact).unwrap_or_default(),
                    record_str(contact, "Name").unwrap_or_default(),
                ))
            }
            None => Ok(draft),
        }
    }

    /// Step 3: without a contact, a web email and name are required
    async fn collect_web_contact(&self, draft: CaseDraft) -> Result<CaseDraft> {
        if draft.has(CONTACT_ID) {
            return Ok(draft);
        }

        let email = self
            .prompt_required("Enter the email address of the person reporting this case:")
            .await?;
        let name = self
            .prompt_required("Enter the name of the person reporting this case:")
            .await?;

        Ok(draft.with(SUPPLIED_EMAIL, email).with(SUPPLIED_NAME, name))
    }

    /// Step 4: subject (required) and description (optional)
    async fn collect_details(&self, draft: CaseDraft) -> Result<CaseDraft> {
        let subject = self.prompt_required("Enter the case subject:").await?;
        let draft = draft.with(SUBJECT, subject);

        let description = self
            .prompter
            .prompt("Enter a description (optional, leave blank to skip):")
            .await?;
        let description = description.trim();

        if description.is_empty() {
            Ok(draft)
        } else {
            Ok(draft.with(DESCRIPTION, description))
        }
    }

    /// Step 5: origin, status and priority
    async fn collect_picklists(
        &self,
        mut draft: CaseDraft,
        describe: &ObjectDescribe,
    ) -> Result<CaseDraft> {
        for name in FLOW_PICKLISTS {
            let Some(field) = describe.field(name) else {
                tracing::warn!("Case field {} not found in this org; skipping", name);
                continue;
            };
            if let Some(value) = self.select_picklist(field).await? {
                draft = draft.with(name, value);
            }
        }
        Ok(draft)
    }

    /// Step 6: any other required field not filled in yet
    async fn collect_remaining_required(
        &self,
        mut draft: CaseDraft,
        describe: &ObjectDescribe,
    ) -> Result<CaseDraft> {
        let pending: Vec<&FieldDescribe> = describe
            .required_fields()
            .filter(|f| !draft.has(&f.name))
            .collect();

        for field in pending {
            tracing::debug!("Collecting required field {} ({})", field.name, field.field_type.as_str());

            draft = match field.field_type.input_kind() {
                InputKind::Reference if !field.reference_to.is_empty() => {
                    let record = self
                        .search_and_select(&field.reference_to[0], &field.label)
                        .await?;
                    draft.with_reference(
                        &field.name,
                        record_id(&record).unwrap_or_default(),
                        record_str(&record, "Name").unwrap_or_default(),
                    )
                }
                InputKind::Picklist => match self.select_picklist(field).await? {
                    Some(value) => draft.with(&field.name, value),
                    None => draft,
                },
                _ => {
                    let value = self.prompt_scalar(field).await?;
                    draft.with(&field.name, value)
                }
            };
        }

        Ok(draft)
    }

    /// Step 7: show the draft and ask for a yes/no
    async fn confirm(&self, draft: CaseDraft, describe: &ObjectDescribe) -> Result<CaseDraft> {
        let answer = self
            .prompter
            .prompt(&format!(
                "Please review the new case:\n{}\n\nCreate this case? (y/n)",
                draft.summary(describe)
            ))
            .await?;

        if answer.trim().eq_ignore_ascii_case("y") {
            Ok(draft)
        } else {
            tracing::info!("Case creation declined by user");
            Err(SalesforceMcpError::Flow(FlowAbort::Declined))
        }
    }

    /// Ask for a search term, then pick among `Name` matches on `object`.
    ///
    /// No matches aborts; a single match is taken without asking.
    async fn search_and_select(&self, object: &str, noun: &str) -> Result<Record> {
        let term = self
            .prompter
            .prompt(&format!("Enter a name to search for the {}:", noun))
            .await?;
        let term = term.trim().to_string();

        let mut matches = self
            .connection
            .find(
                &SoqlQuery::new(object)
                    .select(["Id", "Name"])
                    .with_condition(Condition::contains("Name", term.as_str()))
                    .order_by("Name")
                    .limit(Some(DEFAULT_SEARCH_LIMIT + 1)),
            )
            .await?;

        // One extra row tells us the list is cut off
        let truncated = matches.len() > DEFAULT_SEARCH_LIMIT as usize;
        if truncated {
            matches.truncate(DEFAULT_SEARCH_LIMIT as usize);
            tracing::info!("{} search '{}' matched more than {} records", object, term, DEFAULT_SEARCH_LIMIT);
        }

        match matches.len() {
            0 => Err(SalesforceMcpError::Flow(FlowAbort::NoMatches {
                object: object.to_string(),
                term,
            })),
            1 => Ok(matches.remove(0)),
            count => {
                let labels: Vec<String> = matches.iter().map(account_label).collect();
                let heading = if truncated {
                    format!(
                        "More than {} {} records match '{}'. Showing the first {}; \
                         search with a more specific name if yours is not listed:",
                        count, object, term, count
                    )
                } else {
                    format!("Found {} {} records matching '{}':", count, object, term)
                };
                let answer = self
                    .prompter
                    .prompt(&format!(
                        "{}\n{}\n\nEnter the number of the {} to use:",
                        heading,
                        numbered_list(&labels),
                        noun
                    ))
                    .await?;
                let index = parse_selection(&answer, count)?;
                Ok(matches.swap_remove(index))
            }
        }
    }

    /// Pick one active value of a picklist field; `None` when it has no values
    async fn select_picklist(&self, field: &FieldDescribe) -> Result<Option<String>> {
        let entries = field.active_picklist_values();
        if entries.is_empty() {
            tracing::warn!("Picklist {} has no active values; skipping", field.name);
            return Ok(None);
        }

        let answer = self
            .prompter
            .prompt(&format!(
                "Select {}:\n{}\n\nEnter a number:",
                field.label,
                format_picklist(&entries)
            ))
            .await?;
        let index = parse_selection(&answer, entries.len())?;

        Ok(Some(entries[index].value.clone()))
    }

    /// Re-prompt until the answer is non-blank
    async fn prompt_required(&self, message: &str) -> Result<String> {
        loop {
            let answer = self.prompter.prompt(message).await?;
            let answer = answer.trim();
            if !answer.is_empty() {
                return Ok(answer.to_string());
            }
            tracing::debug!("Empty answer for a required value; asking again");
        }
    }

    /// A scalar value typed by the user, converted per field type
    async fn prompt_scalar(&self, field: &FieldDescribe) -> Result<Value> {
        let kind = field.field_type.input_kind();
        let hint = match kind {
            InputKind::Boolean => " (true/false)",
            InputKind::Integer => " (whole number)",
            InputKind::Number => " (number)",
            InputKind::Temporal if field.field_type.as_str() == "date" => " (YYYY-MM-DD)",
            InputKind::Temporal => " (YYYY-MM-DDThh:mm:ssZ)",
            _ => "",
        };

        let answer = self
            .prompter
            .prompt(&format!("Enter {}{}:", field.label, hint))
            .await?;
        let answer = answer.trim();

        let invalid_number = || {
            SalesforceMcpError::Flow(FlowAbort::InvalidNumber {
                field: field.label.clone(),
                input: answer.to_string(),
            })
        };

        match kind {
            InputKind::Boolean => Ok(Value::Bool(answer.eq_ignore_ascii_case("true"))),
            InputKind::Integer => answer
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid_number()),
            InputKind::Number => answer
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(invalid_number),
            _ => Ok(Value::String(answer.to_string())),
        }
    }
}
