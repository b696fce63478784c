//! The connection seam between tool handlers and the CRM
//!
//! Handlers and the guided case flow only talk to Salesforce through this
//! trait, so they can run against [`crate::salesforce::client::SalesforceClient`]
//! in production and an in-memory double in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::salesforce::soql::SoqlQuery;
use crate::salesforce::types::{ObjectDescribe, Record, SaveResult};

/// Per-object operations against an authenticated session
#[async_trait]
pub trait Connection: Send + Sync {
    /// Field metadata for an object
    async fn describe(&self, object: &str) -> Result<ObjectDescribe>;

    /// Records matching a query
    async fn find(&self, query: &SoqlQuery) -> Result<Vec<Record>>;

    /// A single record by ID
    async fn retrieve(&self, object: &str, id: &str, fields: &[&str]) -> Result<Record>;

    /// Insert records; one result per record, in order
    async fn create(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>>;

    /// Update records that carry an `Id`; one result per record, in order
    async fn update(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>>;

    /// Delete records by ID; one result per ID, in order
    async fn destroy(&self, object: &str, ids: &[String]) -> Result<Vec<SaveResult>>;

    /// Insert or update, matching on `external_id_field`
    async fn upsert(
        &self,
        object: &str,
        external_id_field: &str,
        records: Vec<Record>,
    ) -> Result<Vec<SaveResult>>;
}
