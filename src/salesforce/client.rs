//! Salesforce REST API client
//!
//! [`Connection`] implementation over the REST API: describe, SOQL query,
//! single-record retrieve, and the sObject Collections endpoints for DML.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::salesforce::COLLECTION_CHUNK_SIZE;
use crate::error::{AuthError, Result, SalesforceApiError, SalesforceMcpError};
use crate::salesforce::auth::{Authenticator, Session};
use crate::salesforce::connection::Connection;
use crate::salesforce::soql::{validate_identifier, SoqlQuery};
use crate::salesforce::types::*;
use crate::salesforce::utils::with_type_attribute;

/// Salesforce REST API client
pub struct SalesforceClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// OAuth authenticator
    authenticator: Arc<Authenticator>,

    /// REST API version, e.g. v59.0
    api_version: String,
}

impl SalesforceClient {
    /// Create a new Salesforce client
    pub fn new(authenticator: Arc<Authenticator>, api_version: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            authenticator,
            api_version: api_version.into(),
        }
    }

    /// Absolute URL for a data API path (`/sobjects/...`) or a server-relative
    /// path already rooted at `/services/` (as in `nextRecordsUrl`)
    fn url_for(&self, session: &Session, path: &str) -> String {
        if path.starts_with("/services/") {
            format!("{}{}", session.instance_url, path)
        } else {
            format!(
                "{}/services/data/{}{}",
                session.instance_url, self.api_version, path
            )
        }
    }

    /// Send a request and decode the JSON response
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let session = self.authenticator.session().await?;
        let url = self.url_for(&session, path);

        tracing::debug!("{} {}", method, url);

        let mut request = self
            .http_client
            .request(method, &url)
            .bearer_auth(&session.access_token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        if status.as_u16() == 401 {
            self.authenticator.invalidate().await;
            return Err(SalesforceMcpError::Auth(AuthError::SessionExpired));
        }

        let text = response.text().await.unwrap_or_default();
        Err(SalesforceMcpError::Salesforce(api_error(status.as_u16(), &text)))
    }

    /// Run a collections request over `records` in chunks, concatenating results
    async fn collection_request(
        &self,
        method: Method,
        path: &str,
        object: &str,
        records: Vec<Record>,
    ) -> Result<Vec<SaveResult>> {
        let method = &method;
        run_chunks(&records, COLLECTION_CHUNK_SIZE, |chunk| {
            let body = CollectionRequest {
                all_or_none: false,
                records: chunk
                    .iter()
                    .cloned()
                    .map(|r| with_type_attribute(object, r))
                    .collect(),
            };
            async move {
                let body = serde_json::to_value(body)?;
                self.request(method.clone(), path, Some(body)).await
            }
        })
        .await
    }
}

/// Send `items` in chunks and line the results up with the items.
///
/// Earlier chunks are already committed when a later one fails, so a failed
/// chunk becomes one failed result per item and the rest still run. Only
/// when every chunk fails is the first error returned.
async fn run_chunks<T, F, Fut>(
    items: &[T],
    chunk_size: usize,
    mut send: F,
) -> Result<Vec<SaveResult>>
where
    F: FnMut(&[T]) -> Fut,
    Fut: Future<Output = Result<Vec<SaveResult>>>,
{
    let mut results = Vec::with_capacity(items.len());
    let mut first_error = None;
    let mut any_sent = false;

    for chunk in items.chunks(chunk_size) {
        match send(chunk).await {
            Ok(mut chunk_results) => {
                any_sent = true;
                chunk_results.truncate(chunk.len());
                while chunk_results.len() < chunk.len() {
                    chunk_results.push(SaveResult::failed("no result returned", None));
                }
                results.extend(chunk_results);
            }
            Err(e) => {
                tracing::warn!("Chunk of {} record(s) failed: {}", chunk.len(), e);
                let code = match &e {
                    SalesforceMcpError::Salesforce(SalesforceApiError::RequestFailed {
                        error_code,
                        ..
                    }) => error_code.clone(),
                    _ => None,
                };
                let message = e.to_string();
                results.extend(
                    chunk
                        .iter()
                        .map(|_| SaveResult::failed(message.as_str(), code.as_deref())),
                );
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if !any_sent => Err(e),
        _ => Ok(results),
    }
}

/// Build an API error from a failed response body.
///
/// The REST API reports errors as `[{"message": ..., "errorCode": ...}]`.
fn api_error(status: u16, body: &str) -> SalesforceApiError {
    match serde_json::from_str::<Vec<ApiErrorBody>>(body) {
        Ok(errors) if !errors.is_empty() => SalesforceApiError::RequestFailed {
            status,
            error_code: errors[0].error_code.clone(),
            message: errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        },
        _ => SalesforceApiError::RequestFailed {
            status,
            error_code: None,
            message: body.to_string(),
        },
    }
}

#[async_trait]
impl Connection for SalesforceClient {
    async fn describe(&self, object: &str) -> Result<ObjectDescribe> {
        validate_identifier(object)?;
        self.request(Method::GET, &format!("/sobjects/{}/describe", object), None)
            .await
    }

    async fn find(&self, query: &SoqlQuery) -> Result<Vec<Record>> {
        let soql = query.to_soql()?;
        tracing::debug!("SOQL: {}", soql);

        let mut page: QueryResponse = self
            .request(
                Method::GET,
                &format!("/query?q={}", urlencoding::encode(&soql)),
                None,
            )
            .await?;
        let mut records = std::mem::take(&mut page.records);

        while !page.done {
            let Some(next) = page.next_records_url.take() else {
                break;
            };
            page = self.request(Method::GET, &next, None).await?;
            records.append(&mut page.records);
        }

        Ok(records)
    }

    async fn retrieve(&self, object: &str, id: &str, fields: &[&str]) -> Result<Record> {
        validate_identifier(object)?;
        validate_identifier(id)?;
        for field in fields {
            validate_identifier(field)?;
        }

        let mut path = format!("/sobjects/{}/{}", object, id);
        if !fields.is_empty() {
            path.push_str(&format!("?fields={}", fields.join(",")));
        }

        match self.request(Method::GET, &path, None).await {
            Err(SalesforceMcpError::Salesforce(SalesforceApiError::RequestFailed {
                status: 404,
                ..
            })) => Err(SalesforceMcpError::Salesforce(SalesforceApiError::RecordNotFound {
                object: object.to_string(),
                id: id.to_string(),
            })),
            other => other,
        }
    }

    async fn create(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>> {
        validate_identifier(object)?;
        tracing::info!("Creating {} {} record(s)", records.len(), object);
        self.collection_request(Method::POST, "/composite/sobjects", object, records)
            .await
    }

    async fn update(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>> {
        validate_identifier(object)?;
        tracing::info!("Updating {} {} record(s)", records.len(), object);
        self.collection_request(Method::PATCH, "/composite/sobjects", object, records)
            .await
    }

    async fn destroy(&self, object: &str, ids: &[String]) -> Result<Vec<SaveResult>> {
        validate_identifier(object)?;
        tracing::info!("Deleting {} {} record(s)", ids.len(), object);

        for id in ids {
            validate_identifier(id)?;
        }

        run_chunks(ids, COLLECTION_CHUNK_SIZE, |chunk| {
            let path = format!(
                "/composite/sobjects?ids={}&allOrNone=false",
                chunk.join(",")
            );
            async move { self.request(Method::DELETE, &path, None).await }
        })
        .await
    }

    async fn upsert(
        &self,
        object: &str,
        external_id_field: &str,
        records: Vec<Record>,
    ) -> Result<Vec<SaveResult>> {
        validate_identifier(object)?;
        validate_identifier(external_id_field)?;
        tracing::info!(
            "Upserting {} {} record(s) on {}",
            records.len(),
            object,
            external_id_field
        );

        let path = format!("/composite/sobjects/{}/{}", object, external_id_field);
        self.collection_request(Method::PATCH, &path, object, records)
            .await
    }
}
