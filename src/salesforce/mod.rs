//! Salesforce API module
//!
//! Contains types, authentication, query building and the REST client.

pub mod auth;
pub mod client;
pub mod connection;
pub mod soql;
pub mod types;
pub mod utils;
