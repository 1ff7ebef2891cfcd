//! Data transports.
//!
//! Every component reads and writes through a [`Transport`]. Two
//! implementations exist: [`SdkTransport`], which asks the auth client for the
//! current token before each call, and [`RestTransport`], which uses a fixed
//! token recovered from storage and never touches the auth client (the
//! fallback used while the auth client's storage lock is stalled).

mod rest;
mod sdk;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::auth::AuthError;

pub use rest::{RestClient, RestTransport};
pub use sdk::SdkTransport;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Could not obtain access token: {0}")]
    Auth(#[from] AuthError),
}

/// Which transport the session store currently routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Auth-client-backed transport.
    Primary,
    /// Direct HTTP with a recovered token.
    Raw,
}

/// What an insert returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returning {
    Representation,
    Minimal,
}

impl Returning {
    pub fn prefer_header(self) -> &'static str {
        match self {
            Returning::Representation => "return=representation",
            Returning::Minimal => "return=minimal",
        }
    }
}

/// Row filter, projection and limit rendered as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    select: Option<String>,
    filters: Vec<(String, String)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    /// Equality filter (`column=eq.value`).
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push((column.to_string(), value.to_string()));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Equality filters as `(column, value)` pairs.
    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }

    pub fn columns(&self) -> Option<&str> {
        self.select.as_deref()
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(self.filters.len() + 2);
        if let Some(select) = &self.select {
            params.push(("select".to_string(), select.clone()));
        }
        for (column, value) in &self.filters {
            params.push((column.clone(), format!("eq.{value}")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Table and RPC access.
#[async_trait]
pub trait Transport: Send + Sync {
    fn mode(&self) -> TransportMode;

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, TransportError>;

    /// First matching row, if any.
    async fn select_one(&self, table: &str, query: &Query) -> Result<Option<Value>, TransportError> {
        let rows = self.select(table, &query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        returning: Returning,
    ) -> Result<Vec<Value>, TransportError>;

    async fn update(&self, table: &str, patch: Value, query: &Query) -> Result<Vec<Value>, TransportError>;

    async fn delete(&self, table: &str, query: &Query) -> Result<(), TransportError>;

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, TransportError>;
}

/// Deserialize rows into typed records.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, TransportError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(TransportError::from))
        .collect()
}
