//! Auth-client-backed transport.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Query, RestClient, Returning, Transport, TransportError, TransportMode};
use crate::auth::AuthClient;

/// Resolves the bearer through the auth client before each call, so it
/// picks up refreshed tokens and falls back to the anon key when signed out.
pub struct SdkTransport {
    client: RestClient,
    auth: Arc<dyn AuthClient>,
}

impl SdkTransport {
    pub fn new(client: RestClient, auth: Arc<dyn AuthClient>) -> Self {
        Self { client, auth }
    }

    async fn bearer(&self) -> Result<String, TransportError> {
        let session = self.auth.get_session(&CancellationToken::new()).await?;
        Ok(session
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.client.anon_key().to_string()))
    }
}

#[async_trait]
impl Transport for SdkTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Primary
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, TransportError> {
        let bearer = self.bearer().await?;
        self.client.select(&bearer, table, query).await
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        returning: Returning,
    ) -> Result<Vec<Value>, TransportError> {
        let bearer = self.bearer().await?;
        self.client.insert(&bearer, table, &row, returning).await
    }

    async fn update(&self, table: &str, patch: Value, query: &Query) -> Result<Vec<Value>, TransportError> {
        let bearer = self.bearer().await?;
        self.client.update(&bearer, table, &patch, query).await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<(), TransportError> {
        let bearer = self.bearer().await?;
        self.client.delete(&bearer, table, query).await
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, TransportError> {
        let bearer = self.bearer().await?;
        self.client.rpc(&bearer, function, &args).await
    }
}
