//! REST surface (`/rest/v1`) over plain HTTP.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Query, Returning, Transport, TransportError, TransportMode};

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Stateless REST client; the bearer token is supplied per call.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    anon_key: String,
}

impl RestClient {
    pub fn new(http: Client, backend_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: format!("{}/rest/v1", backend_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
        }
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    fn request(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%method, %url, "rest request");
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .header("Content-Type", "application/json")
    }

    pub async fn select(&self, bearer: &str, table: &str, query: &Query) -> Result<Vec<Value>, TransportError> {
        let resp = self
            .request(Method::GET, table, bearer)
            .query(&query.to_params())
            .send()
            .await?;
        Ok(into_rows(read_json(resp).await?))
    }

    pub async fn insert(
        &self,
        bearer: &str,
        table: &str,
        row: &Value,
        returning: Returning,
    ) -> Result<Vec<Value>, TransportError> {
        let resp = self
            .request(Method::POST, table, bearer)
            .header("Prefer", returning.prefer_header())
            .json(row)
            .send()
            .await?;
        Ok(into_rows(read_json(resp).await?))
    }

    pub async fn update(
        &self,
        bearer: &str,
        table: &str,
        patch: &Value,
        query: &Query,
    ) -> Result<Vec<Value>, TransportError> {
        let resp = self
            .request(Method::PATCH, table, bearer)
            .header("Prefer", Returning::Representation.prefer_header())
            .query(&query.to_params())
            .json(patch)
            .send()
            .await?;
        Ok(into_rows(read_json(resp).await?))
    }

    pub async fn delete(&self, bearer: &str, table: &str, query: &Query) -> Result<(), TransportError> {
        let resp = self
            .request(Method::DELETE, table, bearer)
            .query(&query.to_params())
            .send()
            .await?;
        read_json(resp).await?;
        Ok(())
    }

    pub async fn rpc(&self, bearer: &str, function: &str, args: &Value) -> Result<Value, TransportError> {
        let resp = self
            .request(Method::POST, &format!("rpc/{function}"), bearer)
            .json(args)
            .send()
            .await?;
        Ok(read_json(resp).await?.unwrap_or(Value::Null))
    }
}

/// Decode a response body; `None` for 204 and empty bodies.
async fn read_json(resp: Response) -> Result<Option<Value>, TransportError> {
    let status = resp.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let body = resp.text().await?;
    if !status.is_success() {
        let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
        let (message, code) = match parsed {
            Some(ErrorBody {
                message: Some(message),
                code,
                details,
            }) => {
                let message = match details {
                    Some(details) if !details.is_empty() => format!("{message} ({details})"),
                    _ => message,
                };
                (message, code)
            }
            Some(ErrorBody { code, .. }) => (status_text(status), code),
            None => (status_text(status), None),
        };
        return Err(TransportError::Status {
            status: status.as_u16(),
            message,
            code,
        });
    }
    if body.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&body)?))
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string())
}

fn into_rows(value: Option<Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(rows)) => rows,
        Some(other) => vec![other],
    }
}

/// Transport pinned to a recovered access token.
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: RestClient,
    token: String,
}

impl RestTransport {
    pub fn new(client: RestClient, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
        }
    }
}

#[async_trait]
impl Transport for RestTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Raw
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, TransportError> {
        self.client.select(&self.token, table, query).await
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        returning: Returning,
    ) -> Result<Vec<Value>, TransportError> {
        self.client.insert(&self.token, table, &row, returning).await
    }

    async fn update(&self, table: &str, patch: Value, query: &Query) -> Result<Vec<Value>, TransportError> {
        self.client.update(&self.token, table, &patch, query).await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<(), TransportError> {
        self.client.delete(&self.token, table, query).await
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, TransportError> {
        self.client.rpc(&self.token, function, &args).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = RestClient::new(Client::new(), "https://x.example/", "anon");
        assert_eq!(client.base_url, "https://x.example/rest/v1");
    }

    #[test]
    fn rows_from_any_shape() {
        assert!(into_rows(None).is_empty());
        assert!(into_rows(Some(Value::Null)).is_empty());
        assert_eq!(into_rows(Some(json!([1, 2]))).len(), 2);
        assert_eq!(into_rows(Some(json!({ "id": 1 }))), vec![json!({ "id": 1 })]);
    }
}
