use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_models::error::AppError;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database rejected credentials: {0}")]
    Auth(String),

    #[error("Database API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Database configuration error: {0}")]
    Configuration(String),

    #[error("Database returned no rows for a write")]
    EmptyResult,

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    fn from_response(status: StatusCode, body: String) -> Self {
        if status == StatusCode::CONFLICT || body.contains(UNIQUE_VIOLATION) {
            return DbError::Conflict(body);
        }

        match status.as_u16() {
            401 | 403 => DbError::Auth(body),
            404 => DbError::NotFound(body),
            code => DbError::Api { status: code, message: body },
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => AppError::NotFound(msg),
            DbError::Conflict(_) => AppError::Conflict("Resource already exists".to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

/// PostgREST client for the relational store. All calls authenticate with the
/// service key; end-user authorization happens in the handlers.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap, DbError> {
        let mut headers = HeaderMap::new();

        let key = HeaderValue::from_str(&self.service_key)
            .map_err(|_| DbError::Configuration("service key is not a valid header value".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.service_key))
            .map_err(|_| DbError::Configuration("service key is not a valid header value".into()))?;

        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, body, extra_headers).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Counts rows matching `path` using PostgREST's exact count header. Falls
    /// back to counting the returned rows when the header is absent.
    pub async fn count(&self, path: &str) -> Result<usize, DbError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let response = self.send(Method::GET, path, None, Some(headers)).await?;

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total);

        match total {
            Some(total) => Ok(total),
            None => {
                let rows: Vec<Value> = response.json().await?;
                Ok(rows.len())
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<reqwest::Response, DbError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Database API error ({}): {}", status, error_text);
            return Err(DbError::from_response(status, error_text));
        }

        Ok(response)
    }
}

fn parse_content_range_total(value: &str) -> Option<usize> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> AppConfig {
        AppConfig {
            supabase_url: server.uri(),
            supabase_service_key: "service-key".to_string(),
            jwt_secret: "secret".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_content_range_parsing() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
    }

    #[test]
    fn test_error_classification() {
        assert_matches!(
            DbError::from_response(StatusCode::CONFLICT, "dup".into()),
            DbError::Conflict(_)
        );
        assert_matches!(
            DbError::from_response(
                StatusCode::BAD_REQUEST,
                r#"{"code":"23505","message":"duplicate key"}"#.into()
            ),
            DbError::Conflict(_)
        );
        assert_matches!(
            DbError::from_response(StatusCode::UNAUTHORIZED, "nope".into()),
            DbError::Auth(_)
        );
        assert_matches!(
            DbError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
            DbError::Api { status: 500, .. }
        );
    }

    #[tokio::test]
    async fn test_request_sends_service_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config_for(&server));
        let rows: Vec<Value> = client
            .request(Method::GET, "/rest/v1/doctors", None)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_count_uses_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .and(header("prefer", "count=exact"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-range", "0-1/42")
                    .set_body_json(json!([{"id": 1}, {"id": 2}])),
            )
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config_for(&server));
        assert_eq!(client.count("/rest/v1/patients").await.unwrap(), 42);
    }
}
