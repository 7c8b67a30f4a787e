//! HTTP client wrapper for the parcel REST API
//!
//! Every call goes through `ApiClient::send`, which:
//! - attaches `Accept` / `Content-Type: application/json`
//! - attaches `Authorization: Bearer <token>` from the session namespace
//!   implied by the path prefix (unless `skip_auth` is set)
//! - unwraps the `{ success, data, message }` envelope on 2xx
//! - maps failures onto the `ApiError` taxonomy (validation, authorization,
//!   generic API error, transport)
//!
//! The client never touches session storage itself; login/logout helpers in
//! `api.rs` do that explicitly.

use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::session::{SessionScope, Sessions};

// ============================================================================
// Error types
// ============================================================================

/// Field name → validation messages, as returned with HTTP 422.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, errors: FieldErrors },

    #[error("{message}")]
    Unauthorized { scope: SessionScope, message: String },

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Presentation class of an error: field-level, re-login, or notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Api,
    Transport,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::Unauthorized { .. } => ErrorKind::Authorization,
            ApiError::Api { .. } => ErrorKind::Api,
            ApiError::Transport(_) | ApiError::Decode(_) => ErrorKind::Transport,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Validation { .. } => Some(422),
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Api { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Decode(_) => None,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Server-provided message for display, or `fallback` when the error
    /// carries nothing readable.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Validation { message, .. }
            | ApiError::Unauthorized { message, .. }
            | ApiError::Api { message, .. }
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            _ => fallback.to_string(),
        }
    }

    /// Client errors (4xx) are answers, not glitches; only server errors and
    /// transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    fn from_status(status: StatusCode, scope: SessionScope, body: Option<Value>) -> Self {
        let code = status.as_u16();
        let message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let errors = body
                .as_ref()
                .and_then(|b| b.get("errors"))
                .and_then(|e| serde_json::from_value::<FieldErrors>(e.clone()).ok());
            if let Some(errors) = errors {
                return ApiError::Validation {
                    message: message.unwrap_or_else(|| "Validation failed".to_string()),
                    errors,
                };
            }
        }

        let message = message.unwrap_or_else(|| format!("API Error: {}", code));
        if status == StatusCode::UNAUTHORIZED {
            return ApiError::Unauthorized { scope, message };
        }
        ApiError::Api {
            status: code,
            message,
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// `{ success, data, message }` response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    pub message: Option<String>,
}

impl<T: DeserializeOwned> Envelope<T> {
    fn from_value(status: StatusCode, body: Value) -> Result<Self, ApiError> {
        let (success, data, message) = match body {
            Value::Object(mut map) if map.contains_key("success") || map.contains_key("data") => {
                let success = map
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let data = map.remove("data").unwrap_or(Value::Null);
                (success, data, message)
            }
            other => (true, other, None),
        };

        if !success {
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| "Request failed".to_string()),
            });
        }

        let data = serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(Envelope {
            success,
            data,
            message,
        })
    }
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> T {
        self.data
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            data: f(self.data),
            message: self.message,
        }
    }
}

// ============================================================================
// ApiClient
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Send without an `Authorization` header (login / register).
    pub skip_auth: bool,
}

impl RequestOptions {
    pub fn anonymous() -> Self {
        Self { skip_auth: true }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    sessions: Sessions,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, sessions: Sessions) -> Result<Self, ApiError> {
        Self::with_base_url(config.base_url.clone(), config.timeout(), sessions)
    }

    /// Create a client with an explicit base URL (tests / alternate hosts)
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
        sessions: Sessions,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            sessions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        self.request::<T, ()>(Method::GET, path, &[], None, RequestOptions::default())
            .await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope<T>, ApiError> {
        self.request::<T, ()>(Method::GET, path, query, None, RequestOptions::default())
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        self.request(Method::POST, path, &[], Some(body), RequestOptions::default())
            .await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        self.request::<T, ()>(Method::POST, path, &[], None, RequestOptions::default())
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        self.request(Method::PUT, path, &[], Some(body), RequestOptions::default())
            .await
    }

    pub async fn put_empty<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        self.request::<T, ()>(Method::PUT, path, &[], None, RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        self.request::<T, ()>(Method::DELETE, path, &[], None, RequestOptions::default())
            .await
    }

    /// Full-control request. `path` must start with `/` and carry no query
    /// string; parameters go in `query`.
    pub async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<Envelope<T>, ApiError> {
        let mut builder = self
            .client
            .request(method.clone(), self.url(path))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(method, path, builder, options).await
    }

    /// Multipart POST. Only `Accept` is set; reqwest supplies the boundary
    /// content type.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<Envelope<T>, ApiError> {
        let builder = self.client.post(self.url(path)).multipart(form);
        self.send(Method::POST, path, builder, RequestOptions::default())
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
        options: RequestOptions,
    ) -> Result<Envelope<T>, ApiError> {
        let session = self.sessions.for_path(path);
        let scope = session.scope();

        let mut builder = builder.header(ACCEPT, HeaderValue::from_static("application/json"));
        if !options.skip_auth {
            if let Some(token) = session.token() {
                builder = builder.bearer_auth(token);
            }
        }

        tracing::debug!(method = %method, path, scope = scope.name(), "API request");

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(method = %method, path, error = %e, "API transport failure");
                return Err(ApiError::Transport(e));
            }
        };

        self.handle_response(method, path, scope, response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        scope: SessionScope,
        response: Response,
    ) -> Result<Envelope<T>, ApiError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice::<Value>(&bytes).ok();

        if !status.is_success() {
            let error = ApiError::from_status(status, scope, body);
            tracing::warn!(
                method = %method,
                path,
                status = status.as_u16(),
                error = %error,
                "API request failed"
            );
            return Err(error);
        }

        let body = match body {
            Some(b) => b,
            None if bytes.iter().all(u8::is_ascii_whitespace) => Value::Null,
            None => {
                return Err(ApiError::Decode(format!(
                    "{} {} returned a non-JSON body",
                    method, path
                )))
            }
        };

        Envelope::from_value(status, body)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::with_base_url(server.uri(), Duration::from_secs(5), Sessions::in_memory())
            .expect("Failed to create client")
    }

    #[tokio::test]
    async fn test_customer_path_uses_customer_token() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        client
            .sessions()
            .customer
            .store_login("cust-token", &json!({}))
            .unwrap();
        client
            .sessions()
            .admin
            .store_login("admin-token", &json!({}))
            .unwrap();

        Mock::given(method("GET"))
            .and(path("/addresses"))
            .and(header("authorization", "Bearer cust-token"))
            .and(header("accept", "application/json"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [1, 2, 3]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope: Envelope<Vec<i32>> = client.get("/addresses").await.unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_admin_path_uses_admin_token() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        client
            .sessions()
            .customer
            .store_login("cust-token", &json!({}))
            .unwrap();
        client
            .sessions()
            .admin
            .store_login("admin-token", &json!({}))
            .unwrap();

        Mock::given(method("GET"))
            .and(path("/admin/stats"))
            .and(header("authorization", "Bearer admin-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"total_clients": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope: Envelope<Value> = client.get("/admin/stats").await.unwrap();
        assert_eq!(envelope.data["total_clients"], 4);
    }

    #[tokio::test]
    async fn test_skip_auth_omits_authorization() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        client
            .sessions()
            .customer
            .store_login("cust-token", &json!({}))
            .unwrap();

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "a@b.c", "password": "pw"})))
            .respond_with(|req: &Request| {
                let authorized = req.headers.contains_key("authorization");
                ResponseTemplate::new(200).set_body_json(json!({
                    "success": true,
                    "data": {"had_auth": authorized}
                }))
            })
            .mount(&server)
            .await;

        let envelope: Envelope<Value> = client
            .request(
                Method::POST,
                "/auth/login",
                &[],
                Some(&json!({"email": "a@b.c", "password": "pw"})),
                RequestOptions::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(envelope.data["had_auth"], false);
    }

    #[tokio::test]
    async fn test_no_token_sends_no_authorization() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": null
            })))
            .mount(&server)
            .await;

        let envelope: Envelope<Option<Value>> = client.get("/user").await.unwrap();
        assert!(envelope.data.is_none());
    }

    #[tokio::test]
    async fn test_422_maps_to_validation_error() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        Mock::given(method("POST"))
            .and(path("/addresses"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "The given data was invalid.",
                "errors": {
                    "city": ["The city field is required."],
                    "phone": ["The phone field is required.", "The phone format is invalid."]
                }
            })))
            .mount(&server)
            .await;

        let result: Result<Envelope<Value>, _> = client.post("/addresses", &json!({})).await;
        match result {
            Err(ApiError::Validation { message, errors }) => {
                assert_eq!(message, "The given data was invalid.");
                assert_eq!(errors["city"].len(), 1);
                assert_eq!(errors["phone"].len(), 2);
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_422_without_errors_is_generic() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "Code expired"})),
            )
            .mount(&server)
            .await;

        let err = client
            .post::<Value, _>("/discounts/apply", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.user_message("fallback"), "Code expired");
    }

    #[tokio::test]
    async fn test_500_without_body_uses_status_message() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = client.get::<Value>("/packages").await.unwrap_err();
        match &err {
            ApiError::Api { status, message } => {
                assert_eq!(*status, 503);
                assert_eq!(message, "API Error: 503");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_401_maps_to_authorization_in_scope() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})),
            )
            .mount(&server)
            .await;

        let err = client.get::<Value>("/admin/clients").await.unwrap_err();
        match err {
            ApiError::Unauthorized { scope, message } => {
                assert_eq!(scope, SessionScope::Admin);
                assert_eq!(message, "Unauthenticated.");
            }
            other => panic!("Expected Unauthorized error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_false_surfaces_as_api_error() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "Address limit reached"
            })))
            .mount(&server)
            .await;

        let err = client
            .put::<Value, _>("/addresses/4", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.user_message("x"), "Address limit reached");
    }

    #[tokio::test]
    async fn test_query_parameters_are_encoded() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        Mock::given(method("GET"))
            .and(path("/packages"))
            .and(query_param("shipping_method", "sea freight"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope: Envelope<Vec<Value>> = client
            .get_with_query("/packages", &[("shipping_method", "sea freight".to_string())])
            .await
            .unwrap();
        assert!(envelope.data.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_transport_kind() {
        let client = ApiClient::with_base_url(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
            Sessions::in_memory(),
        )
        .unwrap();

        let err = client.get::<Value>("/user").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.user_message("Failed to load"), "Failed to load");
    }

    #[tokio::test]
    async fn test_non_json_success_body_is_decode_error() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client.get::<Value>("/user").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
