//! HTTP client for the Zync backend auth service.

use crate::config::ApiConfig;
use crate::types::{Role, Tier, User, UserId, UserStats};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from backend calls
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Request never produced a response
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Response body was not what the endpoint documents
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Credentials or bearer token rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Normalized message from the response body
        message: String,
    },

    /// Login succeeded but no access token came back
    #[error("Login failed")]
    MissingAccessToken,
}

impl BackendError {
    /// Message suitable for showing to the user
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Unauthorized(message) | Self::ApiError { message, .. } => message,
            Self::MissingAccessToken => "Login failed",
            Self::RequestFailed(_) | Self::ResponseParseFailed(_) => "Service unavailable",
        }
    }

    /// Returns `true` if retrying with other input could succeed
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        match self {
            Self::Unauthorized(_) => true,
            Self::ApiError { status, .. } => *status >= 400 && *status < 500,
            _ => false,
        }
    }
}

/// Extract a displayable message from an error body
///
/// Tries a JSON `message` string, then a JSON `message` list of strings, then
/// falls back to the raw body.
#[must_use]
pub fn normalize_error_message(status: u16, body: &str) -> String {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        match fields.get("message") {
            Some(serde_json::Value::String(message)) => return message.clone(),
            Some(serde_json::Value::Array(parts)) => {
                let parts: Vec<&str> = parts.iter().filter_map(serde_json::Value::as_str).collect();
                if !parts.is_empty() {
                    return parts.join(", ");
                }
            },
            _ => {},
        }
    }

    let body = body.trim();
    if body.is_empty() {
        format!("Request failed with status {status}")
    } else {
        body.to_string()
    }
}

/// `POST /auth/login` body
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Account email
    pub email: String,
    /// Password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// `POST /auth/register` body
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Account email
    pub email: String,
    /// Password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Nationality
    pub nationality: String,
    /// Phone number
    pub phone: String,
    /// City
    pub city: String,
    /// State or region
    pub state: String,
    /// Country
    pub country: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: Option<String>,
}

/// User record as returned by `GET /auth/me`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUser {
    /// Account id
    pub id: String,
    /// Account email
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Nationality
    #[serde(default)]
    pub nationality: Option<String>,
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// City
    #[serde(default)]
    pub city: Option<String>,
    /// Loyalty points
    #[serde(default)]
    pub zync_points: u64,
}

impl From<BackendUser> for User {
    fn from(user: BackendUser) -> Self {
        let local_part = user.email.split('@').next().unwrap_or_default().to_string();
        Self {
            id: UserId::new(user.id),
            name: format!("{} {}", user.first_name, user.last_name).trim().to_string(),
            handle: format!("@{local_part}"),
            avatar: format!("https://i.pravatar.cc/150?u={local_part}"),
            email: user.email,
            role: Role::User,
            balance: 0,
            zync_points: user.zync_points,
            tier: Tier::Standard,
            cards: Vec::new(),
            stats: UserStats::default(),
        }
    }
}

/// Backend API client
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for `config.base_url`
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::RequestFailed`] if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange credentials for an access token
    ///
    /// # Errors
    ///
    /// [`BackendError::Unauthorized`] for bad credentials,
    /// [`BackendError::MissingAccessToken`] if the response carries no token.
    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: &LoginRequest) -> Result<String, BackendError> {
        let response: LoginResponse = self
            .parse(self.client.post(self.url("/auth/login")).json(request))
            .await?;
        response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(BackendError::MissingAccessToken)
    }

    /// Create an account; the backend then emails a verification code
    ///
    /// # Errors
    ///
    /// Returns the normalized backend error.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), BackendError> {
        self.execute(self.client.post(self.url("/auth/register")).json(request))
            .await
    }

    /// Confirm an email address with the one-time code
    ///
    /// # Errors
    ///
    /// Returns the normalized backend error, e.g. for a wrong or expired code.
    pub async fn verify_email(&self, email: &str, otp: &str) -> Result<(), BackendError> {
        let body = serde_json::json!({ "email": email, "otp": otp });
        self.execute(self.client.post(self.url("/email/verify")).json(&body))
            .await
    }

    /// Send the verification code again
    ///
    /// # Errors
    ///
    /// Returns the normalized backend error.
    pub async fn resend_verification(&self, email: &str) -> Result<(), BackendError> {
        let body = serde_json::json!({ "email": email });
        self.execute(self.client.post(self.url("/email/resend")).json(&body))
            .await
    }

    /// Ask for a verification code for an existing account
    ///
    /// # Errors
    ///
    /// Returns the normalized backend error.
    pub async fn request_email_verification(&self, email: &str) -> Result<(), BackendError> {
        let body = serde_json::json!({ "email": email });
        self.execute(self.client.post(self.url("/email/request")).json(&body))
            .await
    }

    /// Fetch the user owning `token`
    ///
    /// # Errors
    ///
    /// [`BackendError::Unauthorized`] if the token is no longer valid.
    pub async fn me(&self, token: &str) -> Result<BackendUser, BackendError> {
        self.parse(self.client.get(self.url("/auth/me")).bearer_auth(token))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = normalize_error_message(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), %message, "Backend call failed");

        match status {
            StatusCode::UNAUTHORIZED => Err(BackendError::Unauthorized(message)),
            status => Err(BackendError::ApiError {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<(), BackendError> {
        self.send(request).await.map(|_| ())
    }

    async fn parse<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, BackendError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::ResponseParseFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_string_wins() {
        let body = r#"{"message":"Invalid credentials","statusCode":401}"#;
        assert_eq!(normalize_error_message(401, body), "Invalid credentials");
    }

    #[test]
    fn message_list_is_joined() {
        let body = r#"{"message":["email must be an email","password is too short"]}"#;
        assert_eq!(
            normalize_error_message(400, body),
            "email must be an email, password is too short"
        );
    }

    #[test]
    fn raw_body_is_the_fallback() {
        assert_eq!(normalize_error_message(502, "Bad gateway\n"), "Bad gateway");
        assert_eq!(normalize_error_message(500, r#"{"error":"boom"}"#), r#"{"error":"boom"}"#);
        assert_eq!(normalize_error_message(503, ""), "Request failed with status 503");
    }

    #[test]
    fn backend_user_becomes_domain_user() {
        let user: User = BackendUser {
            id: "42".to_string(),
            email: "ana@zync.com".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Rojas".to_string(),
            nationality: None,
            phone: None,
            city: None,
            zync_points: 300,
        }
        .into();

        assert_eq!(user.name, "Ana Rojas");
        assert_eq!(user.handle, "@ana");
        assert_eq!(user.zync_points, 300);
        assert_eq!(user.balance, 0);
    }

    #[test]
    fn client_errors_are_user_errors() {
        assert!(BackendError::Unauthorized("no".to_string()).is_user_error());
        assert!(
            BackendError::ApiError {
                status: 409,
                message: "Email taken".to_string()
            }
            .is_user_error()
        );
        assert!(!BackendError::RequestFailed("dns".to_string()).is_user_error());
    }
}
