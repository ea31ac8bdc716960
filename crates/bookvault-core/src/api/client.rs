//! API client for the BookVault REST API.
//!
//! Every request made on behalf of the session goes through `send`, which
//! asks the `SessionController` for the credential first and reports a 401
//! back to it afterwards. Login and self-registration are public and never
//! touch the session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{Authenticator, Authorization, SessionController, SessionUser, SESSION_EXPIRED_REASON};
use crate::models::{Book, BookDto, IssueRecord, LoginRequest, LoginResponse, RegisterRequest};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register_normal_user";
const REGISTER_ADMIN_PATH: &str = "/api/admin/register_admin_user";
const BOOKS_PATH: &str = "/api/books";
const ISSUE_RECORDS_PATH: &str = "/api/issue_records";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Whether a request is made on behalf of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Public,
    Session,
}

/// API client for the library service.
/// Clone is cheap - reqwest::Client and the session handle are both shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionController,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionController) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ===== Session =====

    /// Log in through the authentication endpoint.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<SessionUser, ApiError> {
        self.session.login(self, identifier, secret).await
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    // ===== Accounts =====

    /// Register a reader account. Does not log the new account in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<String, ApiError> {
        Self::validate_registration(request)?;
        let body = serde_json::to_value(request).map_err(Self::encode_error)?;
        let message = self.text(Method::POST, REGISTER_PATH, Some(&body), Auth::Public).await?;
        info!(username = %request.username, "Registered user");
        Ok(message)
    }

    /// Register an administrator account. The server requires the current
    /// session to hold the administrator role.
    pub async fn register_admin(&self, request: &RegisterRequest) -> Result<String, ApiError> {
        Self::validate_registration(request)?;
        let body = serde_json::to_value(request).map_err(Self::encode_error)?;
        let message = self
            .text(Method::POST, REGISTER_ADMIN_PATH, Some(&body), Auth::Session)
            .await?;
        info!(username = %request.username, "Registered administrator");
        Ok(message)
    }

    fn validate_registration(request: &RegisterRequest) -> Result<(), ApiError> {
        if request.username.trim().is_empty()
            || request.email.trim().is_empty()
            || request.password.is_empty()
        {
            return Err(ApiError::Validation(
                "Username, email and password required".to_string(),
            ));
        }
        Ok(())
    }

    // ===== Catalog =====

    pub async fn list_books(&self) -> Result<Vec<Book>, ApiError> {
        let path = format!("{}/get_all_books", BOOKS_PATH);
        self.json(Method::GET, &path, None).await
    }

    pub async fn get_book(&self, id: i64) -> Result<Book, ApiError> {
        let path = format!("{}/get_book_by_id/{}", BOOKS_PATH, id);
        self.json(Method::GET, &path, None).await
    }

    pub async fn create_book(&self, book: &BookDto) -> Result<Book, ApiError> {
        book.validate()?;
        let body = serde_json::to_value(book).map_err(Self::encode_error)?;
        let path = format!("{}/add_book", BOOKS_PATH);
        let created: Book = self.json(Method::POST, &path, Some(&body)).await?;
        info!(id = created.id, title = %created.title, "Book created");
        Ok(created)
    }

    pub async fn update_book(&self, id: i64, book: &BookDto) -> Result<Book, ApiError> {
        book.validate()?;
        let body = serde_json::to_value(book).map_err(Self::encode_error)?;
        let path = format!("{}/update_book/{}", BOOKS_PATH, id);
        let updated: Book = self.json(Method::PUT, &path, Some(&body)).await?;
        info!(id, "Book updated");
        Ok(updated)
    }

    /// Delete a catalog entry, returning the server's confirmation text.
    pub async fn delete_book(&self, id: i64) -> Result<String, ApiError> {
        let path = format!("{}/delete_book/{}", BOOKS_PATH, id);
        let message = self.text(Method::DELETE, &path, None, Auth::Session).await?;
        info!(id, "Book deleted");
        Ok(message)
    }

    // ===== Issue records =====

    /// Borrow a book as the signed-in user. The returned record's ID is the
    /// only handle for returning it later.
    pub async fn issue_book(&self, book_id: i64) -> Result<IssueRecord, ApiError> {
        let path = format!("{}/issue_book/{}", ISSUE_RECORDS_PATH, book_id);
        let record: IssueRecord = self.json(Method::POST, &path, None).await?;
        info!(book_id, issue_record_id = record.id, "Book issued");
        Ok(record)
    }

    pub async fn return_book(&self, issue_record_id: i64) -> Result<IssueRecord, ApiError> {
        let path = format!("{}/return_book/{}", ISSUE_RECORDS_PATH, issue_record_id);
        let record: IssueRecord = self.json(Method::POST, &path, None).await?;
        info!(issue_record_id, "Book returned");
        Ok(record)
    }

    // ===== Transport =====

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn encode_error(e: serde_json::Error) -> ApiError {
        ApiError::InvalidResponse(format!("Failed to encode request body: {}", e))
    }

    /// Headers for an outgoing request. A lapsed credential ends the session
    /// and the request is abandoned.
    fn auth_headers(&self, auth: Auth) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if auth == Auth::Public {
            return Ok(headers);
        }
        match self.session.authorize() {
            Authorization::Anonymous => {}
            Authorization::Bearer(credential) => {
                let value = header::HeaderValue::from_str(&format!("Bearer {}", credential.as_str()))
                    .map_err(|_| {
                        ApiError::InvalidResponse("stored credential is not a valid header value".to_string())
                    })?;
                headers.insert(header::AUTHORIZATION, value);
            }
            Authorization::Expired => return Err(ApiError::SessionExpired),
        }
        Ok(headers)
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit
    /// (should retry), or Err for other errors. A 401 on a request that
    /// carried the session credential ends the session.
    async fn check_response(&self, response: Response, sent_credential: bool) -> Result<Option<Response>, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        if status.as_u16() == 429 {
            return Ok(None);
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 && sent_credential {
            warn!(%status, "Request rejected, ending session");
            self.session.force_logout(SESSION_EXPIRED_REASON);
            return Err(ApiError::SessionRejected);
        }
        Err(ApiError::from_status(status, &body))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        auth: Auth,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let headers = self.auth_headers(auth)?;
            let sent_credential = headers.contains_key(header::AUTHORIZATION);
            let mut request = self.client.request(method.clone(), &url).headers(headers);
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, url = %url, "Sending request");
            let response = request.send().await?;

            match self.check_response(response, sent_credential).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        self.json_with(method, path, body, Auth::Session).await
    }

    async fn json_with<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        auth: Auth,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, body, auth).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }

    async fn text(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        auth: Auth,
    ) -> Result<String, ApiError> {
        let response = self.send(method, path, body, auth).await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Authenticator for ApiClient {
    async fn authenticate(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let body = serde_json::to_value(request).map_err(Self::encode_error)?;
        self.json_with(Method::POST, LOGIN_PATH, Some(&body), Auth::Public).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish()
    }
}
