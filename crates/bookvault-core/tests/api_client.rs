//! HTTP layer tests against an in-process library API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;

use bookvault_core::api::{ApiClient, ApiError};
use bookvault_core::auth::{
    Credential, ManualClock, SessionController, SessionPhase, SessionStore, SessionUser,
    SESSION_EXPIRED_REASON,
};
use bookvault_core::models::BookDto;

const NOW: i64 = 1_700_000_000;

fn token(exp: i64, roles: &[&str]) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = json!({ "sub": "ada@example.com", "exp": exp, "roles": roles });
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, body)
}

fn book_json(id: i64) -> Value {
    json!({
        "id": id,
        "title": "Dune",
        "author": "Frank Herbert",
        "isbn": "9780441013593",
        "quantity": 2,
        "isAvailable": true
    })
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

struct Harness {
    _dir: TempDir,
    clock: Arc<ManualClock>,
    store: SessionStore,
    api: ApiClient,
}

fn harness(base_url: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path().to_path_buf());
    let clock = Arc::new(ManualClock::new(NOW));
    let session =
        SessionController::with_clock(store.clone(), clock.clone(), Duration::from_secs(60));
    session.start();
    let api = ApiClient::new(base_url, session).unwrap();
    Harness {
        _dir: dir,
        clock,
        store,
        api,
    }
}

/// Library API that issues `issued` on login and accepts only that token.
fn library(issued: String, hits: Arc<AtomicUsize>) -> Router {
    let login_token = issued.clone();
    let books_token = issued;
    let books_hits = hits.clone();

    Router::new()
        .route(
            "/api/auth/login",
            post(move |Json(body): Json<Value>| {
                let token = login_token.clone();
                async move {
                    if body["password"] == "secret" {
                        Json(json!({
                            "token": token,
                            "username": body["username"],
                            "roles": ["ROLE_USER", "ROLE_ADMIN"]
                        }))
                        .into_response()
                    } else {
                        (StatusCode::UNAUTHORIZED, "Bad credentials").into_response()
                    }
                }
            }),
        )
        .route(
            "/api/books/get_all_books",
            get(move |headers: HeaderMap| {
                let token = books_token.clone();
                let hits = books_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    if bearer(&headers).as_deref() == Some(token.as_str()) {
                        Json(json!([book_json(1), book_json(2)])).into_response()
                    } else {
                        StatusCode::UNAUTHORIZED.into_response()
                    }
                }
            }),
        )
        .route(
            "/api/books/delete_book/:id",
            delete(|Path(id): Path<i64>| async move { format!("Book {} deleted", id) }),
        )
        .route(
            "/api/issue_records/issue_book/:id",
            post(|Path(id): Path<i64>| async move {
                Json(json!({
                    "id": 900 + id,
                    "issueDate": "2024-03-01",
                    "dueDate": "2024-03-15",
                    "returnDate": null,
                    "isReturned": false,
                    "book": book_json(id)
                }))
            }),
        )
        .route(
            "/api/issue_records/return_book/:id",
            post(|Path(id): Path<i64>| async move {
                if id == 404 {
                    return (StatusCode::NOT_FOUND, "No such issue record").into_response();
                }
                Json(json!({
                    "id": id,
                    "issueDate": "2024-03-01",
                    "dueDate": "2024-03-15",
                    "returnDate": "2024-03-10",
                    "isReturned": true
                }))
                .into_response()
            }),
        )
        .route(
            "/api/books/add_book",
            post(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(book_json(3))
                }
            }),
        )
}

#[tokio::test]
async fn test_login_then_authenticated_request() {
    let hits = Arc::new(AtomicUsize::new(0));
    let issued = token(NOW + 3600, &["ROLE_USER", "ROLE_ADMIN"]);
    let url = serve(library(issued.clone(), hits.clone())).await;
    let h = harness(&url);

    let user = h.api.login("ada@example.com", "secret").await.unwrap();
    assert_eq!(user.display_name, "ada@example.com");
    assert!(user.is_admin());
    assert_eq!(h.api.session().phase(), SessionPhase::Authenticated);
    let (stored, _) = h.store.load().expect("session persisted");
    assert_eq!(stored.as_str(), issued);

    let books = h.api.list_books().await.unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bad_credentials_leave_session_anonymous() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = serve(library(token(NOW + 3600, &["ROLE_USER"]), hits)).await;
    let h = harness(&url);
    let mut notices = h.api.session().subscribe_forced_logout();

    let err = h.api.login("ada@example.com", "wrong").await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized));
    assert_eq!(err.user_message(), "Invalid username or password");
    assert_eq!(h.api.session().phase(), SessionPhase::Anonymous);
    assert!(h.store.load().is_none());
    assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_server_rejection_forces_logout() {
    let hits = Arc::new(AtomicUsize::new(0));
    // The server accepts a different token, as after a revocation
    let url = serve(library(token(NOW + 3600, &["ROLE_USER"]), hits.clone())).await;
    let dir = TempDir::new().unwrap();
    let store = SessionStore::new(dir.path().to_path_buf());
    let revoked = Credential::new(token(NOW + 7200, &["ROLE_USER"]));
    let user = SessionUser::new("ada@example.com", vec!["ROLE_USER".into()]);
    store.save(&revoked, &user).unwrap();

    let clock = Arc::new(ManualClock::new(NOW));
    let session = SessionController::with_clock(store.clone(), clock, Duration::from_secs(60));
    assert_eq!(session.start(), SessionPhase::Authenticated);
    let api = ApiClient::new(url, session).unwrap();
    let mut notices = api.session().subscribe_forced_logout();

    let err = api.list_books().await.unwrap_err();

    assert!(matches!(err, ApiError::SessionRejected));
    assert_eq!(api.session().phase(), SessionPhase::Anonymous);
    assert!(store.load().is_none());
    assert_eq!(notices.try_recv().unwrap().reason, SESSION_EXPIRED_REASON);
    assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_anonymous_rejection_is_not_a_session_error() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = serve(library(token(NOW + 3600, &["ROLE_USER"]), hits.clone())).await;
    let h = harness(&url);
    let mut notices = h.api.session().subscribe_forced_logout();

    let err = h.api.list_books().await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized));
    assert!(!err.is_session_error());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(h.api.session().phase(), SessionPhase::Anonymous);
    assert!(matches!(notices.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_expired_credential_is_never_sent() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = serve(library(token(NOW + 60, &["ROLE_USER"]), hits.clone())).await;
    let h = harness(&url);
    h.api.login("ada@example.com", "secret").await.unwrap();
    let mut notices = h.api.session().subscribe_forced_logout();

    h.clock.advance(120);
    let err = h.api.list_books().await.unwrap_err();

    assert!(matches!(err, ApiError::SessionExpired));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.api.session().phase(), SessionPhase::Anonymous);
    assert_eq!(notices.try_recv().unwrap().reason, SESSION_EXPIRED_REASON);
}

#[tokio::test]
async fn test_issue_and_return_book() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = serve(library(token(NOW + 3600, &["ROLE_USER"]), hits)).await;
    let h = harness(&url);
    h.api.login("ada@example.com", "secret").await.unwrap();

    let issued = h.api.issue_book(7).await.unwrap();
    assert_eq!(issued.id, 907);
    assert!(!issued.is_returned);
    assert_eq!(issued.book.map(|b| b.id), Some(7));

    let returned = h.api.return_book(issued.id).await.unwrap();
    assert!(returned.is_returned);
    assert_eq!(returned.return_date.as_deref(), Some("2024-03-10"));

    let missing = h.api.return_book(404).await.unwrap_err();
    assert!(matches!(missing, ApiError::NotFound(body) if body.contains("No such issue record")));
}

#[tokio::test]
async fn test_delete_returns_confirmation() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = serve(library(token(NOW + 3600, &["ROLE_ADMIN"]), hits)).await;
    let h = harness(&url);
    h.api.login("ada@example.com", "secret").await.unwrap();

    let message = h.api.delete_book(5).await.unwrap();
    assert_eq!(message, "Book 5 deleted");
}

#[tokio::test]
async fn test_invalid_book_is_not_sent() {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = serve(library(token(NOW + 3600, &["ROLE_ADMIN"]), hits.clone())).await;
    let h = harness(&url);
    h.api.login("ada@example.com", "secret").await.unwrap();

    let invalid = BookDto {
        title: String::new(),
        author: "Frank Herbert".into(),
        isbn: "9780441013593".into(),
        quantity: 1,
        is_available: true,
    };
    assert!(matches!(
        h.api.create_book(&invalid).await,
        Err(ApiError::Validation(_))
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let valid = BookDto {
        title: "Dune".into(),
        ..invalid
    };
    let created = h.api.create_book(&valid).await.unwrap();
    assert_eq!(created.id, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let h = harness(&format!("http://{}", addr));

    let err = h.api.list_books().await.unwrap_err();
    assert!(matches!(err, ApiError::NetworkError(_)));
    assert_eq!(h.api.session().phase(), SessionPhase::Anonymous);
}
