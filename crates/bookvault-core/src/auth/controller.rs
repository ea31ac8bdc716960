//! Session lifecycle controller.
//!
//! The controller is the only writer of the session state. It moves between
//! three phases:
//!
//! ```text
//! Uninitialized --start()--> Anonymous | Authenticated
//! Anonymous --login()--> Authenticated
//! Authenticated --logout() / expiry / rejection--> Anonymous
//! ```
//!
//! While authenticated, a background task re-checks the credential on a
//! fixed interval. Expiry found by that task, or by the HTTP layer before or
//! after a request, ends the session and publishes a `ForcedLogout` notice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::guard::Route;
use super::session::{SessionPhase, SessionState, SessionUser};
use super::store::SessionStore;
use super::token::Credential;
use crate::api::ApiError;
use crate::models::{LoginRequest, LoginResponse};

/// Default interval between background expiry checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest accepted check interval.
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Longest accepted check interval (one day). Keeps the first deadline
/// representable as an `Instant`.
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Reason attached to forced logouts caused by an expired credential.
pub const SESSION_EXPIRED_REASON: &str = "Your session has expired. Please log in again.";

/// Pending forced-logout notices kept for slow subscribers.
const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// Remote login collaborator.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError>;
}

/// System-initiated logout, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedLogout {
    pub reason: String,
    /// Where the shell should navigate. Always the anonymous entry point.
    pub redirect: Route,
}

/// Outcome of preparing an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// No session; send without credentials.
    Anonymous,
    Bearer(Credential),
    /// The credential lapsed; the session has been ended and the request
    /// must not be sent.
    Expired,
}

#[derive(Default)]
struct Current {
    credential: Option<Credential>,
    watcher: Option<JoinHandle<()>>,
}

struct Inner {
    store: SessionStore,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
    current: Mutex<Current>,
    state: watch::Sender<SessionState>,
    notices: broadcast::Sender<ForcedLogout>,
}

/// Handle to the process-wide session. Clone is cheap and every clone
/// shares the same state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(store: SessionStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), DEFAULT_CHECK_INTERVAL)
    }

    pub fn with_clock(store: SessionStore, clock: Arc<dyn Clock>, check_interval: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::uninitialized());
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                check_interval: check_interval.clamp(MIN_CHECK_INTERVAL, MAX_CHECK_INTERVAL),
                current: Mutex::new(Current::default()),
                state,
                notices,
            }),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Resolve the persisted session. Runs once; later calls only report
    /// the current phase.
    ///
    /// The expiry watcher is spawned on the ambient Tokio runtime.
    pub fn start(&self) -> SessionPhase {
        let mut current = self.lock();
        if !self.inner.state.borrow().loading {
            debug!("Session already started");
            return self.phase();
        }

        let now = self.inner.clock.now();
        let next = match self.inner.store.load() {
            Some((credential, user)) if !credential.is_expired_at(now) => {
                info!(user = %user.display_name, "Valid session found");
                current.credential = Some(credential);
                current.watcher = self.spawn_watcher();
                SessionState::authenticated(user)
            }
            Some((_, user)) => {
                info!(user = %user.display_name, "Stored session expired");
                self.clear_store();
                SessionState::anonymous()
            }
            None => {
                debug!("No stored session");
                self.clear_store();
                SessionState::anonymous()
            }
        };

        self.inner.state.send_replace(next);
        drop(current);
        self.phase()
    }

    /// Authenticate through `authenticator` and, on success, persist and
    /// enter the authenticated phase. On failure nothing changes.
    pub async fn login<A>(
        &self,
        authenticator: &A,
        identifier: &str,
        secret: &str,
    ) -> Result<SessionUser, ApiError>
    where
        A: Authenticator + ?Sized,
    {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Err(ApiError::Validation("Username and password required".to_string()));
        }

        let request = LoginRequest {
            username: identifier.to_string(),
            password: secret.to_string(),
        };
        let response = authenticator.authenticate(&request).await.map_err(|e| {
            warn!(error = %e, "Login failed");
            e
        })?;

        let credential = Credential::new(response.token);
        if credential.is_expired_at(self.inner.clock.now()) {
            warn!("Login returned an expired or unreadable credential");
            return Err(ApiError::InvalidResponse(
                "server issued an expired or unreadable credential".to_string(),
            ));
        }
        let user = SessionUser::new(response.username, response.roles);

        {
            let mut current = self.lock();
            if let Err(e) = self.inner.store.save(&credential, &user) {
                warn!(error = %e, "Failed to save session");
            }
            if let Some(watcher) = current.watcher.take() {
                watcher.abort();
            }
            current.credential = Some(credential);
            current.watcher = self.spawn_watcher();
            self.inner.state.send_replace(SessionState::authenticated(user.clone()));
        }

        info!(user = %user.display_name, role = %user.role(), "Login successful");
        Ok(user)
    }

    /// End the session. Always succeeds and is safe to repeat.
    pub fn logout(&self) {
        let mut current = self.lock();
        let was_authenticated = current.credential.is_some();
        self.reset(&mut current, None);
        drop(current);

        if was_authenticated {
            info!("Logged out");
        }
    }

    /// End the session and publish a notice carrying `reason`.
    ///
    /// Only an active session produces a notice, so several detectors firing
    /// for the same expiry publish exactly one. The notice is queued before
    /// the anonymous state is published. Returns whether this call ended the
    /// session.
    pub fn force_logout(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if !self.end_active_session(|_| true, &reason) {
            debug!(%reason, "Forced logout ignored, no active session");
            return false;
        }
        true
    }

    /// Re-check the held credential against the clock, ending the session
    /// if it lapsed. Returns true when no session remains.
    pub fn check_expiry(&self) -> bool {
        let now = self.inner.clock.now();
        if self.end_active_session(|credential| credential.is_expired_at(now), SESSION_EXPIRED_REASON) {
            return true;
        }
        !self.is_authenticated()
    }

    /// Prepare an outgoing request. An expired credential ends the session
    /// here, before anything is transmitted.
    pub fn authorize(&self) -> Authorization {
        let now = self.inner.clock.now();
        let credential = self.lock().credential.clone();
        match credential {
            None => Authorization::Anonymous,
            Some(credential) if credential.is_expired_at(now) => {
                warn!("Credential expired before request");
                self.force_logout(SESSION_EXPIRED_REASON);
                Authorization::Expired
            }
            Some(credential) => Authorization::Bearer(credential),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.borrow().phase()
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == SessionPhase::Authenticated
    }

    pub fn is_admin(&self) -> bool {
        self.inner.state.borrow().is_admin()
    }

    /// The held credential, if it has not expired.
    pub fn credential(&self) -> Option<Credential> {
        let now = self.inner.clock.now();
        self.lock()
            .credential
            .clone()
            .filter(|credential| !credential.is_expired_at(now))
    }

    pub fn now(&self) -> i64 {
        self.inner.clock.now()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe_forced_logout(&self) -> broadcast::Receiver<ForcedLogout> {
        self.inner.notices.subscribe()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Current> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// End the session with a notice if one is held and `should_end` agrees.
    fn end_active_session(&self, should_end: impl FnOnce(&Credential) -> bool, reason: &str) -> bool {
        let mut current = self.lock();
        let ending = current.credential.as_ref().is_some_and(should_end);
        if ending {
            self.reset(&mut current, Some(reason));
        }
        ending
    }

    fn reset(&self, current: &mut Current, notice: Option<&str>) {
        if let Some(watcher) = current.watcher.take() {
            watcher.abort();
        }
        current.credential = None;
        self.clear_store();
        if let Some(reason) = notice {
            self.notify(reason.to_string());
        }
        self.inner.state.send_if_modified(|state| {
            let anonymous = SessionState::anonymous();
            if *state == anonymous {
                false
            } else {
                *state = anonymous;
                true
            }
        });
    }

    fn notify(&self, reason: String) {
        warn!(%reason, "Forced logout");
        let notice = ForcedLogout {
            reason,
            redirect: Route::Login,
        };
        if self.inner.notices.send(notice).is_err() {
            debug!("No forced-logout subscribers");
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    fn spawn_watcher(&self) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "No async runtime, session expiry will not be checked in the background");
                return None;
            }
        };

        let session: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.check_interval;
        Some(runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = session.upgrade() else {
                    break;
                };
                if (SessionController { inner }).check_expiry() {
                    break;
                }
            }
            debug!("Session watcher stopped");
        }))
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &*self.inner.state.borrow())
            .field("check_interval", &self.inner.check_interval)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
