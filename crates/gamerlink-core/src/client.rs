//! Session-aware client for the gamerlink backend.
//!
//! Every protected accessor follows the same shape: no session means "not
//! logged in" without touching the network; otherwise the session is
//! verified first and the data call only runs when verification passes.
//! Read accessors never fail, they resolve to `None` and report through the
//! `error` event. Refresh accessors are user-triggered and return errors.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Gateway};
use crate::auth::{Session, SessionStore, UserRef};
use crate::config::{
    ClientConfig, DEFAULT_AUTO_VERIFY_INTERVAL, DEFAULT_NAMESPACE, DEFAULT_STORAGE_KEY,
};
use crate::error::{Error, Result};
use crate::events::{Event, EventKind, EventNotifier, Listener, Notification};
use crate::models::{Collection, CollectionSnapshot, Friend, Game};
use crate::scheduler::AutoVerify;

/// Result of a successful login. `success` is always true; failures are
/// returned as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub success: bool,
    pub user: UserRef,
    pub session_key: String,
}

/// Client owning one session, its listeners and its auto-verify timer.
///
/// Clones share all state. Instances built with different storage keys are
/// fully independent.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    gateway: Gateway,
    store: Mutex<SessionStore>,
    notifier: EventNotifier,
    auto_verify: AutoVerify,
}

impl SessionClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ===== Session state =====

    pub fn is_logged_in(&self) -> bool {
        self.inner.store.lock().is_logged_in()
    }

    /// The current session token
    pub fn session_key(&self) -> Option<String> {
        self.inner.store.lock().token().map(str::to_string)
    }

    pub fn current_user(&self) -> Option<UserRef> {
        self.inner.store.lock().user().cloned()
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.store.lock().session().cloned()
    }

    fn invalidate(&self) {
        self.inner.store.lock().clear();
    }

    // ===== Login / logout / verify =====

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(self.fail(Error::Auth("Email and password required".to_string())));
        }

        match self.inner.gateway.login(email, password).await {
            Ok(grant) => {
                let user = UserRef::new(
                    grant.username,
                    grant.email.or_else(|| Some(email.to_string())),
                );
                self.inner.store.lock().save(grant.token.clone(), user.clone());
                info!(username = %user.username, "Login successful");
                self.emit(Event::Login { user: user.clone() });
                Ok(LoginOutcome {
                    success: true,
                    user,
                    session_key: grant.token,
                })
            }
            Err(ApiError::Rejected(message)) => Err(self.fail(Error::Auth(message))),
            Err(e) => Err(self.fail(Error::Transport(e.to_string()))),
        }
    }

    /// Log out. Always succeeds locally, whatever the backend says.
    pub async fn logout(&self) {
        if let Some(token) = self.session_key() {
            if let Err(e) = self.inner.gateway.logout(&token).await {
                warn!(error = %e, "Backend logout failed");
            }
        }
        self.invalidate();
        info!("Logged out");
        self.emit(Event::Logout);
    }

    /// Check the session with the backend.
    ///
    /// A valid session gets its user enriched additively and re-persisted.
    /// Anything else, including transport failure, clears the session.
    pub async fn verify_session(&self) -> bool {
        let Some(token) = self.session_key() else {
            return false;
        };

        match self.inner.gateway.verify(&token).await {
            Ok(verified) if verified.valid => {
                self.inner.store.lock().merge_user(verified.username, verified.email);
                debug!("Session verified");
                true
            }
            Ok(_) => {
                info!("Session rejected by backend");
                self.invalidate();
                false
            }
            Err(e) => {
                warn!(error = %e, "Session verification failed");
                self.invalidate();
                if e.is_transport() {
                    self.emit(Event::Error {
                        message: format!("Session verification failed: {}", e),
                    });
                }
                false
            }
        }
    }

    /// Run `op` only when a session exists and the backend still accepts it.
    /// `None` means "not logged in".
    async fn with_verified_session<T, F, Fut>(&self, op: F) -> Option<T>
    where
        F: FnOnce(Gateway, String) -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.is_logged_in() || !self.verify_session().await {
            return None;
        }
        // A concurrent clear may have run while verify was in flight
        let token = self.session_key()?;
        Some(op(self.inner.gateway.clone(), token).await)
    }

    // ===== User =====

    /// Fetch the full user record and overwrite the stored user with it
    pub async fn get_user(&self) -> Option<UserRef> {
        let result = self
            .with_verified_session(|gateway, token| async move { gateway.fetch_user(&token).await })
            .await?;

        match result {
            Ok(payload) => {
                let user = UserRef::new(payload.username, payload.email);
                self.inner.store.lock().replace_user(user.clone());
                Some(user)
            }
            Err(e) if e.is_transport() => {
                warn!(error = %e, "Failed to fetch user");
                self.emit(Event::Error {
                    message: format!("Failed to fetch user: {}", e),
                });
                None
            }
            Err(e) => {
                warn!(error = %e, "User fetch rejected, clearing session");
                self.invalidate();
                None
            }
        }
    }

    // ===== Collections =====

    pub async fn get_friends(&self) -> Option<CollectionSnapshot<Friend>> {
        self.get_collection(Collection::Friends).await
    }

    pub async fn get_games(&self) -> Option<CollectionSnapshot<Game>> {
        self.get_collection(Collection::Games).await
    }

    pub async fn get_profile(&self) -> Option<CollectionSnapshot<Value>> {
        self.get_collection(Collection::Profile).await
    }

    pub async fn refresh_friends(&self) -> Result<Option<CollectionSnapshot<Friend>>> {
        self.refresh_collection(Collection::Friends).await
    }

    pub async fn refresh_games(&self) -> Result<Option<CollectionSnapshot<Game>>> {
        self.refresh_collection(Collection::Games).await
    }

    pub async fn refresh_profile(&self) -> Result<Option<CollectionSnapshot<Value>>> {
        self.refresh_collection(Collection::Profile).await
    }

    /// Read the backend's cached snapshot of a collection.
    ///
    /// Only HTTP 401 invalidates the session; other failures leave it intact.
    pub async fn get_collection<T: DeserializeOwned>(
        &self,
        kind: Collection,
    ) -> Option<CollectionSnapshot<T>> {
        if !kind.is_available() {
            let message = kind.unavailable_message();
            warn!(collection = %kind, "{}", message);
            self.emit(Event::Error { message });
            return None;
        }

        let result = self
            .with_verified_session(|gateway, token| async move {
                gateway.fetch_collection(kind, &token).await
            })
            .await?;

        let message = match result {
            Ok(body) => match CollectionSnapshot::from_response(kind, &body) {
                Ok(snapshot) => {
                    debug!(collection = %kind, items = snapshot.items.len(), "Collection loaded");
                    return Some(snapshot);
                }
                Err(e) => format!("Failed to read {}: {}", kind, e),
            },
            Err(e) if e.is_unauthorized() => {
                info!(collection = %kind, "Session rejected, clearing");
                self.invalidate();
                e.server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| "Session is no longer valid".to_string())
            }
            Err(e) => e
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Failed to load {}: {}", kind, e)),
        };

        warn!(collection = %kind, error = %message, "Collection unavailable");
        self.emit(Event::Error { message });
        None
    }

    /// Ask the backend to rebuild a collection and return the new snapshot.
    ///
    /// `Ok(None)` means not logged in. A 401 clears the session before the
    /// error is returned.
    pub async fn refresh_collection<T: DeserializeOwned>(
        &self,
        kind: Collection,
    ) -> Result<Option<CollectionSnapshot<T>>> {
        if !kind.is_available() {
            return Err(self.fail(Error::Unavailable(kind.unavailable_message())));
        }

        let Some(result) = self
            .with_verified_session(|gateway, token| async move {
                gateway.refresh_collection(kind, &token).await
            })
            .await
        else {
            return Ok(None);
        };

        let failure = match result {
            Ok(body) => match CollectionSnapshot::from_response(kind, &body) {
                Ok(snapshot) => {
                    info!(collection = %kind, count = snapshot.count, "Collection refreshed");
                    return Ok(Some(snapshot));
                }
                Err(e) => Error::Transport(format!("{}: {}", kind.refresh_failed_message(), e)),
            },
            Err(e) if e.is_transport() => {
                Error::Transport(format!("{}: {}", kind.refresh_failed_message(), e))
            }
            Err(e) => {
                let message = e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| kind.refresh_failed_message());
                if e.is_unauthorized() {
                    self.invalidate();
                    Error::InvalidSession(message)
                } else {
                    Error::Unavailable(message)
                }
            }
        };

        Err(self.fail(failure))
    }

    // ===== Events =====

    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.inner.notifier.on(kind, listener);
    }

    pub fn off(&self, kind: EventKind, listener: &Listener) {
        self.inner.notifier.off(kind, listener);
    }

    /// Receive `<namespace>:<kind>` notifications for this client
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    /// Name carried by notifications of `kind`, e.g. `gamerlink:logout`
    pub fn notification_name(&self, kind: EventKind) -> String {
        format!("{}:{}", self.inner.notifier.namespace(), kind)
    }

    pub(crate) fn emit(&self, event: Event) {
        self.inner.notifier.emit(event);
    }

    /// Log and announce an error, then hand it back for returning
    fn fail(&self, error: Error) -> Error {
        warn!(error = %error, "Operation failed");
        self.emit(Event::Error {
            message: error.message().to_string(),
        });
        error
    }

    // ===== Auto-verify =====

    /// Re-verify the session periodically, emitting `logout` when the
    /// backend stops accepting it. Replaces any running timer.
    ///
    /// The timer keeps this client alive until [`stop_auto_verify`] is
    /// called. Must be called from within a Tokio runtime.
    ///
    /// [`stop_auto_verify`]: SessionClient::stop_auto_verify
    pub fn start_auto_verify(&self, interval: Option<Duration>) {
        let mut period = interval.unwrap_or(self.inner.config.auto_verify_interval);
        if period.is_zero() {
            warn!("Zero auto-verify interval, using default");
            period = DEFAULT_AUTO_VERIFY_INTERVAL;
        }
        info!(interval_ms = period.as_millis() as u64, "Starting auto-verify");
        self.inner.auto_verify.start(self.clone(), period);
    }

    /// Stop the auto-verify timer. Safe to call when it is not running.
    pub fn stop_auto_verify(&self) {
        if self.inner.auto_verify.stop() {
            info!("Stopped auto-verify");
        }
    }

    pub fn is_auto_verifying(&self) -> bool {
        self.inner.auto_verify.is_running()
    }
}

/// Builder for a [`SessionClient`]
#[derive(Debug, Default)]
pub struct ClientBuilder {
    api_root: Option<String>,
    storage_dir: Option<PathBuf>,
    storage_key: Option<String>,
    namespace: Option<String>,
    request_timeout: Option<Duration>,
    user_agent: Option<String>,
    auto_verify_interval: Option<Duration>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_root(mut self, url: impl Into<String>) -> Self {
        self.api_root = Some(url.into());
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn auto_verify_interval(mut self, interval: Duration) -> Self {
        self.auto_verify_interval = Some(interval);
        self
    }

    /// Build the client and load any persisted session
    pub fn build(self) -> Result<SessionClient> {
        let api_root = self
            .api_root
            .ok_or_else(|| Error::Config("api_root is required".to_string()))?;
        let api_root = ClientConfig::normalize_api_root(&api_root)?;

        let storage_key = self
            .storage_key
            .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string());
        ClientConfig::validate_storage_key(&storage_key)?;

        let config = ClientConfig {
            api_root,
            storage_dir: self
                .storage_dir
                .unwrap_or_else(ClientConfig::default_storage_dir),
            storage_key,
            namespace: self
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            request_timeout: self.request_timeout,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| format!("gamerlink/{}", env!("CARGO_PKG_VERSION"))),
            auto_verify_interval: self
                .auto_verify_interval
                .filter(|i| !i.is_zero())
                .unwrap_or(DEFAULT_AUTO_VERIFY_INTERVAL),
        };

        let gateway = Gateway::new(
            config.api_root.clone(),
            config.request_timeout,
            &config.user_agent,
        )
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        let store = SessionStore::open(&config.storage_dir, &config.storage_key);
        debug!(
            api_root = %gateway.base_url(),
            storage = %store.path().display(),
            restored = store.is_logged_in(),
            "Session client ready"
        );

        Ok(SessionClient {
            inner: Arc::new(ClientInner {
                notifier: EventNotifier::new(config.namespace.clone()),
                config,
                gateway,
                store: Mutex::new(store),
                auto_verify: AutoVerify::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder_requires_api_root() {
        let result = SessionClient::builder().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_defaults() {
        let dir = TempDir::new().unwrap();
        let client = SessionClient::builder()
            .api_root("http://localhost:3000")
            .storage_dir(dir.path())
            .auto_verify_interval(Duration::ZERO)
            .build()
            .unwrap();

        let config = client.config();
        assert_eq!(config.api_root, "http://localhost:3000/");
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.auto_verify_interval, DEFAULT_AUTO_VERIFY_INTERVAL);
        assert!(config.user_agent.starts_with("gamerlink/"));
        assert!(!client.is_logged_in());
    }

    #[test]
    fn test_builder_rejects_bad_storage_key() {
        let dir = TempDir::new().unwrap();
        let result = SessionClient::builder()
            .api_root("http://localhost:3000")
            .storage_dir(dir.path())
            .storage_key("../outside")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_restores_persisted_session() {
        let dir = TempDir::new().unwrap();
        SessionStore::new(dir.path(), "restore").save("T9", UserRef::new("Jackie", None));

        let client = SessionClient::builder()
            .api_root("http://localhost:3000")
            .storage_dir(dir.path())
            .storage_key("restore")
            .build()
            .unwrap();

        assert!(client.is_logged_in());
        assert_eq!(client.session_key().as_deref(), Some("T9"));
        assert_eq!(client.current_user(), Some(UserRef::new("Jackie", None)));
    }

    #[test]
    fn test_notification_name_uses_namespace() {
        let dir = TempDir::new().unwrap();
        let client = SessionClient::builder()
            .api_root("http://localhost:3000")
            .storage_dir(dir.path())
            .namespace("xbox")
            .build()
            .unwrap();
        assert_eq!(client.notification_name(EventKind::Logout), "xbox:logout");
        assert_eq!(client.notification_name(EventKind::Error), "xbox:error");
    }

    #[test]
    fn test_login_outcome_serializes_camel_case() {
        let outcome = LoginOutcome {
            success: true,
            user: UserRef::new("Jackie", Some("a@b.com".to_string())),
            session_key: "T1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "success": true,
                "user": {"username": "Jackie", "email": "a@b.com"},
                "sessionKey": "T1"
            })
        );
    }
}
