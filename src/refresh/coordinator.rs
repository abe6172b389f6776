use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::errors::Error;
use crate::telemetry::refresh::{self, RefreshOutcome, RefreshTelemetry};
use crate::token::{Token, TokenStore};

use super::LoopDetector;
use super::loop_detector::{DEFAULT_THRESHOLD, DEFAULT_WINDOW};

const SLOT_KEY: &str = "reauth";

/// Exchanges a refresh token for a new token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: String) -> Result<Token, Error>;
}

/// Re-establishes credentials out of band and stores the new token itself.
#[async_trait]
pub trait Relogin: Send + Sync {
    async fn relogin(&self) -> Result<(), Error>;
}

#[async_trait]
impl<F, Fut> TokenRefresher for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Token, Error>> + Send + 'static,
{
    async fn refresh(&self, refresh_token: String) -> Result<Token, Error> {
        (self)(refresh_token).await
    }
}

#[async_trait]
impl<F, Fut> Relogin for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    async fn relogin(&self) -> Result<(), Error> {
        (self)().await
    }
}

type SharedOutcome = Shared<BoxFuture<'static, Result<(), Arc<Error>>>>;

struct Inner {
    store: Arc<TokenStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    relogin: Option<Arc<dyn Relogin>>,
    auth_failure_statuses: Vec<u16>,
    slots: Mutex<HashMap<&'static str, SharedOutcome>>,
    detector: Mutex<LoopDetector>,
}

/// Runs at most one refresh or re-login at a time for any number of callers
/// that failed with the same stale token.
///
/// The refresh body runs on its own task, so a caller that is cancelled while
/// waiting only detaches; the refresh finishes for everyone else.
#[derive(Clone)]
pub struct TokenRefreshCoordinator {
    inner: Arc<Inner>,
}

pub struct CoordinatorBuilder {
    store: Arc<TokenStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    relogin: Option<Arc<dyn Relogin>>,
    auth_failure_statuses: Vec<u16>,
    loop_threshold: u32,
    loop_window: Duration,
}

impl CoordinatorBuilder {
    pub fn refresher(mut self, refresher: impl TokenRefresher + 'static) -> Self {
        self.refresher = Some(Arc::new(refresher));
        self
    }

    pub fn relogin(mut self, relogin: impl Relogin + 'static) -> Self {
        self.relogin = Some(Arc::new(relogin));
        self
    }

    pub(crate) fn shared_refresher(mut self, refresher: Option<Arc<dyn TokenRefresher>>) -> Self {
        self.refresher = refresher;
        self
    }

    pub(crate) fn shared_relogin(mut self, relogin: Option<Arc<dyn Relogin>>) -> Self {
        self.relogin = relogin;
        self
    }

    pub fn auth_failure_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.auth_failure_statuses = statuses.into();
        self
    }

    pub fn loop_limits(mut self, threshold: u32, window: Duration) -> Self {
        self.loop_threshold = threshold;
        self.loop_window = window;
        self
    }

    pub fn build(self) -> TokenRefreshCoordinator {
        TokenRefreshCoordinator {
            inner: Arc::new(Inner {
                store: self.store,
                refresher: self.refresher,
                relogin: self.relogin,
                auth_failure_statuses: self.auth_failure_statuses,
                slots: Mutex::new(HashMap::new()),
                detector: Mutex::new(LoopDetector::new(self.loop_threshold, self.loop_window)),
            }),
        }
    }
}

impl TokenRefreshCoordinator {
    pub fn builder(store: Arc<TokenStore>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            store,
            refresher: None,
            relogin: None,
            auth_failure_statuses: vec![401, 403],
            loop_threshold: DEFAULT_THRESHOLD,
            loop_window: DEFAULT_WINDOW,
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    pub fn auth_failure_statuses(&self) -> &[u16] {
        &self.inner.auth_failure_statuses
    }

    pub fn is_auth_failure(&self, error: &Error) -> bool {
        error.is_auth_failure(&self.inner.auth_failure_statuses)
    }

    /// Re-authenticates after `error`, which was caused by a request sent with
    /// `token_at_send`. Returns once the caller may retry.
    ///
    /// Non-auth errors are handed back unchanged. If the stored token already
    /// differs from `token_at_send` another caller refreshed it and this is a
    /// no-op. If a refresh is in flight the caller awaits its outcome.
    pub async fn reauth(&self, error: Error, token_at_send: Option<&str>) -> Result<(), Error> {
        if !self.is_auth_failure(&error) {
            return Err(error);
        }
        let context = format!("status {}", error.auth_status().unwrap_or_default());
        let pending = {
            let mut slots = self.inner.slots.lock().await;
            let current = self.inner.store.current_auth().await?;
            if current.as_deref() != token_at_send {
                refresh::emit_skipped(&context);
                return Ok(());
            }
            match slots.get(SLOT_KEY) {
                Some(in_flight) => {
                    refresh::emit_waiting(&context);
                    in_flight.clone()
                }
                None => {
                    let outcome = self.spawn_refresh(error, context);
                    slots.insert(SLOT_KEY, outcome.clone());
                    outcome
                }
            }
        };
        pending.await.map_err(Error::from_shared)
    }

    fn spawn_refresh(&self, error: Error, context: String) -> SharedOutcome {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let result = inner.run(error, context).await.map_err(Arc::new);
            inner.slots.lock().await.remove(SLOT_KEY);
            result
        });
        async move {
            match handle.await {
                Ok(result) => result,
                Err(_) => Err(Arc::new(Error::Cancelled)),
            }
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    async fn run(&self, error: Error, context: String) -> Result<(), Error> {
        let telemetry = RefreshTelemetry::new(context);
        telemetry.emit_start(error.auth_status());
        let result = self.refresh_or_relogin(error, &telemetry).await;
        match &result {
            Ok(outcome) => telemetry.emit_success(*outcome),
            Err(err) => telemetry.emit_failure(err),
        }
        result.map(|_| ())
    }

    async fn refresh_or_relogin(
        &self,
        error: Error,
        telemetry: &RefreshTelemetry,
    ) -> Result<RefreshOutcome, Error> {
        let refresh_token = self
            .store
            .get()
            .await?
            .and_then(|token| token.refresh().map(str::to_string));
        let (Some(refresher), Some(refresh_token)) = (&self.refresher, refresh_token) else {
            return self.relogin(error, telemetry, "no refresh token").await;
        };

        {
            let mut detector = self.detector.lock().await;
            if let Err(err) = detector.record(Instant::now()) {
                telemetry
                    .emit_loop_detected(detector.threshold(), detector.window().as_millis() as u64);
                return Err(err);
            }
        }

        match refresher.refresh(refresh_token).await {
            Ok(token) => {
                self.store.set(Some(&token)).await?;
                Ok(RefreshOutcome::Refreshed)
            }
            Err(refresh_err) => {
                warn!(
                    attempt_id = %telemetry.attempt_id(),
                    error = %refresh_err,
                    "refresh.token_rejected"
                );
                self.relogin(refresh_err, telemetry, "refresh failed").await
            }
        }
    }

    /// Falls back to a full re-login; without one, `cause` is the outcome.
    async fn relogin(
        &self,
        cause: Error,
        telemetry: &RefreshTelemetry,
        reason: &str,
    ) -> Result<RefreshOutcome, Error> {
        let Some(relogin) = &self.relogin else {
            return Err(cause);
        };
        telemetry.emit_relogin(reason);
        relogin.relogin().await?;
        Ok(RefreshOutcome::Relogin)
    }
}
