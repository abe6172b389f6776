use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::errors::Error;
use crate::progress::{ProgressRegistry, ProgressSender};
use crate::refresh::{Relogin, TokenRefreshCoordinator, TokenRefresher};
use crate::request::{self, Authentication, RequestDescriptor};
use crate::token::{CredentialStore, MemoryCredentialStore, TokenStore};
use crate::transport::{self, HttpTransport, RedirectHook};

use super::hooks::{PreSendHook, ResponseValidator};
use super::outcome::DispatchOutcome;
use super::response::{Document, Listing, Response};
use super::transfer::Transfer;

/// Where a response body ends up.
#[derive(Clone, Copy)]
enum Sink<'a> {
    Memory,
    File(&'a Path),
}

struct Inner {
    base_url: Url,
    auth_scheme: String,
    transport: HttpTransport,
    coordinator: TokenRefreshCoordinator,
    validator: Option<Arc<dyn ResponseValidator>>,
    pre_send: Option<Arc<dyn PreSendHook>>,
    progress: Arc<ProgressRegistry>,
}

/// Sends [`RequestDescriptor`]s and retries once after re-authenticating
/// when a stored-token request fails with an auth-failure status.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

pub struct DispatcherBuilder {
    config: ClientConfig,
    token_store: Option<Arc<TokenStore>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    relogin: Option<Arc<dyn Relogin>>,
    coordinator: Option<TokenRefreshCoordinator>,
    validator: Option<Arc<dyn ResponseValidator>>,
    pre_send: Option<Arc<dyn PreSendHook>>,
    redirect_hook: Option<RedirectHook>,
    http_client: Option<reqwest::Client>,
}

impl DispatcherBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            token_store: None,
            credential_store: None,
            refresher: None,
            relogin: None,
            coordinator: None,
            validator: None,
            pre_send: None,
            redirect_hook: None,
            http_client: None,
        }
    }

    pub fn token_store(mut self, store: Arc<TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Backend for a token store keyed by `config.credential_service`.
    /// Ignored when [`token_store`](Self::token_store) is set.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    pub fn refresher(mut self, refresher: impl TokenRefresher + 'static) -> Self {
        self.refresher = Some(Arc::new(refresher));
        self
    }

    pub fn relogin(mut self, relogin: impl Relogin + 'static) -> Self {
        self.relogin = Some(Arc::new(relogin));
        self
    }

    /// Shares an existing coordinator, e.g. between dispatchers talking to
    /// different hosts with one credential. Overrides the store, refresher and
    /// relogin settings above.
    pub fn coordinator(mut self, coordinator: TokenRefreshCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn validator(mut self, validator: impl ResponseValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn pre_send(mut self, hook: impl PreSendHook + 'static) -> Self {
        self.pre_send = Some(Arc::new(hook));
        self
    }

    pub fn redirect_hook(mut self, hook: RedirectHook) -> Self {
        self.redirect_hook = Some(hook);
        self
    }

    /// Uses a preconfigured client; redirect, timeout and user agent settings
    /// from the config are then the client's business.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<Dispatcher, Error> {
        let config = self.config;
        let base_url = config.base_url()?;
        let transport = match self.http_client {
            Some(client) => {
                if self.redirect_hook.is_some() {
                    warn!("redirect hook ignored for a caller-supplied http client");
                }
                HttpTransport::new(client)
            }
            None => HttpTransport::from_config(&config, self.redirect_hook)?,
        };
        let coordinator = match self.coordinator {
            Some(coordinator) => coordinator,
            None => {
                let store = match (self.token_store, self.credential_store) {
                    (Some(store), _) => store,
                    (None, Some(backend)) => {
                        Arc::new(TokenStore::new(backend, config.credential_service.clone()))
                    }
                    (None, None) => Arc::new(TokenStore::new(
                        Arc::new(MemoryCredentialStore::new()),
                        config.credential_service.clone(),
                    )),
                };
                TokenRefreshCoordinator::builder(store)
                    .shared_refresher(self.refresher)
                    .shared_relogin(self.relogin)
                    .auth_failure_statuses(config.auth_failure_statuses.clone())
                    .loop_limits(config.refresh_loop_threshold, config.refresh_loop_window())
                    .build()
            }
        };
        Ok(Dispatcher {
            inner: Arc::new(Inner {
                base_url,
                auth_scheme: config.auth_scheme,
                transport,
                coordinator,
                validator: self.validator,
                pre_send: self.pre_send,
                progress: Arc::new(ProgressRegistry::new()),
            }),
        })
    }
}

impl Dispatcher {
    pub fn builder(config: ClientConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn coordinator(&self) -> &TokenRefreshCoordinator {
        &self.inner.coordinator
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        self.inner.coordinator.store()
    }

    pub fn progress_registry(&self) -> &Arc<ProgressRegistry> {
        &self.inner.progress
    }

    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<Response, Error> {
        self.dispatch(descriptor, Sink::Memory, None).await
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<T, Error> {
        self.send(descriptor).await?.json()
    }

    pub async fn send_document(&self, descriptor: &RequestDescriptor) -> Result<Document, Error> {
        self.send(descriptor).await?.document()
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Listing<T>, Error> {
        self.send_json(descriptor).await
    }

    /// Follows `next` links until a page has none, collecting every item.
    /// A link back to any page already fetched is an error.
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Vec<T>, Error> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut current = descriptor.clone();
        loop {
            visited.insert(current.endpoint().to_string());
            let page: Listing<T> = self.list(&current).await?;
            let next = page.next_descriptor(&current);
            items.extend(page.items);
            match next {
                Some(next) if visited.contains(next.endpoint()) => {
                    return Err(Error::Decode(format!(
                        "listing links back to an earlier page: {}",
                        next.endpoint()
                    )));
                }
                Some(next) => current = next,
                None => return Ok(items),
            }
        }
    }

    /// Streams a successful response body into `path`. Error responses are
    /// buffered instead so they can be validated and reported.
    pub async fn download(
        &self,
        descriptor: &RequestDescriptor,
        path: impl AsRef<Path>,
    ) -> Result<PathBuf, Error> {
        let path = path.as_ref();
        self.dispatch(descriptor, Sink::File(path), None).await?;
        Ok(path.to_path_buf())
    }

    /// Runs [`send`](Self::send) on its own task with progress reporting.
    pub fn spawn_send(&self, descriptor: RequestDescriptor) -> Transfer<Response> {
        let (registration, progress) = self.inner.progress.register();
        let id = registration.id();
        let dispatcher = self.clone();
        let handle = tokio::spawn(async move {
            dispatcher
                .dispatch(&descriptor, Sink::Memory, Some(registration.sender()))
                .await
        });
        Transfer::new(id, progress, handle)
    }

    /// Runs [`download`](Self::download) on its own task with progress reporting.
    pub fn spawn_download(
        &self,
        descriptor: RequestDescriptor,
        path: impl Into<PathBuf>,
    ) -> Transfer<PathBuf> {
        let path = path.into();
        let (registration, progress) = self.inner.progress.register();
        let id = registration.id();
        let dispatcher = self.clone();
        let handle = tokio::spawn(async move {
            dispatcher
                .dispatch(&descriptor, Sink::File(&path), Some(registration.sender()))
                .await?;
            Ok(path)
        });
        Transfer::new(id, progress, handle)
    }

    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        sink: Sink<'_>,
        progress: Option<&ProgressSender>,
    ) -> Result<Response, Error> {
        let start = Instant::now();
        let mut attempts = 1u8;
        let (token_at_send, first) = self.attempt(descriptor, sink, progress).await;
        let result = match first {
            Err(err) if self.retries_on(descriptor, &err) => {
                warn!(
                    endpoint = descriptor.endpoint(),
                    status = err.auth_status().unwrap_or_default(),
                    error = %err,
                    "dispatch.auth_failure"
                );
                match self
                    .inner
                    .coordinator
                    .reauth(err, token_at_send.as_deref())
                    .await
                {
                    Ok(()) => {
                        attempts += 1;
                        info!(endpoint = descriptor.endpoint(), "dispatch.retry");
                        self.attempt(descriptor, sink, progress).await.1
                    }
                    Err(err) => Err(err),
                }
            }
            other => other,
        };

        DispatchOutcome {
            method: descriptor.method(),
            endpoint: descriptor.endpoint().to_string(),
            attempts,
            success: result.is_ok(),
            status: match &result {
                Ok(response) => Some(response.status().as_u16()),
                Err(err) => err.auth_status(),
            },
            elapsed: start.elapsed(),
        }
        .log();
        result
    }

    fn retries_on(&self, descriptor: &RequestDescriptor, err: &Error) -> bool {
        matches!(descriptor.authentication(), Authentication::StoredToken)
            && self.inner.coordinator.is_auth_failure(err)
    }

    /// One send. Returns the stored token the request went out with, so the
    /// coordinator can tell whether someone refreshed it in the meantime.
    async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
        sink: Sink<'_>,
        progress: Option<&ProgressSender>,
    ) -> (Option<String>, Result<Response, Error>) {
        let stored = match descriptor.authentication() {
            Authentication::StoredToken => match self.inner.coordinator.store().current_auth().await {
                Ok(token) => token,
                Err(err) => return (None, Err(err)),
            },
            Authentication::Skip | Authentication::Custom(_) => None,
        };
        let result = self
            .exchange(descriptor, stored.as_deref(), sink, progress)
            .await;
        (stored, result)
    }

    async fn exchange(
        &self,
        descriptor: &RequestDescriptor,
        stored: Option<&str>,
        sink: Sink<'_>,
        progress: Option<&ProgressSender>,
    ) -> Result<Response, Error> {
        let mut wire = request::build(descriptor, &self.inner.base_url).await?;
        match descriptor.authentication() {
            Authentication::StoredToken => {
                if let Some(token) = stored {
                    wire.authorize(&self.inner.auth_scheme, token)?;
                }
            }
            Authentication::Custom(token) => wire.authorize(&self.inner.auth_scheme, token)?,
            Authentication::Skip => {}
        }
        if let Some(hook) = &self.inner.pre_send {
            hook.before_send(&mut wire);
        }
        debug!(request = %wire.description, "dispatch.send");

        let response = self.inner.transport.send(wire, progress).await?;
        let status = response.status();
        let headers = response.headers().clone();

        if let Sink::File(path) = sink
            && status.is_success()
        {
            let staged = transport::download_to(response, path, progress).await?;
            self.validate(status, &headers, None)?;
            let written = staged.commit(path).await?;
            debug!(path = %path.display(), bytes = written, "dispatch.downloaded");
            return Ok(Response::new(status, headers, Bytes::new()));
        }

        let body = match sink {
            Sink::Memory => transport::read_body(response, progress).await?,
            Sink::File(_) => transport::read_body(response, None).await?,
        };
        let parsed = serde_json::from_slice::<Value>(&body).ok();
        self.validate(status, &headers, parsed.as_ref())
            .map_err(|err| with_response_status(err, status))?;
        if !status.is_success() {
            return Err(Error::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(Response::new(status, headers, body))
    }

    fn validate(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: Option<&Value>,
    ) -> Result<(), Error> {
        match &self.inner.validator {
            Some(validator) => validator.validate(status, headers, body),
            None => Ok(()),
        }
    }
}

/// A rejection of an error response without its own code takes the response
/// status, so auth failures are still classified by status.
fn with_response_status(err: Error, status: StatusCode) -> Error {
    match err {
        Error::Validation { code: None, message } if !status.is_success() => Error::Validation {
            code: Some(status.as_u16()),
            message,
        },
        other => other,
    }
}
