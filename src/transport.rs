//! The HTTP transport: a thin layer over `reqwest::Client` that sends
//! [`WireRequest`]s, streams bodies in both directions and reports progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::redirect::{Attempt, Policy};
use reqwest::{Client, StatusCode, Url};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::body::{ChainedReader, WireBody};
use crate::config::ClientConfig;
use crate::errors::Error;
use crate::progress::{Progress, ProgressSender};
use crate::request::WireRequest;

const MAX_REDIRECTS: usize = 10;

/// What a redirect hook gets to look at.
pub struct RedirectAttempt<'a> {
    pub status: StatusCode,
    pub url: &'a Url,
    pub previous: &'a [Url],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectAction {
    Follow,
    /// Do not follow; the redirect response is returned as-is.
    Stop,
}

pub type RedirectHook = Arc<dyn Fn(&RedirectAttempt<'_>) -> RedirectAction + Send + Sync>;

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ClientConfig, redirect: Option<RedirectHook>) -> Result<Self, Error> {
        let policy = match redirect {
            Some(hook) => Policy::custom(move |attempt| apply_hook(&hook, attempt)),
            None if config.follow_redirects => Policy::limited(MAX_REDIRECTS),
            None => Policy::none(),
        };
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(policy);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self::new(builder.build()?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Sends the request; a `reqwest` failure here means no response arrived.
    pub async fn send(
        &self,
        request: WireRequest,
        progress: Option<&ProgressSender>,
    ) -> Result<reqwest::Response, Error> {
        let WireRequest {
            method,
            url,
            headers,
            body,
            ..
        } = request;
        let mut builder = self.client.request(method, url).headers(headers);
        let mut buffered = None;
        builder = match body {
            WireBody::Empty => builder,
            WireBody::Bytes(bytes) => {
                let length = bytes.len() as u64;
                report(progress, 0, Some(length));
                buffered = Some(length);
                builder.body(bytes)
            }
            WireBody::Stream { reader, length } => {
                let stream = counted_upload(reader, length, progress.cloned());
                builder.body(reqwest::Body::wrap_stream(stream))
            }
        };
        let response = builder.send().await?;
        // A buffered body has been fully written once the response arrives.
        if let Some(length) = buffered {
            report(progress, length, Some(length));
        }
        Ok(response)
    }
}

fn apply_hook(hook: &RedirectHook, attempt: Attempt<'_>) -> reqwest::redirect::Action {
    if attempt.previous().len() >= MAX_REDIRECTS {
        return attempt.error("too many redirects");
    }
    let action = hook(&RedirectAttempt {
        status: attempt.status(),
        url: attempt.url(),
        previous: attempt.previous(),
    });
    match action {
        RedirectAction::Follow => attempt.follow(),
        RedirectAction::Stop => attempt.stop(),
    }
}

fn counted_upload(
    reader: ChainedReader,
    length: u64,
    progress: Option<ProgressSender>,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let mut sent = 0u64;
    ReaderStream::new(reader).inspect(move |chunk| {
        if let Ok(bytes) = chunk {
            sent += bytes.len() as u64;
            report(progress.as_ref(), sent, Some(length));
        }
    })
}

/// Buffers the response body, reporting download progress per chunk.
pub async fn read_body(
    response: reqwest::Response,
    progress: Option<&ProgressSender>,
) -> Result<Bytes, Error> {
    let total = response.content_length();
    let mut received = 0u64;
    let mut buf = BytesMut::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        received += chunk.len() as u64;
        buf.extend_from_slice(&chunk);
        report(progress, received, total);
    }
    Ok(buf.freeze())
}

/// A downloaded body sitting in a hidden sibling of its target. Dropping it
/// without [`commit`](Self::commit) deletes the partial file.
#[derive(Debug)]
pub struct StagedDownload {
    partial: PathBuf,
    written: u64,
    committed: bool,
}

impl StagedDownload {
    fn new(target: &Path) -> Self {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        Self {
            partial: target.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4().simple())),
            written: 0,
            committed: false,
        }
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Moves the body into place, replacing whatever `target` held.
    pub async fn commit(mut self, target: &Path) -> Result<u64, Error> {
        tokio::fs::rename(&self.partial, target).await?;
        self.committed = true;
        Ok(self.written)
    }
}

impl Drop for StagedDownload {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}

/// Streams the response body next to `target`; nothing at `target` changes
/// until the caller commits.
pub async fn download_to(
    response: reqwest::Response,
    target: &Path,
    progress: Option<&ProgressSender>,
) -> Result<StagedDownload, Error> {
    let total = response.content_length();
    let mut staged = StagedDownload::new(target);
    let mut file = tokio::fs::File::create(&staged.partial).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        staged.written += chunk.len() as u64;
        report(progress, staged.written, total);
    }
    file.flush().await?;
    drop(file);
    Ok(staged)
}

fn report(progress: Option<&ProgressSender>, completed: u64, total: Option<u64>) {
    if let Some(progress) = progress {
        progress.send_replace(Progress { completed, total });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::MultipartBody;
    use crate::progress::ProgressRegistry;

    #[tokio::test]
    async fn upload_stream_reports_every_chunk() {
        let registry = Arc::new(ProgressRegistry::new());
        let (registration, rx) = registry.register();
        let parts = vec![crate::body::Part::bytes(
            "f",
            "f.bin",
            "application/octet-stream",
            vec![1u8; 10_000],
        )];
        let body = MultipartBody::new(&parts).await;
        let length = body.content_length();
        let stream = counted_upload(
            body.into_reader().await,
            length,
            Some(Arc::clone(registration.sender())),
        );
        let chunks: Vec<_> = stream.collect().await;
        let total: usize = chunks.iter().map(|c| c.as_ref().unwrap().len()).sum();
        assert_eq!(total as u64, length);
        assert_eq!(
            *rx.borrow(),
            Progress {
                completed: length,
                total: Some(length)
            }
        );
    }

    #[test]
    fn uncommitted_download_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.csv");
        let staged = StagedDownload::new(&target);
        let partial = staged.partial_path().to_path_buf();
        assert_eq!(partial.parent(), Some(dir.path()));
        assert!(
            partial
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(".report.csv.")
        );

        std::fs::write(&partial, b"half").unwrap();
        drop(staged);
        assert!(!partial.exists());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn committed_download_replaces_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.bin");
        std::fs::write(&target, b"old").unwrap();

        let staged = StagedDownload::new(&target);
        std::fs::write(staged.partial_path(), b"fresh").unwrap();
        let partial = staged.partial_path().to_path_buf();
        staged.commit(&target).await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"fresh");
        assert!(!partial.exists());
    }

    #[test]
    fn config_builds_a_client() {
        let mut config = ClientConfig::new("https://api.example");
        config.timeout_secs = Some(5);
        config.follow_redirects = false;
        assert!(HttpTransport::from_config(&config, None).is_ok());

        let hook: RedirectHook = Arc::new(|_: &RedirectAttempt<'_>| RedirectAction::Stop);
        assert!(HttpTransport::from_config(&config, Some(hook)).is_ok());
    }
}
