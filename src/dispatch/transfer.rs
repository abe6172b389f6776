use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::Error;
use crate::progress::Progress;

/// A call running in the background: progress updates plus one terminal result.
pub struct Transfer<T> {
    id: Uuid,
    progress: watch::Receiver<Progress>,
    handle: JoinHandle<Result<T, Error>>,
}

impl<T> Transfer<T> {
    pub(crate) fn new(
        id: Uuid,
        progress: watch::Receiver<Progress>,
        handle: JoinHandle<Result<T, Error>>,
    ) -> Self {
        Self {
            id,
            progress,
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    /// Cancels the call, dropping the in-flight transport operation.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn result(self) -> Result<T, Error> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(Error::Cancelled),
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}
