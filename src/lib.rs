//! Declarative HTTP requests with a single coordinated token refresh and one
//! retry on authentication failure.

pub mod body;
mod config;
pub mod dispatch;
mod errors;
pub mod progress;
pub mod refresh;
pub mod request;
pub mod telemetry;
pub mod token;
pub mod transport;

pub use body::Part;
pub use config::{ClientConfig, ConfigLocation, read_config};
pub use dispatch::{
    Dispatcher, DispatcherBuilder, Document, Listing, PreSendHook, Response, ResponseValidator,
    Transfer,
};
pub use errors::{Error, Result};
pub use progress::Progress;
pub use refresh::{LoopDetector, Relogin, TokenRefreshCoordinator, TokenRefresher};
pub use request::{Authentication, Method, Payload, QueryValue, RequestDescriptor, UploadSource};
pub use token::{CredentialStore, FileCredentialStore, MemoryCredentialStore, Token, TokenStore};
pub use transport::{RedirectAction, RedirectAttempt, RedirectHook};

#[cfg(test)]
mod tests;
