mod credential;
mod store;

pub use credential::Token;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, TokenStore};
