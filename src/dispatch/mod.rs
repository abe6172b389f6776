mod dispatcher;
mod hooks;
mod outcome;
mod response;
mod transfer;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use hooks::{PreSendHook, ResponseValidator};
pub use outcome::DispatchOutcome;
pub use response::{Document, Listing, Response};
pub use transfer::Transfer;
