mod descriptor;
mod endpoint;
mod wire;

pub use descriptor::{Authentication, Method, Payload, QueryValue, RequestDescriptor, UploadSource};
pub use endpoint::{append_query, resolve_url};
pub use wire::{WireRequest, build};
