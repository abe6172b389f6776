use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::errors::Error;
use crate::request::WireRequest;

/// Inspects every received response and may reject it with a domain error,
/// e.g. a business failure embedded in a `200` body.
///
/// `body` is the best-effort JSON parse of the response; `None` when the body
/// is not JSON or was streamed to a file.
pub trait ResponseValidator: Send + Sync {
    fn validate(&self, status: StatusCode, headers: &HeaderMap, body: Option<&Value>)
    -> Result<(), Error>;
}

impl<F> ResponseValidator for F
where
    F: Fn(StatusCode, &HeaderMap, Option<&Value>) -> Result<(), Error> + Send + Sync,
{
    fn validate(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: Option<&Value>,
    ) -> Result<(), Error> {
        (self)(status, headers, body)
    }
}

/// Last chance to adjust a request before it goes out (tracing headers etc).
pub trait PreSendHook: Send + Sync {
    fn before_send(&self, request: &mut WireRequest);
}

impl<F> PreSendHook for F
where
    F: Fn(&mut WireRequest) + Send + Sync,
{
    fn before_send(&self, request: &mut WireRequest) {
        (self)(request)
    }
}
