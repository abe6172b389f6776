use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::body::{self, WireBody};
use crate::errors::Error;
use crate::request::{RequestDescriptor, append_query, resolve_url};

/// A fully formed request ready for the transport.
#[derive(Debug)]
pub struct WireRequest {
    pub method: reqwest::Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: WireBody,
    pub description: String,
}

impl WireRequest {
    pub fn authorize(&mut self, scheme: &str, token: &str) -> Result<(), Error> {
        let value = HeaderValue::from_str(&format!("{} {}", scheme, token))
            .map_err(|e| Error::InvalidHeader(format!("authorization: {}", e)))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Builds the wire request for `descriptor`, resolving relative endpoints against `base`.
///
/// Header precedence: encoder headers first, then descriptor headers on top,
/// except `Content-Length` which always comes from the encoder.
pub async fn build(descriptor: &RequestDescriptor, base: &Url) -> Result<WireRequest, Error> {
    let mut url = resolve_url(base, descriptor.endpoint())?;
    append_query(&mut url, descriptor.query())?;

    let encoded = body::encode(descriptor.payload()).await?;

    let mut headers = HeaderMap::new();
    if let Some(content_type) = &encoded.content_type {
        headers.insert(CONTENT_TYPE, header_value(content_type)?);
    }
    for (name, value) in descriptor.headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidHeader(format!("{}: {}", name, e)))?;
        if name == CONTENT_LENGTH {
            continue;
        }
        headers.insert(name, header_value(value)?);
    }
    if let Some(length) = encoded.content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    let method = descriptor.method();
    let description = format!("{} {} ({})", method, url, encoded.description);
    Ok(WireRequest {
        method: method.as_reqwest(),
        url,
        headers,
        body: encoded.body,
        description,
    })
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader(format!("{}: {}", value, e)))
}
