use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::Error;
use crate::request::RequestDescriptor;

/// A validated response with its body fully read.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }

    pub fn document(&self) -> Result<Document, Error> {
        Document::from_slice(&self.body)
    }

    pub fn text(&self) -> Result<String, Error> {
        String::from_utf8(self.body.to_vec()).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// An ordered JSON object with explicit, fallible field access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        Self::try_from(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn str_field(&self, key: &str) -> Result<&str, Error> {
        self.field(key)?
            .as_str()
            .ok_or_else(|| mismatch(key, "a string"))
    }

    pub fn i64_field(&self, key: &str) -> Result<i64, Error> {
        self.field(key)?
            .as_i64()
            .ok_or_else(|| mismatch(key, "an integer"))
    }

    pub fn f64_field(&self, key: &str) -> Result<f64, Error> {
        self.field(key)?
            .as_f64()
            .ok_or_else(|| mismatch(key, "a number"))
    }

    pub fn bool_field(&self, key: &str) -> Result<bool, Error> {
        self.field(key)?
            .as_bool()
            .ok_or_else(|| mismatch(key, "a boolean"))
    }

    pub fn array_field(&self, key: &str) -> Result<&[Value], Error> {
        self.field(key)?
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| mismatch(key, "an array"))
    }

    pub fn object_field(&self, key: &str) -> Result<Document, Error> {
        match self.field(key)? {
            Value::Object(map) => Ok(Document(map.clone())),
            _ => Err(mismatch(key, "an object")),
        }
    }

    /// Decodes the whole document into a declared schema.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| Error::Decode(e.to_string()))
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn field(&self, key: &str) -> Result<&Value, Error> {
        self.0
            .get(key)
            .ok_or_else(|| Error::Decode(format!("missing field `{}`", key)))
    }
}

impl TryFrom<Value> for Document {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Document(map)),
            other => Err(Error::Decode(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }
}

fn mismatch(key: &str, expected: &str) -> Error {
    Error::Decode(format!("field `{}` is not {}", key, expected))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing<T> {
    #[serde(alias = "data", alias = "results")]
    pub items: Vec<T>,
    /// Link to the following page, absolute or relative to the base URL.
    #[serde(default, alias = "next_page", alias = "nextPage")]
    pub next: Option<String>,
    #[serde(default, alias = "count", alias = "total_count")]
    pub total: Option<u64>,
}

impl<T> Listing<T> {
    /// Descriptor for the following page: same method, headers and
    /// authentication as `current`, pointed at the `next` link.
    pub fn next_descriptor(&self, current: &RequestDescriptor) -> Option<RequestDescriptor> {
        let next = self.next.as_deref().filter(|n| !n.is_empty())?;
        let descriptor = current
            .headers()
            .iter()
            .fold(RequestDescriptor::new(current.method(), next), |d, (k, v)| {
                d.with_header(k.clone(), v.clone())
            })
            .with_authentication(current.authentication().clone());
        Some(descriptor)
    }
}
