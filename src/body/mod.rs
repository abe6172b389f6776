//! Turns a [`Payload`] into wire body bytes or a stream, plus the headers it implies.

mod chained;
mod multipart;

use bytes::Bytes;

use crate::errors::Error;
use crate::request::{Payload, UploadSource};

pub use chained::{ByteSource, ChainedReader};
pub use multipart::{MultipartBody, Part, PartSource, generate_boundary};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

pub enum WireBody {
    Empty,
    Bytes(Bytes),
    /// Streamed body of a precomputed length.
    Stream { reader: ChainedReader, length: u64 },
}

impl WireBody {
    pub fn length(&self) -> u64 {
        match self {
            WireBody::Empty => 0,
            WireBody::Bytes(bytes) => bytes.len() as u64,
            WireBody::Stream { length, .. } => *length,
        }
    }
}

impl std::fmt::Debug for WireBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireBody::Empty => write!(f, "Empty"),
            WireBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            WireBody::Stream { length, .. } => write!(f, "Stream({} bytes)", length),
        }
    }
}

#[derive(Debug)]
pub struct EncodedBody {
    pub body: WireBody,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub description: String,
}

pub async fn encode(payload: &Payload) -> Result<EncodedBody, Error> {
    let encoded = match payload {
        Payload::None => EncodedBody {
            body: WireBody::Empty,
            content_type: None,
            content_length: None,
            description: "no body".to_string(),
        },
        Payload::Json(object) => {
            let bytes = Bytes::from(serde_json::to_vec(object)?);
            EncodedBody {
                content_length: Some(bytes.len() as u64),
                description: format!("json {} fields ({} bytes)", object.len(), bytes.len()),
                body: WireBody::Bytes(bytes),
                content_type: Some(CONTENT_TYPE_JSON.to_string()),
            }
        }
        Payload::Form(fields) => {
            let encoded = encode_form(fields);
            let bytes = Bytes::from(encoded.into_bytes());
            EncodedBody {
                content_length: Some(bytes.len() as u64),
                description: format!("form {} fields ({} bytes)", fields.len(), bytes.len()),
                body: WireBody::Bytes(bytes),
                content_type: Some(CONTENT_TYPE_FORM.to_string()),
            }
        }
        Payload::Multipart(parts) => {
            let multipart = MultipartBody::new(parts).await;
            let length = multipart.content_length();
            let content_type = multipart.content_type();
            let description = multipart.description().to_string();
            EncodedBody {
                body: WireBody::Stream {
                    reader: multipart.into_reader().await,
                    length,
                },
                content_type: Some(content_type),
                content_length: Some(length),
                description,
            }
        }
        Payload::Upload(UploadSource::Bytes(bytes)) => EncodedBody {
            content_length: Some(bytes.len() as u64),
            description: format!("upload ({} bytes)", bytes.len()),
            body: WireBody::Bytes(bytes.clone()),
            content_type: None,
        },
        Payload::Upload(UploadSource::File(path)) => {
            let file = tokio::fs::File::open(path).await?;
            let length = file.metadata().await?.len();
            EncodedBody {
                body: WireBody::Stream {
                    reader: ChainedReader::new().with(Box::new(file)),
                    length,
                },
                content_type: None,
                content_length: Some(length),
                description: format!("upload file {} ({} bytes)", path.display(), length),
            }
        }
    };
    Ok(encoded)
}

/// `key=value&key=value` with standard percent-encoding.
pub fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
