use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::warn;

use super::chained::{ByteSource, ChainedReader, FailedSource};

const BOUNDARY_LEN: usize = 32;

#[derive(Debug, Clone)]
pub enum PartSource {
    Bytes(Bytes),
    /// Read lazily while the body streams; never buffered whole.
    File(PathBuf),
}

/// One field of a multipart/form-data body.
#[derive(Debug, Clone)]
pub struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    source: PartSource,
}

impl Part {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            source: PartSource::Bytes(Bytes::from(value.into())),
        }
    }

    pub fn bytes(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            source: PartSource::Bytes(data.into()),
        }
    }

    /// File part named after the last path component.
    pub fn file(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        content_type: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Self {
            name: name.into(),
            filename: Some(filename),
            content_type: Some(content_type.into()),
            source: PartSource::File(path),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &PartSource {
        &self.source
    }

    fn header(&self, boundary: &str) -> String {
        let mut header = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            boundary,
            sanitize(&self.name)
        );
        if let Some(filename) = &self.filename {
            header.push_str(&format!("; filename=\"{}\"", sanitize(filename)));
        }
        header.push_str("\r\n");
        if let Some(content_type) = &self.content_type {
            header.push_str(&format!("Content-Type: {}\r\n", content_type));
        }
        header.push_str("\r\n");
        header
    }
}

fn sanitize(value: &str) -> String {
    value.replace('"', "_")
}

pub fn generate_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LEN)
        .map(char::from)
        .collect();
    format!("api-dispatch-{}", token)
}

#[derive(Debug)]
enum Segment {
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

impl Segment {
    fn len(&self) -> u64 {
        match self {
            Segment::Bytes(b) => b.len() as u64,
            Segment::File { len, .. } => *len,
        }
    }
}

/// A fully laid out multipart body: header, data and trailer segments with
/// their sizes known up front.
#[derive(Debug)]
pub struct MultipartBody {
    boundary: String,
    segments: Vec<Segment>,
    description: String,
}

impl MultipartBody {
    pub async fn new(parts: &[Part]) -> Self {
        Self::with_boundary(parts, generate_boundary()).await
    }

    pub async fn with_boundary(parts: &[Part], boundary: String) -> Self {
        let mut segments = Vec::with_capacity(parts.len() * 3 + 1);
        let mut described = Vec::with_capacity(parts.len());
        for part in parts {
            segments.push(Segment::Bytes(Bytes::from(part.header(&boundary))));
            match &part.source {
                PartSource::Bytes(data) => {
                    described.push(format!("{} ({} bytes)", part.name, data.len()));
                    segments.push(Segment::Bytes(data.clone()));
                }
                PartSource::File(path) => {
                    let len = file_len(path).await;
                    described.push(format!(
                        "{} (file {}, {} bytes)",
                        part.name,
                        path.display(),
                        len
                    ));
                    segments.push(Segment::File {
                        path: path.clone(),
                        len,
                    });
                }
            }
            segments.push(Segment::Bytes(Bytes::from_static(b"\r\n")));
        }
        segments.push(Segment::Bytes(Bytes::from(format!("--{}--\r\n", boundary))));
        let description = format!("multipart [{}]", described.join(", "));
        Self {
            boundary,
            segments,
            description,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Exact sum of all segment sizes.
    pub fn content_length(&self) -> u64 {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Opens file segments and chains every segment into one stream.
    pub async fn into_reader(self) -> ChainedReader {
        let mut reader = ChainedReader::new();
        for segment in self.segments {
            reader.push(open_segment(segment).await);
        }
        reader
    }
}

async fn open_segment(segment: Segment) -> ByteSource {
    match segment {
        Segment::Bytes(bytes) => Box::new(Cursor::new(bytes)),
        Segment::File { path, .. } => match tokio::fs::File::open(&path).await {
            Ok(file) => Box::new(file),
            Err(err) => Box::new(FailedSource::new(err)),
        },
    }
}

/// Size of a file on disk. A failed lookup contributes zero bytes.
pub(crate) async fn file_len(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "multipart.file_size_unknown");
            0
        }
    }
}
