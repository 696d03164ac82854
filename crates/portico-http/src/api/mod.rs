//! Request and response types shared by the client and its transports

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use portico_core::error::PorticoError;

/// HTTP methods supported by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    /// Canonical upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Read-only methods whose responses may be served from cache
    pub fn is_cacheable(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = PorticoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            other => Err(PorticoError::InvalidRequest {
                message: format!("Unsupported HTTP method: {}", other),
            }),
        }
    }
}

/// A file attached to a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// File name reported to the server
    pub file_name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A single multipart form value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File(FilePart),
}

/// Payload accepted by `upload`
#[derive(Debug, Clone, PartialEq)]
pub enum UploadPayload {
    /// A lone file, attached under the conventional `file` field
    File(FilePart),
    /// Named fields, attached one by one
    Fields(BTreeMap<String, FormValue>),
}

/// Field name used when uploading a lone file
pub const UPLOAD_FILE_FIELD: &str = "file";

impl UploadPayload {
    /// Flatten into ordered multipart parts
    pub fn into_parts(self) -> Vec<(String, FormValue)> {
        match self {
            UploadPayload::File(file) => vec![(UPLOAD_FILE_FIELD.to_string(), FormValue::File(file))],
            UploadPayload::Fields(fields) => fields.into_iter().collect(),
        }
    }
}

/// Request body variants
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Structured body serialized as JSON
    Json(serde_json::Value),
    /// Raw text body sent as-is
    Text(String),
    /// Multipart form body
    Multipart(Vec<(String, FormValue)>),
}

impl RequestBody {
    /// Serialize any value into a JSON body
    pub fn json<T: Serialize>(value: &T) -> Result<Self, PorticoError> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|e| PorticoError::InvalidRequest {
                message: format!("Failed to serialize request body: {}", e),
            })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Stable textual rendering used for cache keys
    pub fn fingerprint(&self) -> String {
        match self {
            RequestBody::Empty => "null".to_string(),
            RequestBody::Json(value) => value.to_string(),
            RequestBody::Text(text) => serde_json::Value::String(text.clone()).to_string(),
            RequestBody::Multipart(parts) => {
                let fields: Vec<String> = parts
                    .iter()
                    .map(|(name, value)| match value {
                        FormValue::Text(text) => format!("{}={}", name, text),
                        FormValue::File(file) => {
                            format!("{}=@{}({} bytes)", name, file.file_name, file.bytes.len())
                        },
                    })
                    .collect();
                format!("multipart[{}]", fields.join("&"))
            },
        }
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

/// Per-call request options
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestOptions {
    pub method: Option<HttpMethod>,
    /// Query parameters appended to the URL
    pub query: BTreeMap<String, String>,
    pub body: RequestBody,
    /// Per-call headers, taking precedence over the client defaults
    pub headers: BTreeMap<String, String>,
    /// Serve and store cacheable reads through the client cache
    pub use_cache: bool,
    /// Overrides the client timeout for this call
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn cached(mut self) -> Self {
        self.use_cache = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Effective method, defaulting to GET
    pub fn effective_method(&self) -> HttpMethod {
        self.method.unwrap_or(HttpMethod::Get)
    }
}

/// Decoded response payload, chosen by the declared content type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

/// Normalized response returned by every client call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub data: ResponseBody,
    pub status: u16,
    pub status_text: String,
    /// Response headers with lower-case names
    pub headers: BTreeMap<String, String>,
    pub ok: bool,
}

impl HttpResponse {
    /// Deserialize a JSON payload into a typed value
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PorticoError> {
        match &self.data {
            ResponseBody::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|e| PorticoError::Decode {
                    message: format!("Unexpected JSON shape: {}", e),
                })
            },
            ResponseBody::Text(_) | ResponseBody::Bytes(_) => Err(PorticoError::Decode {
                message: "Response body is not JSON".to_string(),
            }),
        }
    }

    /// Text payload, if the response was textual
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}
