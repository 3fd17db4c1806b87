//! Wire format of a dispatch request.
//!
//! ```json
//! {
//!   "worker": "converter",
//!   "naming_version": 1,
//!   "payload": {
//!     "s3": { "token": "...", "secret": "...", "bucket": "..." },
//!     "pdf_paths": ["exam-pdf/a.pdf"],
//!     "jpeg_prefixes": ["exam-pages/a"]
//!   },
//!   "instance_options": { "instance_type": "m3.medium" }
//! }
//! ```

use std::fmt;

use examsplit_core::error::CoreError;
use serde::{Deserialize, Serialize};

/// Name of the remote worker that renders pages.
pub const CONVERTER_WORKER: &str = "converter";

/// Instance size requested when none is configured.
pub const DEFAULT_INSTANCE_TYPE: &str = "m3.medium";

/// Storage credentials forwarded to the fleet so it can read the booklet
/// documents and write images.
///
/// Opaque to this system. `Debug` never prints the secret parts.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialBundle {
    pub token: String,
    pub secret: String,
    pub bucket: String,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("token", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Per-batch work: parallel lists of document paths and image prefixes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionPayload {
    pub s3: CredentialBundle,
    pub pdf_paths: Vec<String>,
    pub jpeg_prefixes: Vec<String>,
}

/// Sizing hint for the machines that run the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceOptions {
    pub instance_type: String,
}

/// Full request body for `POST /dispatch`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchRequest {
    pub worker: String,
    pub naming_version: u32,
    pub payload: ConversionPayload,
    pub instance_options: InstanceOptions,
}

impl DispatchRequest {
    /// Build a request from `(document path, image prefix)` pairs.
    ///
    /// An empty batch is a validation error.
    pub fn new<I>(
        credentials: CredentialBundle,
        entries: I,
        naming_version: u32,
        instance_type: impl Into<String>,
    ) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let (pdf_paths, jpeg_prefixes): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
        if pdf_paths.is_empty() {
            return Err(CoreError::Validation(
                "A dispatch batch needs at least one document".into(),
            ));
        }
        Ok(Self {
            worker: CONVERTER_WORKER.to_string(),
            naming_version,
            payload: ConversionPayload {
                s3: credentials,
                pdf_paths,
                jpeg_prefixes,
            },
            instance_options: InstanceOptions {
                instance_type: instance_type.into(),
            },
        })
    }

    pub fn len(&self) -> usize {
        self.payload.pdf_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.pdf_paths.is_empty()
    }
}
