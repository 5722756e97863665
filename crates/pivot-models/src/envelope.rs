//! Job envelope definitions for queue processing.
//!
//! The envelope is produced by the API, pushed onto the durable job list as
//! UTF-8 JSON and is immutable once enqueued. Required fields are checked by
//! [`JobEnvelope::validate`] rather than by the decoder, so that an envelope
//! with a known `jobId` but other missing fields can still be attributed.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ValidationError, ValidationResult};

/// Deserialize `null` the same way as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reference to the source blob of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRef {
    /// Object key in the blob store
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,

    /// MIME type declared by the producer (overrides the store-reported type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl InputRef {
    /// Create an input reference for a blob key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mime_type: None,
        }
    }

    /// Set the declared MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Declared MIME type, ignoring blank values.
    pub fn declared_mime_type(&self) -> Option<&str> {
        self.mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Lower-cased file extension of the key, including the leading dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.key)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{}", e.to_lowercase()))
    }
}

/// One requested media transformation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    /// Unique job identifier assigned by the API
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_id: String,

    /// Organization that owns the job
    #[serde(default, deserialize_with = "null_as_default")]
    pub org_id: String,

    /// Media type (`IMAGE`, `AUDIO`, `VIDEO`), kept as transported
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_type: String,

    /// Operation identifier, e.g. `audio.trim`
    #[serde(default, deserialize_with = "null_as_default")]
    pub feature_slug: String,

    /// Source blob
    #[serde(default, deserialize_with = "null_as_default")]
    pub input: InputRef,

    /// Operation-specific parameters, untyped on the wire
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Map<String, Value>,
}

impl JobEnvelope {
    /// Create an envelope with empty parameters.
    pub fn new(
        job_id: impl Into<String>,
        org_id: impl Into<String>,
        media_type: impl Into<String>,
        feature_slug: impl Into<String>,
        input: InputRef,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            org_id: org_id.into(),
            media_type: media_type.into(),
            feature_slug: feature_slug.into(),
            input,
            params: Map::new(),
        }
    }

    /// Set a single parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Decode an envelope from its queue representation.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The job id, if one was supplied.
    pub fn known_job_id(&self) -> Option<&str> {
        let id = self.job_id.trim();
        (!id.is_empty()).then_some(id)
    }

    /// Check that `jobId`, `orgId` and `input.key` are present.
    pub fn validate(&self) -> ValidationResult<()> {
        let missing: Vec<&str> = [
            ("jobId", self.job_id.as_str()),
            ("orgId", self.org_id.as_str()),
            ("input.key", self.input.key.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing.join("/")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_producer_payload() {
        let raw = r#"{
            "version": "1.1",
            "jobId": "j1",
            "userId": "u1",
            "orgId": "o1",
            "mediaType": "IMAGE",
            "featureSlug": "image.resize",
            "input": {"storage": "R2", "bucket": "b", "key": "in/a.png", "sizeBytes": 10, "mimeType": "image/png"},
            "params": {"width": 100},
            "metadata": {"attempt": 1}
        }"#;

        let envelope = JobEnvelope::from_json(raw).unwrap();
        assert_eq!(envelope.job_id, "j1");
        assert_eq!(envelope.org_id, "o1");
        assert_eq!(envelope.media_type, "IMAGE");
        assert_eq!(envelope.input.key, "in/a.png");
        assert_eq!(envelope.input.declared_mime_type(), Some("image/png"));
        assert_eq!(envelope.params.get("width"), Some(&Value::from(100)));
        assert!(envelope.validate().is_ok());
    }

    #[test]
    fn test_nulls_decode_as_missing() {
        let raw = r#"{"jobId": null, "orgId": "o1", "input": null, "params": null}"#;
        let envelope = JobEnvelope::from_json(raw).unwrap();

        assert_eq!(envelope.known_job_id(), None);
        assert!(envelope.params.is_empty());
        assert_eq!(
            envelope.validate().unwrap_err().to_string(),
            "Invalid payload: missing jobId/input.key"
        );
    }

    #[test]
    fn test_non_json_fails_to_decode() {
        assert!(JobEnvelope::from_json("not json").is_err());
        assert!(JobEnvelope::from_json("42").is_err());
    }

    #[test]
    fn test_input_extension() {
        assert_eq!(InputRef::new("in/a.PNG").extension().as_deref(), Some(".png"));
        assert_eq!(InputRef::new("in/noext").extension(), None);
        assert_eq!(InputRef::new("in/a.png").with_mime_type("  ").declared_mime_type(), None);
    }
}
