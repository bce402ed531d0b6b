//! Identifier encoding.
//!
//! Some backends expose element ids that are awkward for callers (record
//! positions, composite ids). A schema can carry an [`IdCodec`] that
//! transforms the backend id on the way out (`encode`, applied when an id
//! is written back onto an object) and reverses it on the way in (`decode`,
//! applied before any lookup). An absent codec is the identity transform.
//!
//! Round-trip law: `decode(encode(x)) == x` for every id the codec claims
//! to handle.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use thiserror::Error;

/// Errors from identifier decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The id is not in the codec's encoded form
    #[error("invalid encoded id '{id}': {reason}")]
    InvalidEncoding { id: String, reason: String },
}

impl CodecError {
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Capability for transforming backend element ids into caller-visible ids
/// and back.
pub trait IdCodec: Send + Sync {
    /// Transform a backend-native id into its caller-visible form.
    fn encode(&self, raw: &str) -> String;

    /// Reverse [`encode`](IdCodec::encode).
    fn decode(&self, encoded: &str) -> Result<String, CodecError>;
}

/// URL-safe base64 codec (no padding), for backends whose native ids
/// contain characters that do not survive transport (e.g. `#12:0`-style
/// composite record ids).
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64IdCodec;

impl IdCodec for Base64IdCodec {
    fn encode(&self, raw: &str) -> String {
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    fn decode(&self, encoded: &str) -> Result<String, CodecError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CodecError::invalid(encoded, e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CodecError::invalid(encoded, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let codec = Base64IdCodec;
        for raw in ["#12:0", "v42", "", "a b/c?d"] {
            assert_eq!(codec.decode(&codec.encode(raw)).unwrap(), raw);
        }
    }

    #[test]
    fn test_base64_rejects_garbage() {
        let codec = Base64IdCodec;
        assert!(codec.decode("!!not base64!!").is_err());
    }
}
