//! Sealed request envelopes for providers with an encrypted channel.
//!
//! VAHAN and NIC wrap payloads in `{data, symmetricKey, hash}` style envelopes.
//! The cryptography is provider key material and lives behind `EnvelopeCodec`.
//! `PlainEnvelope` is the transparent codec used against sandboxes and mocks.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::{GatewayError, GatewayResult};

/// Wire fields of a sealed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub data: String,
    pub symmetric_key: String,
    pub hash: String,
}

/// Seals outbound payloads and opens inbound ones.
pub trait EnvelopeCodec: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> GatewayResult<SealedEnvelope>;

    fn open(&self, envelope: &SealedEnvelope) -> GatewayResult<Vec<u8>>;
}

/// Base64 data with a SHA-256 integrity hash, no confidentiality.
#[derive(Debug, Clone)]
pub struct PlainEnvelope {
    key_label: String,
}

impl PlainEnvelope {
    pub fn new(key_label: impl Into<String>) -> Self {
        Self {
            key_label: key_label.into(),
        }
    }

    fn digest(data: &str) -> String {
        STANDARD.encode(Sha256::digest(data.as_bytes()))
    }
}

impl EnvelopeCodec for PlainEnvelope {
    fn seal(&self, plaintext: &[u8]) -> GatewayResult<SealedEnvelope> {
        let data = STANDARD.encode(plaintext);
        Ok(SealedEnvelope {
            hash: Self::digest(&data),
            symmetric_key: STANDARD.encode(self.key_label.as_bytes()),
            data,
        })
    }

    fn open(&self, envelope: &SealedEnvelope) -> GatewayResult<Vec<u8>> {
        if Self::digest(&envelope.data) != envelope.hash {
            return Err(GatewayError::Envelope("hash mismatch".to_string()));
        }
        STANDARD
            .decode(envelope.data.as_bytes())
            .map_err(|e| GatewayError::Envelope(format!("invalid data encoding: {}", e)))
    }
}
