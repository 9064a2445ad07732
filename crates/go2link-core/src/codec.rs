//! JSON codec for data channel frames
//!
//! Every outbound publish is exactly one frame; every inbound frame decodes
//! to exactly one [`Envelope`] or fails.

use bytes::Bytes;

use crate::{Envelope, Error, Result};

/// Encode an envelope into a single frame
pub fn encode(envelope: &Envelope) -> Result<Bytes> {
    serde_json::to_vec(envelope)
        .map(Bytes::from)
        .map_err(|e| Error::EncodeError(e.to_string()))
}

/// Decode a single frame into an envelope
pub fn decode(frame: &[u8]) -> Result<Envelope> {
    if frame.is_empty() {
        return Err(Error::EmptyFrame);
    }
    serde_json::from_slice(frame).map_err(|e| Error::DecodeError(e.to_string()))
}
