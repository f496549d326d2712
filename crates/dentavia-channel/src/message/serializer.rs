//! Frame-level encoding, decoding, and validation of envelopes.

use dentavia_core::{AppError, AppResult, ErrorKind};

use super::envelope::Envelope;

/// Largest frame accepted in either direction, in bytes.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Encode an envelope to its wire frame.
pub fn encode(envelope: &Envelope) -> AppResult<String> {
    let frame = serde_json::to_string(envelope).map_err(|e| {
        AppError::with_source(ErrorKind::Serialization, "failed to encode envelope", e)
    })?;
    if frame.len() > MAX_FRAME_BYTES {
        return Err(AppError::validation(format!(
            "outbound frame is {} bytes, limit is {MAX_FRAME_BYTES}",
            frame.len()
        )));
    }
    Ok(frame)
}

/// Decode a received frame into an envelope, validating it first.
pub fn decode(frame: &str) -> AppResult<Envelope> {
    validate_frame(frame)?;
    serde_json::from_str(frame).map_err(|e| {
        AppError::with_source(ErrorKind::Serialization, "failed to decode envelope", e)
    })
}

/// Reject frames that are empty or exceed the size limit.
pub fn validate_frame(frame: &str) -> AppResult<()> {
    if frame.trim().is_empty() {
        return Err(AppError::validation("frame is empty"));
    }
    if frame.len() > MAX_FRAME_BYTES {
        return Err(AppError::validation(format!(
            "inbound frame is {} bytes, limit is {MAX_FRAME_BYTES}",
            frame.len()
        )));
    }
    Ok(())
}
