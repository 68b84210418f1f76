//! Framing: length-prefix (4 bytes big-endian) + payload bytes.

/// Size of the length prefix.
pub const LEN_SIZE: usize = 4;

/// Upper bound on a single frame payload. Chat envelopes are small; anything
/// near this limit is a corrupt or hostile length prefix.
pub const MAX_FRAME_LEN: u32 = 4 * 1024 * 1024;

/// Encode a payload into a single frame: 4 bytes BE length + payload.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameEncodeError> {
    let len = payload.len() as u32;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Error encoding a payload into a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the payload and the
/// number of bytes consumed. Call with a partial buffer; `NeedMore` means the
/// caller should try again after more data.
pub fn decode_frame(bytes: &[u8]) -> Result<(Vec<u8>, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge);
    }
    let len = len as usize;
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    Ok((bytes[LEN_SIZE..LEN_SIZE + len].to_vec(), LEN_SIZE + len))
}

/// Error decoding a frame (need more bytes or a hostile length prefix).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
}
