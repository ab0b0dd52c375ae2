//! Length-prefixed framing.
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always use `Buf` and `remaining()` checks.
//! - The size limit is enforced from the prefix alone, before buffering the body.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, SentryError};

/// Size of the body length prefix.
pub const LEN_PREFIX: usize = 4;

/// Split one complete frame body off the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed. A prefix announcing a body
/// above `max_body` is an error even if the body has not arrived yet.
pub fn split_frame(buf: &mut BytesMut, max_body: usize) -> Result<Option<Bytes>> {
    let mut peek: &[u8] = buf.as_ref();
    if peek.remaining() < LEN_PREFIX {
        return Ok(None);
    }

    let len = peek.get_u32_le() as usize;
    if len > max_body {
        return Err(SentryError::FrameTooLarge { len, max: max_body });
    }

    if peek.remaining() < len {
        buf.reserve(LEN_PREFIX + len - buf.len());
        return Ok(None);
    }

    buf.advance(LEN_PREFIX);
    Ok(Some(buf.split_to(len).freeze()))
}

/// Append `body` to `dst` with its length prefix.
pub fn put_frame(dst: &mut BytesMut, body: &[u8]) {
    dst.reserve(LEN_PREFIX + body.len());
    dst.put_u32_le(body.len() as u32);
    dst.put_slice(body);
}
