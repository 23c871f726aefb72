//! Framing and low-level field codecs.
//!
//! Every message after the startup packet is framed as a one-byte tag
//! followed by a big-endian `i32` length that counts itself but not the tag.
//! The startup-phase packets (`Startup`, `SslRequest`, `CancelRequest`) are
//! untagged: length first, then a 32-bit request code.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of the length word.
pub const LENGTH_SIZE: usize = 4;

/// Size of a tagged frame header (tag + length).
pub const HEADER_SIZE: usize = 1 + LENGTH_SIZE;

/// Largest frame accepted during negotiation.
///
/// Startup traffic is a handful of short messages; anything bigger is a
/// desynchronised stream or a hostile peer.
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Split one tagged frame off the front of `src`.
///
/// Returns `Ok(None)` until the whole frame has been buffered; `src` is
/// left untouched in that case.
pub fn split_tagged(src: &mut BytesMut) -> Result<Option<(u8, Bytes)>, ProtocolError> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let tag = src[0];
    let length = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
    let body_len = checked_body_len(length)?;

    if src.len() < HEADER_SIZE + body_len {
        src.reserve(HEADER_SIZE + body_len - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();
    Ok(Some((tag, body)))
}

/// Split one untagged (startup-phase) packet off the front of `src`.
pub fn split_untagged(src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
    if src.len() < LENGTH_SIZE {
        return Ok(None);
    }

    let length = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
    let body_len = checked_body_len(length)?;

    if src.len() < LENGTH_SIZE + body_len {
        return Ok(None);
    }

    src.advance(LENGTH_SIZE);
    Ok(Some(src.split_to(body_len).freeze()))
}

fn checked_body_len(length: i32) -> Result<usize, ProtocolError> {
    let length = usize::try_from(length).map_err(|_| ProtocolError::InvalidLength(length))?;
    if length < LENGTH_SIZE {
        return Err(ProtocolError::InvalidLength(length as i32));
    }
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            length,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(length - LENGTH_SIZE)
}

/// Write a tagged frame whose body is produced by `body`.
pub fn write_tagged(dst: &mut BytesMut, tag: u8, body: impl FnOnce(&mut BytesMut)) {
    dst.put_u8(tag);
    write_untagged(dst, body);
}

/// Write an untagged packet whose body is produced by `body`.
pub fn write_untagged(dst: &mut BytesMut, body: impl FnOnce(&mut BytesMut)) {
    let start = dst.len();
    dst.put_i32(0);
    body(dst);
    let length = (dst.len() - start) as i32;
    dst[start..start + LENGTH_SIZE].copy_from_slice(&length.to_be_bytes());
}

/// Write a NUL-terminated string.
pub fn write_cstring(dst: &mut impl BufMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

/// Read a NUL-terminated string.
pub fn read_cstring(src: &mut Bytes, context: &'static str) -> Result<String, ProtocolError> {
    let end = src
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProtocolError::UnterminatedString(context))?;
    let raw = src.split_to(end);
    src.advance(1);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(context))
}

/// Read a big-endian `i32`, failing cleanly on short input.
pub fn read_i32(src: &mut Bytes) -> Result<i32, ProtocolError> {
    ensure_remaining(src, 4)?;
    Ok(src.get_i32())
}

/// Fail with [`ProtocolError::IncompleteMessage`] unless `n` bytes remain.
pub fn ensure_remaining(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::IncompleteMessage {
            expected: n,
            actual: src.remaining(),
        });
    }
    Ok(())
}
