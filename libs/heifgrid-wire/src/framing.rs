// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Length-prefixed MessagePack framing.
//!
//! Every frame is a 2-byte magic (`b"HG"`, for stream synchronization), a
//! 4-byte big-endian payload length, and an `rmp-serde` payload. No partial
//! reads and no buffer management in the callers; a short read mid-frame is
//! a hard transport error, not a retry.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

const MAGIC: [u8; 2] = *b"HG";

/// Frames larger than this are rejected before allocation. Generous enough
/// for a full 8K 4:4:4 picture plus envelope.
pub const MAX_PAYLOAD: u32 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("wire i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad frame magic {0:02x?}")]
    BadMagic([u8; 2]),

    #[error("frame payload of {0} bytes exceeds the maximum")]
    Oversize(u32),

    #[error("frame encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("frame decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Write one framed message and flush it.
pub fn write_frame<W: Write, T: Serialize>(w: &mut W, msg: &T) -> Result<(), WireError> {
    let payload = rmp_serde::to_vec(msg)?;
    let len = u32::try_from(payload.len()).map_err(|_| WireError::Oversize(u32::MAX))?;
    if len > MAX_PAYLOAD {
        return Err(WireError::Oversize(len));
    }
    w.write_all(&MAGIC)?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(&payload)?;
    w.flush()?;
    Ok(())
}

/// Read one framed message, blocking until it is complete.
pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> Result<T, WireError> {
    let mut magic = [0u8; 2];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(WireError::BadMagic(magic));
    }
    let mut len_bytes = [0u8; 4];
    r.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_PAYLOAD {
        return Err(WireError::Oversize(len));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    Ok(rmp_serde::from_slice(&payload)?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::messages::Request;

    #[test]
    fn test_frame_round_trip() {
        let mut buf = Vec::new();
        let req = Request::PushDecoder {
            id: "abc".into(),
            data: vec![1, 2, 3],
        };
        write_frame(&mut buf, &req).unwrap();

        let got: Request = read_frame(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(got, req);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::Ping).unwrap();
        buf[0] = b'X';

        let err = read_frame::<_, Request>(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, WireError::BadMagic(_)));
    }

    #[test]
    fn test_truncated_frame_is_io_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::Ping).unwrap();
        buf.truncate(buf.len() - 1);

        let err = read_frame::<_, Request>(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, WireError::Io(_)));
    }

    #[test]
    fn test_oversize_header_rejected_before_alloc() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"HG");
        buf.extend_from_slice(&(MAX_PAYLOAD + 1).to_be_bytes());

        let err = read_frame::<_, Request>(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, WireError::Oversize(_)));
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::Ping).unwrap();
        write_frame(&mut buf, &Request::ResetDecoder { id: "s".into() }).unwrap();

        let mut cursor = Cursor::new(&buf);
        let first: Request = read_frame(&mut cursor).unwrap();
        let second: Request = read_frame(&mut cursor).unwrap();
        assert_eq!(first, Request::Ping);
        assert_eq!(second, Request::ResetDecoder { id: "s".into() });
    }
}
