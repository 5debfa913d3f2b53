// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The call/response message set.
//!
//! The protocol is strictly synchronous: the controller writes one
//! [`Request`] and reads one [`Response`]. The worker's very first outbound
//! frame is a [`Handshake`]; nothing is dispatched until the controller has
//! accepted it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::image::PlanarImage;

/// First frame a worker writes after starting up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub protocol_version: u32,
    pub cookie: String,
}

impl Handshake {
    pub fn current() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            cookie: crate::COOKIE_VALUE.to_string(),
        }
    }

    /// Whether the peer speaks our protocol and knows the shared secret.
    pub fn matches_current(&self) -> bool {
        self.protocol_version == crate::PROTOCOL_VERSION && self.cookie == crate::COOKIE_VALUE
    }
}

/// Output format for whole-file rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Jpg,
    Png,
}

impl FromStr for OutputFormat {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpg),
            "png" => Ok(OutputFormat::Png),
            other => Err(RemoteError::UnknownOutputFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpg => write!(f, "jpg"),
            OutputFormat::Png => write!(f, "png"),
        }
    }
}

/// A call from the controller to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Ping,
    NewDecoder {
        safe_mode: bool,
    },
    CloseDecoder {
        id: String,
    },
    ResetDecoder {
        id: String,
    },
    PushDecoder {
        id: String,
        data: Vec<u8>,
    },
    RenderDecoder {
        id: String,
        data: Vec<u8>,
    },
    RenderFile {
        data: Vec<u8>,
        format: OutputFormat,
        /// 0 means unbounded.
        max_file_size: u64,
        safe_mode: bool,
    },
}

/// A frame from the worker. The first frame after startup is always
/// `Handshake`; every later frame answers exactly one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Handshake(Handshake),
    Pong(String),
    DecoderCreated { id: String },
    DecoderClosed,
    DecoderReset,
    Pushed,
    Picture(PlanarImage),
    FileRendered(Vec<u8>),
    Error(RemoteError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_matches_current() {
        assert!(Handshake::current().matches_current());

        let stale = Handshake {
            protocol_version: crate::PROTOCOL_VERSION + 1,
            cookie: crate::COOKIE_VALUE.to_string(),
        };
        assert!(!stale.matches_current());

        let wrong_cookie = Handshake {
            protocol_version: crate::PROTOCOL_VERSION,
            cookie: "nope".to_string(),
        };
        assert!(!wrong_cookie.matches_current());
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpg);
        assert_eq!("JPEG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpg);
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert!(matches!(
            "webp".parse::<OutputFormat>(),
            Err(RemoteError::UnknownOutputFormat(_))
        ));
    }

    #[test]
    fn test_response_serde_round_trip() {
        let resp = Response::Error(RemoteError::GridMismatch {
            expected: 6,
            got: 4,
        });
        let bytes = rmp_serde::to_vec(&resp).unwrap();
        let back: Response = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back, resp);
    }
}
