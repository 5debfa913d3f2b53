// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-stream decoder session state machine.
//!
//! A session owns one engine context and moves Open -> HasPendingPicture ->
//! (reset) -> Open -> (close) Closed. Picture release is lazy: a decoded
//! picture stays in the engine until the next `reset`, exactly like the
//! native decoder's release-next-picture discipline.
//!
//! Plane access is generation-checked. Every call that can invalidate
//! engine plane memory (`push`, `decode_image`, `reset`) bumps the session
//! generation; a [`PictureRef`] minted by an earlier `decode_image` then
//! stops resolving and yields `RemoteError::StalePicture` instead of stale
//! bytes. Safe-mode consumers take `snapshot()` (an owned copy that
//! survives anything); unsafe-mode consumers read through `picture()` and
//! must finish before the next call on the same session.

use heifgrid_wire::{PlanarImage, PlanarImageView, RemoteError};

use crate::engine::DecodeEngine;

/// A generation-tagged handle to the session's undrained picture.
#[derive(Debug, Clone, Copy)]
pub struct PictureRef {
    generation: u64,
}

pub struct DecoderSession {
    engine: Box<dyn DecodeEngine>,
    safe_mode: bool,
    pending_picture: bool,
    generation: u64,
}

impl DecoderSession {
    pub fn new(engine: Box<dyn DecodeEngine>, safe_mode: bool) -> Self {
        Self {
            engine,
            safe_mode,
            pending_picture: false,
            generation: 0,
        }
    }

    pub fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    pub fn has_pending_picture(&self) -> bool {
        self.pending_picture
    }

    /// Parse `data` as length-prefixed NAL units and feed them to the engine.
    ///
    /// Fails on the first malformed unit; units before it stay fed (the
    /// prescribed recovery is `reset`).
    pub fn push(&mut self, data: &[u8]) -> Result<(), RemoteError> {
        self.generation += 1;
        self.feed_units(data)
    }

    fn feed_units(&mut self, data: &[u8]) -> Result<(), RemoteError> {
        let mut pos = 0;
        while pos < data.len() {
            if pos + 4 > data.len() {
                return Err(RemoteError::InvalidNalFraming {
                    offset: pos,
                    reason: "truncated length prefix".to_string(),
                });
            }
            let len =
                u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
                    as usize;
            if pos + 4 + len > data.len() {
                return Err(RemoteError::InvalidNalFraming {
                    offset: pos,
                    reason: format!(
                        "unit length {} exceeds remaining {} bytes",
                        len,
                        data.len() - pos - 4
                    ),
                });
            }
            pos += 4;
            self.engine
                .push_nal(&data[pos..pos + len])
                .map_err(|e| RemoteError::DecodeEngine(e.to_string()))?;
            pos += len;
        }
        Ok(())
    }

    /// Push `data` (if non-empty), flush, and run decode steps until the
    /// engine yields a picture or runs out of work.
    pub fn decode_image(&mut self, data: &[u8]) -> Result<PictureRef, RemoteError> {
        if self.pending_picture {
            // Caller error: the previous picture was never drained and its
            // engine resources may leak.
            tracing::warn!("decode requested over an undrained picture");
        }
        self.generation += 1;

        if !data.is_empty() {
            self.feed_units(data)?;
        }

        self.engine
            .flush()
            .map_err(|e| RemoteError::DecodeEngine(e.to_string()))?;

        let mut more = true;
        while more {
            more = self
                .engine
                .decode_step()
                .map_err(|e| RemoteError::DecodeEngine(e.to_string()))?;

            for warning in self.engine.drain_warnings() {
                tracing::warn!("decode engine warning: {warning}");
            }

            if self.engine.pending_picture().is_some() {
                self.pending_picture = true;
                return Ok(PictureRef {
                    generation: self.generation,
                });
            }
        }

        Err(RemoteError::NoPictureProduced)
    }

    /// Resolve a picture handle into a borrowed view over engine memory.
    pub fn picture(&self, picture: PictureRef) -> Result<PlanarImageView<'_>, RemoteError> {
        if picture.generation != self.generation || !self.pending_picture {
            return Err(RemoteError::StalePicture);
        }
        self.engine
            .pending_picture()
            .ok_or(RemoteError::StalePicture)
    }

    /// Resolve a picture handle into an independently owned copy.
    pub fn snapshot(&self, picture: PictureRef) -> Result<PlanarImage, RemoteError> {
        Ok(self.picture(picture)?.to_owned_image())
    }

    /// Release any pending picture and reset engine stream state.
    pub fn reset(&mut self) {
        if self.pending_picture {
            self.engine.release_picture();
            self.pending_picture = false;
        }
        self.engine.reset();
        self.generation += 1;
    }

    /// Terminal: release everything and drop the engine context.
    pub fn close(mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use heifgrid_wire::Subsampling;

    use super::*;
    use crate::engine::planar::{
        config_unit, data_unit, frame_nal_units, synth_planes, PlanarEngine,
    };

    fn session(safe_mode: bool) -> DecoderSession {
        DecoderSession::new(Box::new(PlanarEngine::new()), safe_mode)
    }

    fn picture_stream(sub: Subsampling, w: u32, h: u32, seed: u8) -> Vec<u8> {
        frame_nal_units([
            config_unit(sub, w, h),
            data_unit(&synth_planes(sub, w, h, seed)),
        ])
    }

    #[test]
    fn test_decode_plane_geometry() {
        let mut s = session(true);
        s.push(&picture_stream(Subsampling::C420, 12, 10, 1)).unwrap();
        let r = s.decode_image(&[]).unwrap();

        let img = s.snapshot(r).unwrap();
        assert_eq!((img.width, img.height), (12, 10));
        assert_eq!(img.y.len(), img.y_stride * 10);
        let chroma_height = img.chroma_height() as usize;
        assert_eq!(chroma_height, 5);
        assert_eq!(img.cb.len(), img.c_stride * chroma_height);
        assert_eq!(img.cr.len(), img.c_stride * chroma_height);
        assert!(s.has_pending_picture());
    }

    #[test]
    fn test_decode_pushes_inline_data() {
        let mut s = session(true);
        let r = s
            .decode_image(&picture_stream(Subsampling::C444, 4, 4, 7))
            .unwrap();
        assert!(s.picture(r).is_ok());
    }

    #[test]
    fn test_truncated_prefix_is_invalid_framing() {
        let mut s = session(true);
        let mut data = picture_stream(Subsampling::C420, 8, 8, 0);
        data.extend_from_slice(&[0, 0]); // half a length prefix

        let err = s.push(&data).unwrap_err();
        assert!(matches!(err, RemoteError::InvalidNalFraming { .. }));
    }

    #[test]
    fn test_overlong_unit_is_invalid_framing() {
        let mut s = session(true);
        let mut data = frame_nal_units([config_unit(Subsampling::C420, 8, 8)]);
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3]); // 100 promised, 3 present

        let err = s.push(&data).unwrap_err();
        match err {
            RemoteError::InvalidNalFraming { offset, .. } => {
                // the config unit before the malformed one was consumed
                assert_eq!(offset, 4 + 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_session_recovers_after_reset() {
        let mut s = session(true);
        let err = s.push(&[0, 0]).unwrap_err();
        assert!(matches!(err, RemoteError::InvalidNalFraming { .. }));

        s.reset();
        s.push(&picture_stream(Subsampling::C420, 8, 8, 3)).unwrap();
        assert!(s.decode_image(&[]).is_ok());
    }

    #[test]
    fn test_no_picture_produced() {
        let mut s = session(true);
        let err = s.decode_image(&[]).unwrap_err();
        assert!(matches!(err, RemoteError::NoPictureProduced));
    }

    #[test]
    fn test_stale_ref_after_reset() {
        let mut s = session(false);
        let r = s
            .decode_image(&picture_stream(Subsampling::C420, 8, 8, 2))
            .unwrap();
        assert!(s.picture(r).is_ok());

        s.reset();
        assert!(matches!(s.picture(r), Err(RemoteError::StalePicture)));
    }

    #[test]
    fn test_stale_ref_after_push() {
        let mut s = session(false);
        let r = s
            .decode_image(&picture_stream(Subsampling::C420, 8, 8, 2))
            .unwrap();

        s.push(&frame_nal_units([config_unit(Subsampling::C420, 4, 4)]))
            .unwrap();
        assert!(matches!(s.picture(r), Err(RemoteError::StalePicture)));
    }

    #[test]
    fn test_snapshot_survives_reset() {
        let mut s = session(true);
        let r = s
            .decode_image(&picture_stream(Subsampling::C422, 6, 4, 5))
            .unwrap();
        let img = s.snapshot(r).unwrap();
        let before = img.clone();

        s.reset();
        assert_eq!(img, before);
        // row 0 still carries the synthesized payload
        let planes = synth_planes(Subsampling::C422, 6, 4, 5);
        assert_eq!(&img.y[..6], &planes[..6]);
    }
}
