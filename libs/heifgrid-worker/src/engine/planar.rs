// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Deterministic built-in engine for a tagged planar payload format.
//!
//! Unit layout (after NAL de-framing):
//!
//! - config unit: `[0x01, subsampling, width: u32 BE, height: u32 BE]`
//! - data unit:   `[0x02, plane bytes...]` — tightly packed Y then Cb then
//!   Cr at the configured dimensions, possibly split across units
//!
//! Decoded pictures are re-strided into 32-byte-aligned buffers, so callers
//! hit the stride != width paths the native engine produces. The encoding
//! helpers at the bottom are the fixture vocabulary of the test suite.

use heifgrid_wire::{PlanarImageView, Subsampling};

use super::{DecodeEngine, EngineError};

const TAG_CONFIG: u8 = 0x01;
const TAG_DATA: u8 = 0x02;

const fn align32(n: usize) -> usize {
    (n + 31) & !31
}

struct Picture {
    y: Vec<u8>,
    cb: Vec<u8>,
    cr: Vec<u8>,
    y_stride: usize,
    c_stride: usize,
    width: u32,
    height: u32,
    chroma_height: u32,
    subsampling: Subsampling,
}

impl Picture {
    fn view(&self) -> PlanarImageView<'_> {
        PlanarImageView {
            y: &self.y,
            cb: &self.cb,
            cr: &self.cr,
            y_stride: self.y_stride,
            c_stride: self.c_stride,
            width: self.width,
            height: self.height,
            chroma_height: self.chroma_height,
            subsampling: self.subsampling,
        }
    }
}

/// Engine decoding the tagged planar format.
#[derive(Default)]
pub struct PlanarEngine {
    config: Option<(Subsampling, u32, u32)>,
    payload: Vec<u8>,
    flushed: bool,
    pending: Option<Picture>,
    warnings: Vec<String>,
}

impl PlanarEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn expected_payload(&self) -> Option<usize> {
        let (sub, w, h) = self.config?;
        let (cw, ch) = sub.chroma_dims(w, h);
        Some((w * h + 2 * cw * ch) as usize)
    }

    fn build_picture(&mut self) {
        let (sub, w, h) = match self.config {
            Some(c) => c,
            None => return,
        };
        let expected = self
            .expected_payload()
            .filter(|&n| self.payload.len() >= n);
        let Some(expected) = expected else { return };

        if self.payload.len() > expected {
            self.warnings.push(format!(
                "payload has {} trailing bytes past the configured picture",
                self.payload.len() - expected
            ));
        }

        let (cw, ch) = sub.chroma_dims(w, h);
        let y_stride = align32(w as usize);
        let c_stride = align32(cw as usize);

        let mut y = vec![0; y_stride * h as usize];
        let mut cb = vec![0; c_stride * ch as usize];
        let mut cr = vec![0; c_stride * ch as usize];

        let mut src = 0;
        for row in 0..h as usize {
            y[row * y_stride..row * y_stride + w as usize]
                .copy_from_slice(&self.payload[src..src + w as usize]);
            src += w as usize;
        }
        for plane in [&mut cb, &mut cr] {
            for row in 0..ch as usize {
                plane[row * c_stride..row * c_stride + cw as usize]
                    .copy_from_slice(&self.payload[src..src + cw as usize]);
                src += cw as usize;
            }
        }

        self.payload.clear();
        self.flushed = false;
        self.pending = Some(Picture {
            y,
            cb,
            cr,
            y_stride,
            c_stride,
            width: w,
            height: h,
            chroma_height: ch,
            subsampling: sub,
        });
    }
}

impl DecodeEngine for PlanarEngine {
    fn push_nal(&mut self, nal: &[u8]) -> Result<(), EngineError> {
        match nal.first() {
            Some(&TAG_CONFIG) => {
                if nal.len() != 10 {
                    return Err(EngineError(format!(
                        "config unit is {} bytes, expected 10",
                        nal.len()
                    )));
                }
                let sub = match nal[1] {
                    0 => Subsampling::C420,
                    1 => Subsampling::C422,
                    2 => Subsampling::C444,
                    other => {
                        return Err(EngineError(format!("unknown subsampling code {other}")));
                    }
                };
                let w = u32::from_be_bytes([nal[2], nal[3], nal[4], nal[5]]);
                let h = u32::from_be_bytes([nal[6], nal[7], nal[8], nal[9]]);
                if w == 0 || h == 0 {
                    return Err(EngineError(format!("degenerate picture size {w}x{h}")));
                }
                self.config = Some((sub, w, h));
                Ok(())
            }
            Some(&TAG_DATA) => {
                self.payload.extend_from_slice(&nal[1..]);
                Ok(())
            }
            Some(&tag) => {
                self.warnings.push(format!("ignoring unit with tag {tag:#04x}"));
                Ok(())
            }
            None => Err(EngineError("empty coded unit".to_string())),
        }
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        self.flushed = true;
        Ok(())
    }

    fn decode_step(&mut self) -> Result<bool, EngineError> {
        if self.pending.is_some() {
            return Ok(false);
        }
        if self.flushed {
            self.build_picture();
        }
        Ok(self.pending.is_some())
    }

    fn drain_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn pending_picture(&self) -> Option<PlanarImageView<'_>> {
        self.pending.as_ref().map(Picture::view)
    }

    fn release_picture(&mut self) {
        self.pending = None;
    }

    fn reset(&mut self) {
        self.pending = None;
        self.config = None;
        self.payload.clear();
        self.flushed = false;
        self.warnings.clear();
    }
}

// ---------------------------------------------------------------------------
// Fixture vocabulary: encoders for the format this engine decodes.
// ---------------------------------------------------------------------------

fn subsampling_code(sub: Subsampling) -> u8 {
    match sub {
        Subsampling::C420 => 0,
        Subsampling::C422 => 1,
        Subsampling::C444 => 2,
    }
}

/// Encode a config unit for a picture of the given geometry.
pub fn config_unit(sub: Subsampling, width: u32, height: u32) -> Vec<u8> {
    let mut unit = Vec::with_capacity(10);
    unit.push(TAG_CONFIG);
    unit.push(subsampling_code(sub));
    unit.extend_from_slice(&width.to_be_bytes());
    unit.extend_from_slice(&height.to_be_bytes());
    unit
}

/// Encode a data unit carrying (part of) a tightly packed plane payload.
pub fn data_unit(payload: &[u8]) -> Vec<u8> {
    let mut unit = Vec::with_capacity(payload.len() + 1);
    unit.push(TAG_DATA);
    unit.extend_from_slice(payload);
    unit
}

/// Wrap units in the 4-byte big-endian length framing the sessions parse.
pub fn frame_nal_units<I, U>(units: I) -> Vec<u8>
where
    I: IntoIterator<Item = U>,
    U: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for unit in units {
        let unit = unit.as_ref();
        out.extend_from_slice(&(unit.len() as u32).to_be_bytes());
        out.extend_from_slice(unit);
    }
    out
}

/// Deterministic tightly packed planes for a picture of the given geometry.
///
/// `seed` varies the pattern so grid tiles are distinguishable.
pub fn synth_planes(sub: Subsampling, width: u32, height: u32, seed: u8) -> Vec<u8> {
    let (cw, ch) = sub.chroma_dims(width, height);
    let total = (width * height + 2 * cw * ch) as usize;
    (0..total)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(engine: &mut PlanarEngine) -> bool {
        engine.flush().unwrap();
        let mut more = true;
        while more {
            more = engine.decode_step().unwrap();
            if engine.pending_picture().is_some() {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_decode_restrides_planes() {
        let mut engine = PlanarEngine::new();
        engine
            .push_nal(&config_unit(Subsampling::C420, 12, 6))
            .unwrap();
        let planes = synth_planes(Subsampling::C420, 12, 6, 0);
        engine.push_nal(&data_unit(&planes)).unwrap();

        assert!(decode_one(&mut engine));
        let pic = engine.pending_picture().unwrap();
        assert_eq!((pic.width, pic.height), (12, 6));
        assert_eq!(pic.y_stride, 32);
        assert_eq!(pic.c_stride, 32);
        assert_eq!(pic.y.len(), pic.y_stride * 6);
        assert_eq!(pic.chroma_height, 3);
        // row 1 of luma starts at the stride boundary, not at width
        assert_eq!(pic.y[pic.y_stride], planes[12]);
    }

    #[test]
    fn test_split_data_units() {
        let mut engine = PlanarEngine::new();
        engine
            .push_nal(&config_unit(Subsampling::C444, 4, 4))
            .unwrap();
        let planes = synth_planes(Subsampling::C444, 4, 4, 9);
        let (a, b) = planes.split_at(planes.len() / 2);
        engine.push_nal(&data_unit(a)).unwrap();
        engine.push_nal(&data_unit(b)).unwrap();

        assert!(decode_one(&mut engine));
    }

    #[test]
    fn test_no_picture_without_full_payload() {
        let mut engine = PlanarEngine::new();
        engine
            .push_nal(&config_unit(Subsampling::C420, 8, 8))
            .unwrap();
        engine.push_nal(&data_unit(&[0u8; 4])).unwrap();

        assert!(!decode_one(&mut engine));
    }

    #[test]
    fn test_trailing_bytes_warn() {
        let mut engine = PlanarEngine::new();
        engine
            .push_nal(&config_unit(Subsampling::C444, 2, 2))
            .unwrap();
        let mut planes = synth_planes(Subsampling::C444, 2, 2, 0);
        planes.push(0xFF);
        engine.push_nal(&data_unit(&planes)).unwrap();

        assert!(decode_one(&mut engine));
        let warnings = engine.drain_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("trailing"));
    }

    #[test]
    fn test_unknown_tag_warns_but_succeeds() {
        let mut engine = PlanarEngine::new();
        engine.push_nal(&[0x7F, 1, 2, 3]).unwrap();
        assert_eq!(engine.drain_warnings().len(), 1);
    }

    #[test]
    fn test_reset_clears_stream_state() {
        let mut engine = PlanarEngine::new();
        engine
            .push_nal(&config_unit(Subsampling::C420, 8, 8))
            .unwrap();
        engine
            .push_nal(&data_unit(&synth_planes(Subsampling::C420, 8, 8, 0)))
            .unwrap();
        assert!(decode_one(&mut engine));

        engine.reset();
        assert!(engine.pending_picture().is_none());
        // config was cleared too: same payload alone no longer decodes
        engine
            .push_nal(&data_unit(&synth_planes(Subsampling::C420, 8, 8, 0)))
            .unwrap();
        assert!(!decode_one(&mut engine));
    }
}
