// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Planar YCbCr image payloads.
//!
//! [`PlanarImage`] owns its plane buffers and is what travels over the wire.
//! [`PlanarImageView`] borrows planes (typically straight out of decode
//! engine memory) and is what the worker-internal zero-copy paths hand
//! around. Visible bounds may be smaller than the stride-implied buffer
//! bounds; grid reconstruction relies on that for the final crop.

use serde::{Deserialize, Serialize};

/// Chroma subsampling of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subsampling {
    /// 4:2:0 — chroma halved in both dimensions.
    C420,
    /// 4:2:2 — chroma halved horizontally.
    C422,
    /// 4:4:4 — full-resolution chroma.
    C444,
}

impl Subsampling {
    /// Chroma plane dimensions for a luma plane of `width` x `height`.
    ///
    /// Odd luma dimensions round up, matching how decoders allocate the
    /// trailing half-sample row/column.
    pub fn chroma_dims(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Subsampling::C420 => (width.div_ceil(2), height.div_ceil(2)),
            Subsampling::C422 => (width.div_ceil(2), height),
            Subsampling::C444 => (width, height),
        }
    }
}

/// An owned planar YCbCr image.
///
/// Plane buffers are sized by stride, not by visible width: row `r` of luma
/// occupies `y[r * y_stride .. r * y_stride + width]` and the bytes beyond
/// `width` are padding. `width`/`height` are the visible bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanarImage {
    pub y: Vec<u8>,
    pub cb: Vec<u8>,
    pub cr: Vec<u8>,
    pub y_stride: usize,
    pub c_stride: usize,
    pub width: u32,
    pub height: u32,
    pub subsampling: Subsampling,
}

impl PlanarImage {
    /// Allocate a zeroed image with tight strides.
    pub fn alloc(width: u32, height: u32, subsampling: Subsampling) -> Self {
        let (cw, ch) = subsampling.chroma_dims(width, height);
        let y_stride = width as usize;
        let c_stride = cw as usize;
        Self {
            y: vec![0; y_stride * height as usize],
            cb: vec![0; c_stride * ch as usize],
            cr: vec![0; c_stride * ch as usize],
            y_stride,
            c_stride,
            width,
            height,
            subsampling,
        }
    }

    /// Number of chroma rows covering the visible bounds.
    pub fn chroma_height(&self) -> u32 {
        self.subsampling.chroma_dims(self.width, self.height).1
    }

    /// Number of chroma columns covering the visible bounds.
    pub fn chroma_width(&self) -> u32 {
        self.subsampling.chroma_dims(self.width, self.height).0
    }

    /// Shrink the visible bounds without touching the plane buffers.
    ///
    /// Callers must have validated `width <= self.width` and
    /// `height <= self.height`; the buffers keep their allocated rows.
    pub fn set_visible_bounds(&mut self, width: u32, height: u32) {
        debug_assert!(width <= self.width && height <= self.height);
        self.width = width;
        self.height = height;
    }

    /// Borrow the planes as a view.
    pub fn as_view(&self) -> PlanarImageView<'_> {
        PlanarImageView {
            y: &self.y,
            cb: &self.cb,
            cr: &self.cr,
            y_stride: self.y_stride,
            c_stride: self.c_stride,
            width: self.width,
            height: self.height,
            chroma_height: (self.cb.len() / self.c_stride.max(1)) as u32,
            subsampling: self.subsampling,
        }
    }
}

/// A borrowed planar YCbCr picture.
///
/// `chroma_height` is carried explicitly rather than derived because engine
/// buffers may hold more padding rows than the subsampling implies.
#[derive(Debug, Clone, Copy)]
pub struct PlanarImageView<'a> {
    pub y: &'a [u8],
    pub cb: &'a [u8],
    pub cr: &'a [u8],
    pub y_stride: usize,
    pub c_stride: usize,
    pub width: u32,
    pub height: u32,
    pub chroma_height: u32,
    pub subsampling: Subsampling,
}

impl PlanarImageView<'_> {
    /// Copy the planes into an owned [`PlanarImage`], preserving strides.
    pub fn to_owned_image(&self) -> PlanarImage {
        PlanarImage {
            y: self.y.to_vec(),
            cb: self.cb.to_vec(),
            cr: self.cr.to_vec(),
            y_stride: self.y_stride,
            c_stride: self.c_stride,
            width: self.width,
            height: self.height,
            subsampling: self.subsampling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chroma_dims_per_ratio() {
        assert_eq!(Subsampling::C420.chroma_dims(8, 6), (4, 3));
        assert_eq!(Subsampling::C422.chroma_dims(8, 6), (4, 6));
        assert_eq!(Subsampling::C444.chroma_dims(8, 6), (8, 6));
        // odd dimensions round up
        assert_eq!(Subsampling::C420.chroma_dims(9, 5), (5, 3));
    }

    #[test]
    fn test_alloc_plane_lengths() {
        let img = PlanarImage::alloc(16, 10, Subsampling::C420);
        assert_eq!(img.y.len(), img.y_stride * 10);
        assert_eq!(img.cb.len(), img.c_stride * 5);
        assert_eq!(img.cr.len(), img.c_stride * 5);
    }

    #[test]
    fn test_crop_keeps_buffers() {
        let mut img = PlanarImage::alloc(16, 10, Subsampling::C420);
        let y_len = img.y.len();
        img.set_visible_bounds(12, 8);
        assert_eq!((img.width, img.height), (12, 8));
        assert_eq!(img.y.len(), y_len);
    }

    #[test]
    fn test_view_round_trip() {
        let mut img = PlanarImage::alloc(4, 2, Subsampling::C444);
        img.y[0] = 0xAB;
        img.cb[3] = 0x17;
        let copy = img.as_view().to_owned_image();
        assert_eq!(copy, img);
    }
}
