// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Grid descriptor parsing and tile-composite reconstruction.
//!
//! A grid item describes a composite image as rows x columns of equally
//! sized tiles, each an independently coded picture. The assembler places
//! tiles in row-major order into one composite buffer and finally crops the
//! visible bounds to the descriptor's declared size (tiles overshoot to the
//! right and bottom when the declared size is not a tile multiple).
//! Reconstruction is all-or-nothing: any failure aborts without a partial
//! image.

use heifgrid_wire::{PlanarImage, PlanarImageView, RemoteError};

/// Parsed `grid` item payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDescriptor {
    pub rows: u32,
    pub columns: u32,
    pub width: u32,
    pub height: u32,
}

impl GridDescriptor {
    /// Parse the fixed byte layout: version (ignored), flags, rows-1,
    /// columns-1, then width/height as 4-byte fields if flags bit0 is set,
    /// 2-byte fields otherwise.
    pub fn parse(data: &[u8]) -> Result<Self, RemoteError> {
        if data.len() < 8 {
            return Err(RemoteError::InvalidGridDescriptor(format!(
                "{} bytes, need at least 8",
                data.len()
            )));
        }
        let flags = data[1];
        let rows = u32::from(data[2]) + 1;
        let columns = u32::from(data[3]) + 1;

        let (width, height) = if flags & 1 != 0 {
            if data.len() < 12 {
                return Err(RemoteError::InvalidGridDescriptor(format!(
                    "{} bytes, need 12 with large fields",
                    data.len()
                )));
            }
            (
                u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
                u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            )
        } else {
            (
                u32::from(u16::from_be_bytes([data[4], data[5]])),
                u32::from(u16::from_be_bytes([data[6], data[7]])),
            )
        };

        Ok(Self {
            rows,
            columns,
            width,
            height,
        })
    }

    pub fn tile_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }
}

/// Assembles equally sized decoded tiles into one composite image.
#[derive(Debug)]
pub struct TileAssembler {
    grid: GridDescriptor,
    composite: Option<PlanarImage>,
    tile_width: u32,
    tile_height: u32,
    placed: usize,
}

impl TileAssembler {
    /// Validate the reference count against the descriptor before any tile
    /// is decoded.
    pub fn new(grid: GridDescriptor, reference_count: usize) -> Result<Self, RemoteError> {
        if reference_count != grid.tile_count() {
            return Err(RemoteError::GridMismatch {
                expected: grid.tile_count(),
                got: reference_count,
            });
        }
        Ok(Self {
            grid,
            composite: None,
            tile_width: 0,
            tile_height: 0,
            placed: 0,
        })
    }

    /// Composite buffer size, known once the first tile was placed.
    pub fn composite_size(&self) -> Option<(u32, u32)> {
        self.composite.as_ref().map(|c| (c.width, c.height))
    }

    /// Place the next tile (row-major order).
    ///
    /// The first tile fixes the tile dimensions and allocates the
    /// composite; every later tile must match them.
    pub fn place(&mut self, tile: &PlanarImageView<'_>) -> Result<(), RemoteError> {
        if self.composite.is_none() {
            self.tile_width = tile.width;
            self.tile_height = tile.height;
            let width = self.tile_width * self.grid.columns;
            let height = self.tile_height * self.grid.rows;
            // chroma planes are sized from the per-tile chroma dims, not
            // from the composite luma size: with odd tile dimensions each
            // tile rounds its chroma up, so rows*ceil(tile_h/2) can exceed
            // ceil(rows*tile_h/2) and placement needs the larger buffer
            let (cw, ch) = tile.subsampling.chroma_dims(self.tile_width, self.tile_height);
            let y_stride = width as usize;
            let c_stride = (cw * self.grid.columns) as usize;
            let chroma_rows = (ch * self.grid.rows) as usize;
            self.composite = Some(PlanarImage {
                y: vec![0; y_stride * height as usize],
                cb: vec![0; c_stride * chroma_rows],
                cr: vec![0; c_stride * chroma_rows],
                y_stride,
                c_stride,
                width,
                height,
                subsampling: tile.subsampling,
            });
        } else if tile.width != self.tile_width || tile.height != self.tile_height {
            return Err(RemoteError::InconsistentTileDimensions {
                want_w: self.tile_width,
                want_h: self.tile_height,
                got_w: tile.width,
                got_h: tile.height,
            });
        }

        let row = (self.placed / self.grid.columns as usize) as u32;
        let col = (self.placed % self.grid.columns as usize) as u32;
        let Some(composite) = self.composite.as_mut() else {
            return Err(RemoteError::Internal("composite not allocated".to_string()));
        };

        // luma rows
        let tw = self.tile_width as usize;
        for r in 0..self.tile_height as usize {
            let dst = (row * self.tile_height) as usize + r;
            let dst_off = dst * composite.y_stride + (col * self.tile_width) as usize;
            let src_off = r * tile.y_stride;
            composite.y[dst_off..dst_off + tw].copy_from_slice(&tile.y[src_off..src_off + tw]);
        }

        // chroma rows at the tile's own subsampling geometry
        let (cw, ch) = tile
            .subsampling
            .chroma_dims(self.tile_width, self.tile_height);
        let (cw, ch) = (cw as usize, ch as usize);
        for r in 0..ch {
            let dst = row as usize * ch + r;
            let dst_off = dst * composite.c_stride + col as usize * cw;
            let src_off = r * tile.c_stride;
            composite.cb[dst_off..dst_off + cw].copy_from_slice(&tile.cb[src_off..src_off + cw]);
            composite.cr[dst_off..dst_off + cw].copy_from_slice(&tile.cr[src_off..src_off + cw]);
        }

        self.placed += 1;
        Ok(())
    }

    /// Crop to the declared bounds and yield the composite.
    pub fn finish(self) -> Result<PlanarImage, RemoteError> {
        if self.placed != self.grid.tile_count() {
            return Err(RemoteError::GridMismatch {
                expected: self.grid.tile_count(),
                got: self.placed,
            });
        }
        let mut composite = self
            .composite
            .ok_or_else(|| RemoteError::InvalidGridDescriptor("no tiles placed".to_string()))?;

        if self.grid.width > composite.width || self.grid.height > composite.height {
            return Err(RemoteError::InvalidGridDescriptor(format!(
                "declared {}x{} exceeds composite {}x{}",
                self.grid.width, self.grid.height, composite.width, composite.height
            )));
        }
        composite.set_visible_bounds(self.grid.width, self.grid.height);
        Ok(composite)
    }
}
