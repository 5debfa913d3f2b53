// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Container builders for the deterministic planar engine.
//!
//! Used by this crate's tests and by integration tests driving the worker
//! binary end to end. Every generated item is decodable by
//! [`PlanarEngine`](crate::engine::planar::PlanarEngine): the config unit
//! goes into the item's configuration header, the plane payload into the
//! item data, matching how an HEVC container splits parameter sets from
//! coded samples.

use heifgrid_wire::Subsampling;

use crate::container::memory::{MemoryContainer, MemoryItem};
use crate::container::{ITEM_TYPE_GRID, ITEM_TYPE_HVC1};
use crate::engine::planar::{config_unit, data_unit, frame_nal_units, synth_planes};

/// One coded item with a synthesized payload. `seed` varies the pixel
/// pattern so tiles are distinguishable.
pub fn coded_item(id: u32, sub: Subsampling, width: u32, height: u32, seed: u8) -> MemoryItem {
    MemoryItem {
        id,
        item_type: ITEM_TYPE_HVC1.to_string(),
        extents: Some((width, height)),
        config_header: Some(frame_nal_units([config_unit(sub, width, height)])),
        data: frame_nal_units([data_unit(&synth_planes(sub, width, height, seed))]),
        derived_refs: vec![],
    }
}

/// A container whose primary item is a single coded picture.
pub fn single_item_container(sub: Subsampling, width: u32, height: u32) -> MemoryContainer {
    MemoryContainer {
        primary: 1,
        items: vec![coded_item(1, sub, width, height, 1)],
    }
}

/// Raw `grid` item payload bytes for the given geometry. Uses the 4-byte
/// field layout when either declared dimension exceeds `u16::MAX`.
pub fn grid_descriptor_bytes(rows: u32, columns: u32, width: u32, height: u32) -> Vec<u8> {
    let large = width > u32::from(u16::MAX) || height > u32::from(u16::MAX);
    let mut data = vec![0, u8::from(large), (rows - 1) as u8, (columns - 1) as u8];
    if large {
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
    } else {
        data.extend_from_slice(&(width as u16).to_be_bytes());
        data.extend_from_slice(&(height as u16).to_be_bytes());
    }
    data
}

/// A container whose primary item is a `rows` x `columns` grid of 4:2:0
/// tiles, each `tile_width` x `tile_height`, declared at `width` x `height`.
pub fn grid_container(
    rows: u32,
    columns: u32,
    tile_width: u32,
    tile_height: u32,
    width: u32,
    height: u32,
) -> MemoryContainer {
    let grid_id = 1;
    let mut items = Vec::new();
    let mut derived_refs = Vec::new();
    for i in 0..rows * columns {
        let id = grid_id + 1 + i;
        items.push(coded_item(
            id,
            Subsampling::C420,
            tile_width,
            tile_height,
            i as u8,
        ));
        derived_refs.push(id);
    }
    items.insert(
        0,
        MemoryItem {
            id: grid_id,
            item_type: ITEM_TYPE_GRID.to_string(),
            extents: Some((width, height)),
            config_header: None,
            data: grid_descriptor_bytes(rows, columns, width, height),
            derived_refs,
        },
    );
    MemoryContainer {
        primary: grid_id,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridDescriptor;

    #[test]
    fn test_descriptor_bytes_round_trip() {
        let grid = GridDescriptor::parse(&grid_descriptor_bytes(3, 4, 1596, 1064)).unwrap();
        assert_eq!((grid.rows, grid.columns), (3, 4));
        assert_eq!((grid.width, grid.height), (1596, 1064));

        let grid = GridDescriptor::parse(&grid_descriptor_bytes(1, 2, 70000, 64)).unwrap();
        assert_eq!((grid.width, grid.height), (70000, 64));
    }

    #[test]
    fn test_grid_container_shape() {
        let container = grid_container(2, 3, 8, 8, 20, 14);
        assert_eq!(container.items.len(), 7);
        assert_eq!(container.items[0].derived_refs.len(), 6);
        assert_eq!(container.items[0].item_type, ITEM_TYPE_GRID);
    }
}
