// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Whole-file rendering: container in, encoded JPEG/PNG out.
//!
//! Drives one worker-local decoder session over the container's primary
//! item — directly for a coded picture, through the tile assembler for a
//! grid — then converts the planar result to RGB and encodes it. JPEG
//! output steps the quality down until the result fits the requested
//! maximum file size; at the floor quality it fails with `OutputTooLarge`
//! and returns no partial bytes.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};

use heifgrid_wire::{OutputFormat, PlanarImage, RemoteError, Subsampling};

use crate::container::{
    Container, ContainerItem, ContainerOpener, ITEM_TYPE_GRID, ITEM_TYPE_HVC1, REF_DERIVED_IMAGE,
};
use crate::engine::default_engine;
use crate::grid::{GridDescriptor, TileAssembler};
use crate::session::{DecoderSession, PictureRef};

const JPEG_START_QUALITY: u8 = 95;
const JPEG_QUALITY_STEP: u8 = 10;
const JPEG_QUALITY_FLOOR: u8 = 45;

/// Decode a container's primary item and encode it as `format`.
///
/// `max_file_size` of 0 means unbounded. `safe_mode` selects the session's
/// plane policy for the tile loop (owned snapshots vs direct engine reads).
pub fn render_file(
    opener: &dyn ContainerOpener,
    data: &[u8],
    format: OutputFormat,
    max_file_size: u64,
    safe_mode: bool,
) -> Result<Vec<u8>, RemoteError> {
    let container = opener.open(data)?;
    let primary = container.primary_item()?;
    if primary.spatial_extents().is_none() {
        return Err(RemoteError::NoPrimaryExtents);
    }

    let engine = default_engine().map_err(|e| RemoteError::DecodeEngine(e.to_string()))?;
    let mut session = DecoderSession::new(engine, safe_mode);

    let image = match primary.item_type() {
        ITEM_TYPE_HVC1 => {
            let picture = decode_coded_item(&*container, primary, &mut session)?;
            session.snapshot(picture)?
        }
        ITEM_TYPE_GRID => render_grid(&*container, primary, &mut session)?,
        other => return Err(RemoteError::UnsupportedItemType(other.to_string())),
    };

    encode_output(&image, format, max_file_size)
}

/// Reset the session, push the item's configuration header, decode its
/// coded payload.
fn decode_coded_item(
    container: &dyn Container,
    item: &dyn ContainerItem,
    session: &mut DecoderSession,
) -> Result<PictureRef, RemoteError> {
    if item.item_type() != ITEM_TYPE_HVC1 {
        return Err(RemoteError::UnsupportedItemType(item.item_type().to_string()));
    }
    let header = item
        .hevc_config_header()
        .ok_or_else(|| RemoteError::Container("item has no decoder configuration".to_string()))?;
    let payload = container.item_data(item)?;

    session.reset();
    session.push(&header)?;
    session.decode_image(&payload)
}

fn render_grid(
    container: &dyn Container,
    item: &dyn ContainerItem,
    session: &mut DecoderSession,
) -> Result<PlanarImage, RemoteError> {
    let descriptor = GridDescriptor::parse(&container.item_data(item)?)?;
    let references = item.references(REF_DERIVED_IMAGE);
    if references.is_empty() {
        return Err(RemoteError::Container(
            "grid item has no tile references".to_string(),
        ));
    }

    let mut assembler = TileAssembler::new(descriptor, references.len())?;
    for id in references {
        let tile_item = container.item_by_id(id)?;
        let picture = decode_coded_item(container, tile_item, session)?;
        if session.safe_mode() {
            let owned = session.snapshot(picture)?;
            assembler.place(&owned.as_view())?;
        } else {
            // read straight out of engine memory; the next loop iteration's
            // reset invalidates the view, after the copy into the composite
            assembler.place(&session.picture(picture)?)?;
        }
    }
    assembler.finish()
}

/// Encode to the requested output format, honoring `max_file_size`.
pub fn encode_output(
    image: &PlanarImage,
    format: OutputFormat,
    max_file_size: u64,
) -> Result<Vec<u8>, RemoteError> {
    let rgb = to_rgb(image);
    match format {
        OutputFormat::Jpg => {
            let mut quality = JPEG_START_QUALITY;
            loop {
                let mut buf = Vec::new();
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| RemoteError::Internal(format!("jpeg encode: {e}")))?;
                if max_file_size == 0 || (buf.len() as u64) < max_file_size {
                    return Ok(buf);
                }
                quality -= JPEG_QUALITY_STEP;
                if quality <= JPEG_QUALITY_FLOOR {
                    return Err(RemoteError::OutputTooLarge);
                }
            }
        }
        OutputFormat::Png => {
            let mut buf = Vec::new();
            PngEncoder::new(&mut buf)
                .write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(|e| RemoteError::Internal(format!("png encode: {e}")))?;
            if max_file_size != 0 && (buf.len() as u64) > max_file_size {
                return Err(RemoteError::OutputTooLarge);
            }
            Ok(buf)
        }
    }
}

fn to_rgb(image: &PlanarImage) -> RgbImage {
    let mut out = RgbImage::new(image.width, image.height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let luma = image.y[y as usize * image.y_stride + x as usize];
        let (cx, cy) = chroma_sample(image.subsampling, x as usize, y as usize);
        let idx = cy * image.c_stride + cx;
        *pixel = Rgb(ycbcr_to_rgb(luma, image.cb[idx], image.cr[idx]));
    }
    out
}

fn chroma_sample(subsampling: Subsampling, x: usize, y: usize) -> (usize, usize) {
    match subsampling {
        Subsampling::C420 => (x / 2, y / 2),
        Subsampling::C422 => (x / 2, y),
        Subsampling::C444 => (x, y),
    }
}

/// Fixed-point BT.601 conversion, bit-for-bit the stdlib math of the
/// reference behavior.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let yy = i32::from(y) * 0x10101;
    let cb = i32::from(cb) - 128;
    let cr = i32::from(cr) - 128;

    let r = yy + 91881 * cr;
    let g = yy - 22554 * cb - 46802 * cr;
    let b = yy + 116130 * cb;

    [clamp16(r), clamp16(g), clamp16(b)]
}

fn clamp16(v: i32) -> u8 {
    (v >> 16).clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::memory::MemoryContainerOpener;
    use crate::fixtures;

    #[test]
    fn test_ycbcr_neutral_and_primaries() {
        assert_eq!(ycbcr_to_rgb(128, 128, 128), [128, 128, 128]);
        assert_eq!(ycbcr_to_rgb(255, 128, 128), [255, 255, 255]);
        assert_eq!(ycbcr_to_rgb(0, 128, 128), [0, 0, 0]);

        // red: Y~76 Cb~85 Cr=255
        let [r, g, b] = ycbcr_to_rgb(76, 85, 255);
        assert!(r > 250 && g < 10 && b < 10, "got {r},{g},{b}");
    }

    #[test]
    fn test_png_respects_max_file_size() {
        let image = PlanarImage::alloc(16, 16, Subsampling::C420);
        let err = encode_output(&image, OutputFormat::Png, 1).unwrap_err();
        assert_eq!(err, RemoteError::OutputTooLarge);

        assert!(encode_output(&image, OutputFormat::Png, 0).is_ok());
    }

    #[test]
    fn test_jpeg_quality_floor_gives_no_partial_output() {
        let mut image = PlanarImage::alloc(64, 64, Subsampling::C444);
        // noise compresses badly, so the floor is reached
        for (i, v) in image.y.iter_mut().enumerate() {
            *v = (i as u32).wrapping_mul(2654435761) as u8;
        }
        let err = encode_output(&image, OutputFormat::Jpg, 16).unwrap_err();
        assert_eq!(err, RemoteError::OutputTooLarge);
    }

    #[test]
    fn test_render_single_coded_item() {
        let container = fixtures::single_item_container(Subsampling::C420, 24, 18);
        let png = render_file(
            &MemoryContainerOpener,
            &container.to_bytes(),
            OutputFormat::Png,
            0,
            true,
        )
        .unwrap();

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (24, 18));
    }

    #[test]
    fn test_render_grid_crops_to_declared_bounds() {
        // 2x2 grid of 8x8 tiles, declared 14x12: pre-crop 16x16
        let container = fixtures::grid_container(2, 2, 8, 8, 14, 12);
        for safe_mode in [true, false] {
            let png = render_file(
                &MemoryContainerOpener,
                &container.to_bytes(),
                OutputFormat::Png,
                0,
                safe_mode,
            )
            .unwrap();

            let decoded = image::load_from_memory(&png).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (14, 12));
        }
    }

    #[test]
    fn test_render_grid_of_odd_sized_tiles() {
        // 2x2 grid of 5x5 4:2:0 tiles, declared 9x9
        let container = fixtures::grid_container(2, 2, 5, 5, 9, 9);
        let png = render_file(
            &MemoryContainerOpener,
            &container.to_bytes(),
            OutputFormat::Png,
            0,
            true,
        )
        .unwrap();

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (9, 9));
    }

    #[test]
    fn test_safe_and_unsafe_grid_renders_match() {
        let container = fixtures::grid_container(2, 3, 8, 8, 20, 14).to_bytes();
        let safe = render_file(
            &MemoryContainerOpener,
            &container,
            OutputFormat::Png,
            0,
            true,
        )
        .unwrap();
        let unsafe_ = render_file(
            &MemoryContainerOpener,
            &container,
            OutputFormat::Png,
            0,
            false,
        )
        .unwrap();
        assert_eq!(safe, unsafe_);
    }

    #[test]
    fn test_render_unsupported_item_type() {
        let mut container = fixtures::single_item_container(Subsampling::C420, 8, 8);
        container.items[0].item_type = "av01".to_string();
        let err = render_file(
            &MemoryContainerOpener,
            &container.to_bytes(),
            OutputFormat::Png,
            0,
            true,
        )
        .unwrap_err();
        assert_eq!(err, RemoteError::UnsupportedItemType("av01".to_string()));
    }

    #[test]
    fn test_render_requires_primary_extents() {
        let mut container = fixtures::single_item_container(Subsampling::C420, 8, 8);
        container.items[0].extents = None;
        let err = render_file(
            &MemoryContainerOpener,
            &container.to_bytes(),
            OutputFormat::Png,
            0,
            true,
        )
        .unwrap_err();
        assert_eq!(err, RemoteError::NoPrimaryExtents);
    }

    #[test]
    fn test_grid_reference_mismatch_fails_before_decoding() {
        let mut container = fixtures::grid_container(2, 2, 8, 8, 16, 16);
        let grid_idx = container
            .items
            .iter()
            .position(|i| i.item_type == ITEM_TYPE_GRID)
            .unwrap();
        container.items[grid_idx].derived_refs.pop();

        let err = render_file(
            &MemoryContainerOpener,
            &container.to_bytes(),
            OutputFormat::Png,
            0,
            true,
        )
        .unwrap_err();
        assert_eq!(err, RemoteError::GridMismatch { expected: 4, got: 3 });
    }
}
