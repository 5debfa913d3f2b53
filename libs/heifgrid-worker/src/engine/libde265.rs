// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Raw FFI binding to the native libde265 HEVC decoder.
//!
//! Only the surface the session state machine needs is declared. The
//! decoder context and picture pointers are opaque; picture plane memory
//! belongs to libde265 and is valid until the picture is released or the
//! context advances.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_void, CStr};

use heifgrid_wire::{PlanarImageView, Subsampling};

use super::{DecodeEngine, EngineError};

type de265_error = c_int;

const DE265_OK: de265_error = 0;

const DE265_CHROMA_420: c_int = 1;
const DE265_CHROMA_422: c_int = 2;
const DE265_CHROMA_444: c_int = 3;

#[link(name = "de265")]
unsafe extern "C" {
    fn de265_new_decoder() -> *mut c_void;
    fn de265_free_decoder(ctx: *mut c_void) -> de265_error;
    fn de265_reset(ctx: *mut c_void);

    fn de265_push_NAL(
        ctx: *mut c_void,
        data: *const c_void,
        length: c_int,
        pts: i64,
        user_data: *mut c_void,
    ) -> de265_error;
    fn de265_flush_data(ctx: *mut c_void) -> de265_error;
    fn de265_decode(ctx: *mut c_void, more: *mut c_int) -> de265_error;

    fn de265_get_warning(ctx: *mut c_void) -> de265_error;
    fn de265_get_error_text(err: de265_error) -> *const c_char;

    fn de265_get_next_picture(ctx: *mut c_void) -> *const c_void;
    fn de265_release_next_picture(ctx: *mut c_void);

    fn de265_get_image_width(pic: *const c_void, channel: c_int) -> c_int;
    fn de265_get_image_height(pic: *const c_void, channel: c_int) -> c_int;
    fn de265_get_image_plane(
        pic: *const c_void,
        channel: c_int,
        out_stride: *mut c_int,
    ) -> *const u8;
    fn de265_get_chroma_format(pic: *const c_void) -> c_int;
}

fn error_text(err: de265_error) -> String {
    // de265_get_error_text returns a pointer into a static table.
    let text = unsafe { de265_get_error_text(err) };
    if text.is_null() {
        return format!("libde265 error {err}");
    }
    unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
}

/// HEVC engine backed by a native libde265 decoder context.
pub struct Libde265Engine {
    ctx: *mut c_void,
    pic: *const c_void,
}

// SAFETY: the context is only ever driven from one session at a time; the
// session table serializes access.
unsafe impl Send for Libde265Engine {}

impl Libde265Engine {
    pub fn new() -> Result<Self, EngineError> {
        let ctx = unsafe { de265_new_decoder() };
        if ctx.is_null() {
            return Err(EngineError("unable to create libde265 context".to_string()));
        }
        Ok(Self {
            ctx,
            pic: std::ptr::null(),
        })
    }
}

impl DecodeEngine for Libde265Engine {
    fn push_nal(&mut self, nal: &[u8]) -> Result<(), EngineError> {
        let err = unsafe {
            de265_push_NAL(
                self.ctx,
                nal.as_ptr().cast(),
                nal.len() as c_int,
                0,
                std::ptr::null_mut(),
            )
        };
        if err != DE265_OK {
            return Err(EngineError(error_text(err)));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        let err = unsafe { de265_flush_data(self.ctx) };
        if err != DE265_OK {
            return Err(EngineError(error_text(err)));
        }
        Ok(())
    }

    fn decode_step(&mut self) -> Result<bool, EngineError> {
        let mut more: c_int = 0;
        let err = unsafe { de265_decode(self.ctx, &mut more) };
        if err != DE265_OK {
            return Err(EngineError(error_text(err)));
        }
        if self.pic.is_null() {
            self.pic = unsafe { de265_get_next_picture(self.ctx) };
        }
        Ok(more != 0)
    }

    fn drain_warnings(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        loop {
            let warning = unsafe { de265_get_warning(self.ctx) };
            if warning == DE265_OK {
                break;
            }
            warnings.push(error_text(warning));
        }
        warnings
    }

    fn pending_picture(&self) -> Option<PlanarImageView<'_>> {
        if self.pic.is_null() {
            return None;
        }

        let subsampling = match unsafe { de265_get_chroma_format(self.pic) } {
            DE265_CHROMA_420 => Subsampling::C420,
            DE265_CHROMA_422 => Subsampling::C422,
            DE265_CHROMA_444 => Subsampling::C444,
            _ => return None,
        };

        let width = unsafe { de265_get_image_width(self.pic, 0) };
        let height = unsafe { de265_get_image_height(self.pic, 0) };
        let chroma_height = unsafe { de265_get_image_height(self.pic, 1) };

        let mut y_stride: c_int = 0;
        let mut c_stride: c_int = 0;
        let y = unsafe { de265_get_image_plane(self.pic, 0, &mut y_stride) };
        let cb = unsafe { de265_get_image_plane(self.pic, 1, &mut c_stride) };
        let cr = unsafe { de265_get_image_plane(self.pic, 2, &mut c_stride) };
        if y.is_null() || cb.is_null() || cr.is_null() {
            return None;
        }

        let y_len = height as usize * y_stride as usize;
        let c_len = chroma_height as usize * c_stride as usize;

        // SAFETY: plane pointers and extents come from the engine for the
        // undrained picture; the memory stays valid until release/reset,
        // and the borrow is tied to &self.
        Some(PlanarImageView {
            y: unsafe { std::slice::from_raw_parts(y, y_len) },
            cb: unsafe { std::slice::from_raw_parts(cb, c_len) },
            cr: unsafe { std::slice::from_raw_parts(cr, c_len) },
            y_stride: y_stride as usize,
            c_stride: c_stride as usize,
            width: width as u32,
            height: height as u32,
            chroma_height: chroma_height as u32,
            subsampling,
        })
    }

    fn release_picture(&mut self) {
        if !self.pic.is_null() {
            unsafe { de265_release_next_picture(self.ctx) };
            self.pic = std::ptr::null();
        }
    }

    fn reset(&mut self) {
        self.release_picture();
        unsafe { de265_reset(self.ctx) };
    }
}

impl Drop for Libde265Engine {
    fn drop(&mut self) {
        self.release_picture();
        unsafe { de265_free_decoder(self.ctx) };
    }
}
