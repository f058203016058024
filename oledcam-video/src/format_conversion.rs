//! YUV 4:2:0 to RGB565 colourspace conversion
//!
//! Fixed-point BT.601 limited-range transform. Each output pixel takes its
//! chroma from the nearest preceding sample `(row/2, col/2)`; there is no
//! interpolation. Rows are independent, so the frame pass can be split
//! across threads without changing a single output bit.

use crate::error::VideoError;
use crate::types::{DisplayBuffer, Frame};

/// Rows per rayon task; one row of a 128-wide panel is too little work
const PARALLEL_ROW_CHUNK: usize = 8;

#[inline(always)]
fn clamp8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert one YUV sample triplet to 8-bit RGB
#[inline(always)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = clamp8((298 * c + 409 * e + 128) >> 8);
    let g = clamp8((298 * c - 100 * d - 208 * e + 128) >> 8);
    let b = clamp8((298 * c + 516 * d + 128) >> 8);
    (r, g, b)
}

/// Pack 8-bit RGB into 5-6-5
#[inline(always)]
pub fn pack_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

#[inline(always)]
pub fn yuv_to_rgb565(y: u8, u: u8, v: u8) -> u16 {
    let (r, g, b) = yuv_to_rgb(y, u, v);
    pack_rgb565(r, g, b)
}

/// Convert a whole frame into a display buffer
///
/// Dispatches to the row-parallel path when `parallel` is set. Both paths
/// write every pixel of `out`.
pub fn convert_frame(
    frame: &Frame<'_>,
    out: &mut DisplayBuffer,
    parallel: bool,
) -> Result<(), VideoError> {
    let fg = frame.geometry();
    let bg = out.geometry();
    if fg != bg {
        return Err(VideoError::GeometryMismatch {
            frame_w: fg.width(),
            frame_h: fg.height(),
            buf_w: bg.width(),
            buf_h: bg.height(),
        });
    }

    if parallel {
        convert_frame_parallel(frame, out.as_bytes_mut());
    } else {
        convert_frame_scalar(frame, out.as_bytes_mut());
    }
    Ok(())
}

/// Convert one output row; `row_out` is `width * 2` bytes
#[inline(always)]
fn convert_row(frame: &Frame<'_>, row: usize, row_out: &mut [u8]) {
    let width = frame.geometry().width() as usize;
    let uv_width = width / 2;

    let y_row = &frame.y_plane()[row * width..(row + 1) * width];
    let uv_start = (row / 2) * uv_width;
    let u_row = &frame.u_plane()[uv_start..uv_start + uv_width];
    let v_row = &frame.v_plane()[uv_start..uv_start + uv_width];

    for (col, (px, &y)) in row_out.chunks_exact_mut(2).zip(y_row).enumerate() {
        let color = yuv_to_rgb565(y, u_row[col / 2], v_row[col / 2]);
        px.copy_from_slice(&color.to_be_bytes());
    }
}

/// Scalar implementation (portable, single thread)
fn convert_frame_scalar(frame: &Frame<'_>, out: &mut [u8]) {
    let row_bytes = frame.geometry().width() as usize * 2;
    for (row, row_out) in out.chunks_exact_mut(row_bytes).enumerate() {
        convert_row(frame, row, row_out);
    }
}

/// Row-parallel implementation; rows are disjoint output slices
fn convert_frame_parallel(frame: &Frame<'_>, out: &mut [u8]) {
    use rayon::prelude::*;

    let row_bytes = frame.geometry().width() as usize * 2;
    out.par_chunks_mut(row_bytes * PARALLEL_ROW_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let first_row = chunk_idx * PARALLEL_ROW_CHUNK;
            for (i, row_out) in chunk.chunks_exact_mut(row_bytes).enumerate() {
                convert_row(frame, first_row + i, row_out);
            }
        });
}
