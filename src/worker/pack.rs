//! Plane-by-plane copy of a decoded frame into a tightly packed buffer.

use crate::engine::{DecodedFrame, Format};
use crate::error::FrameError;

struct PlaneSource<'a> {
    data: &'a [u8],
    stride: usize,
    row_size: usize,
    height: usize,
}

/// Copy every plane of `frame`, in ascending plane order, into `out`.
///
/// Only the logical bytes of each row are copied; stride padding is
/// skipped. All planes are checked before anything is written, so on error
/// `out` is left untouched. Returns the number of bytes written.
pub fn pack_frame(
    frame: &dyn DecodedFrame,
    format: &Format,
    n: i32,
    out: &mut [u8],
) -> Result<usize, FrameError> {
    let bytes_per_sample = format.bytes_per_sample as usize;

    let mut sources = Vec::with_capacity(format.num_planes as usize);
    for p in 0..format.num_planes {
        let source = PlaneSource {
            data: frame.plane_data(p),
            stride: frame.stride(p),
            row_size: frame.plane_width(p) as usize * bytes_per_sample,
            height: frame.plane_height(p) as usize,
        };

        let needed = match source.height {
            0 => 0,
            rows => (rows - 1) * source.stride + source.row_size,
        };
        if source.row_size > source.stride || source.data.len() < needed {
            return Err(FrameError::Decode {
                frame: n,
                message: format!(
                    "plane {} holds {} bytes but {} rows of {} bytes at stride {} were reported",
                    p,
                    source.data.len(),
                    source.height,
                    source.row_size,
                    source.stride
                ),
            });
        }
        sources.push(source);
    }

    let packed_size: usize = sources.iter().map(|s| s.row_size * s.height).sum();
    if out.len() < packed_size {
        return Err(FrameError::BufferTooSmall {
            frame: n,
            needed: packed_size,
            actual: out.len(),
        });
    }

    let mut cursor = 0;
    for source in &sources {
        let mut read = 0;
        for _ in 0..source.height {
            out[cursor..cursor + source.row_size].copy_from_slice(&source.data[read..read + source.row_size]);
            cursor += source.row_size;
            read += source.stride;
        }
    }

    Ok(cursor)
}
