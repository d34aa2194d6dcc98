//! # Packed Frame Layout
//!
//! A packed frame is every plane of a decoded frame, in ascending plane
//! order, with each row copied back to back and stride padding dropped.

use serde::Serialize;

use crate::session::ClipInfo;

/// Placement of one plane inside a packed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaneLayout {
    pub plane: u32,
    /// Width in samples
    pub width: u32,
    /// Height in rows
    pub height: u32,
    /// Bytes per packed row
    pub row_size: usize,
    /// Byte offset of the plane's first row
    pub offset: usize,
}

impl PlaneLayout {
    pub fn len(&self) -> usize {
        self.row_size * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Byte layout of one packed frame of a clip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackedLayout {
    planes: Vec<PlaneLayout>,
    total_bytes: usize,
}

impl PackedLayout {
    /// Lay out every plane the clip's format declares.
    ///
    /// Plane 0 is full size; later planes are reduced by the format's
    /// subsampling. For the usual three-plane formats this matches
    /// `2 * (((w * bps) >> ssw) * h >> ssh) + w * bps * h`.
    pub fn for_info(info: &ClipInfo) -> Self {
        let format = &info.format;
        let bytes_per_sample = format.bytes_per_sample as usize;

        let mut planes = Vec::with_capacity(format.num_planes as usize);
        let mut offset = 0;
        for plane in 0..format.num_planes {
            let (width, height) = format.plane_dimensions(plane, info.width, info.height);
            let layout = PlaneLayout {
                plane,
                width,
                height,
                row_size: width as usize * bytes_per_sample,
                offset,
            };
            offset += layout.len();
            planes.push(layout);
        }

        Self {
            planes,
            total_bytes: offset,
        }
    }

    /// Size in bytes of one packed frame
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn planes(&self) -> &[PlaneLayout] {
        &self.planes
    }

    pub fn plane(&self, plane: u32) -> Option<&PlaneLayout> {
        self.planes.get(plane as usize)
    }
}

/// Bytes needed for one packed frame, or 0 when there is no clip metadata
pub fn frame_size(info: Option<&ClipInfo>) -> usize {
    info.map_or(0, |info| PackedLayout::for_info(info).total_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Format, Fps, PresetFormat};

    fn clip(width: u32, height: u32, format: PresetFormat) -> ClipInfo {
        ClipInfo {
            width,
            height,
            num_frames: 1,
            fps: Fps::new(24, 1),
            format: Format::from(format),
        }
    }

    /// The three-plane formula sized buffers assume
    fn three_plane_size(info: &ClipInfo) -> usize {
        let f = &info.format;
        let (w, h, bps) = (info.width as usize, info.height as usize, f.bytes_per_sample as usize);
        let mut chroma = (w * bps) >> f.sub_sampling_w;
        if chroma != 0 {
            chroma *= h;
            chroma >>= f.sub_sampling_h;
            chroma *= 2;
        }
        chroma + w * bps * h
    }

    #[test]
    fn test_small_420_frame() {
        let info = clip(4, 4, PresetFormat::YUV420P8);
        assert_eq!(frame_size(Some(&info)), 24);

        let layout = PackedLayout::for_info(&info);
        let offsets: Vec<usize> = layout.planes().iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![0, 16, 20]);
    }

    #[test]
    fn test_matches_three_plane_formula() {
        for format in [
            PresetFormat::YUV420P8,
            PresetFormat::YUV420P10,
            PresetFormat::YUV422P8,
            PresetFormat::YUV422P10,
            PresetFormat::YUV444P16,
            PresetFormat::RGB24,
            PresetFormat::RGB48,
        ] {
            let info = clip(1920, 1080, format);
            assert_eq!(
                frame_size(Some(&info)),
                three_plane_size(&info),
                "{:?}",
                format
            );
        }
    }

    #[test]
    fn test_single_plane_formats_count_one_plane() {
        assert_eq!(frame_size(Some(&clip(640, 480, PresetFormat::Gray8))), 640 * 480);
        assert_eq!(frame_size(Some(&clip(640, 480, PresetFormat::Gray16))), 640 * 480 * 2);
    }

    #[test]
    fn test_missing_metadata_is_zero() {
        assert_eq!(frame_size(None), 0);
        assert_eq!(PackedLayout::default().total_bytes(), 0);
    }

    #[test]
    fn test_planes_tile_the_frame() {
        let layout = PackedLayout::for_info(&clip(720, 480, PresetFormat::YUV422P10));
        let summed: usize = layout.planes().iter().map(|p| p.len()).sum();
        assert_eq!(summed, layout.total_bytes());
        assert_eq!(layout.plane(1).map(|p| p.row_size), Some(720));
        assert!(layout.plane(3).is_none());
    }
}
