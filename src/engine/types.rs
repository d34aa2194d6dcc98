use serde::{Deserialize, Serialize};

/// Frame rate as an exact fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fps {
    pub numerator: i64,
    pub denominator: i64,
}

impl Fps {
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self { numerator, denominator }
    }

    /// Approximate frames per second, or 0.0 for an unknown rate
    pub fn as_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

/// Color family of a sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFamily {
    Gray,
    Rgb,
    Yuv,
}

/// Sample layout of a clip's frames.
///
/// Subsampling values are log2 factors applied to every plane after the
/// first, so `sub_sampling_w == 1` halves the chroma width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Format {
    pub name: String,
    pub color_family: ColorFamily,
    pub bytes_per_sample: u32,
    pub sub_sampling_w: u32,
    pub sub_sampling_h: u32,
    pub num_planes: u32,
}

impl Format {
    /// Width and height in samples of `plane` for a frame of the given size
    pub fn plane_dimensions(&self, plane: u32, width: u32, height: u32) -> (u32, u32) {
        if plane == 0 {
            (width, height)
        } else {
            (width >> self.sub_sampling_w, height >> self.sub_sampling_h)
        }
    }
}

/// Named sample formats understood by the bundled engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetFormat {
    Gray8,
    Gray16,
    YUV420P8,
    YUV420P10,
    YUV420P16,
    YUV422P8,
    YUV422P10,
    YUV444P8,
    YUV444P16,
    RGB24,
    RGB48,
}

impl PresetFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gray8 => "Gray8",
            Self::Gray16 => "Gray16",
            Self::YUV420P8 => "YUV420P8",
            Self::YUV420P10 => "YUV420P10",
            Self::YUV420P16 => "YUV420P16",
            Self::YUV422P8 => "YUV422P8",
            Self::YUV422P10 => "YUV422P10",
            Self::YUV444P8 => "YUV444P8",
            Self::YUV444P16 => "YUV444P16",
            Self::RGB24 => "RGB24",
            Self::RGB48 => "RGB48",
        }
    }
}

impl From<PresetFormat> for Format {
    fn from(preset: PresetFormat) -> Self {
        use ColorFamily::*;

        // (family, bytes per sample, ssw, ssh, planes)
        let (color_family, bytes_per_sample, sub_sampling_w, sub_sampling_h, num_planes) = match preset {
            PresetFormat::Gray8 => (Gray, 1, 0, 0, 1),
            PresetFormat::Gray16 => (Gray, 2, 0, 0, 1),
            PresetFormat::YUV420P8 => (Yuv, 1, 1, 1, 3),
            PresetFormat::YUV420P10 | PresetFormat::YUV420P16 => (Yuv, 2, 1, 1, 3),
            PresetFormat::YUV422P8 => (Yuv, 1, 1, 0, 3),
            PresetFormat::YUV422P10 => (Yuv, 2, 1, 0, 3),
            PresetFormat::YUV444P8 => (Yuv, 1, 0, 0, 3),
            PresetFormat::YUV444P16 => (Yuv, 2, 0, 0, 3),
            PresetFormat::RGB24 => (Rgb, 1, 0, 0, 3),
            PresetFormat::RGB48 => (Rgb, 2, 0, 0, 3),
        };

        Format {
            name: preset.name().to_string(),
            color_family,
            bytes_per_sample,
            sub_sampling_w,
            sub_sampling_h,
            num_planes,
        }
    }
}

/// Video metadata as reported by an engine for a clip.
///
/// `format` is `None` and the dimensions are 0 when the clip can change
/// format or size between frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub format: Option<Format>,
    pub width: u32,
    pub height: u32,
    pub num_frames: i32,
    pub fps: Fps,
}

impl VideoInfo {
    /// True when every frame shares one format and one size
    pub fn is_constant_format(&self) -> bool {
        self.format.is_some() && self.width > 0 && self.height > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chroma_planes_are_subsampled() {
        let format = Format::from(PresetFormat::YUV420P8);
        assert_eq!(format.plane_dimensions(0, 1920, 1080), (1920, 1080));
        assert_eq!(format.plane_dimensions(1, 1920, 1080), (960, 540));
        assert_eq!(format.plane_dimensions(2, 1920, 1080), (960, 540));

        let format = Format::from(PresetFormat::YUV422P10);
        assert_eq!(format.plane_dimensions(1, 1920, 1080), (960, 1080));
        assert_eq!(format.bytes_per_sample, 2);
    }

    #[test]
    fn test_constant_format_requires_geometry() {
        let mut info = VideoInfo {
            format: Some(PresetFormat::Gray8.into()),
            width: 16,
            height: 16,
            num_frames: 1,
            fps: Fps::new(24, 1),
        };
        assert!(info.is_constant_format());

        info.width = 0;
        assert!(!info.is_constant_format());

        info.width = 16;
        info.format = None;
        assert!(!info.is_constant_format());
    }

    #[test]
    fn test_fps_as_f64() {
        assert!((Fps::new(30000, 1001).as_f64() - 29.97).abs() < 0.01);
        assert_eq!(Fps::new(0, 0).as_f64(), 0.0);
    }
}
