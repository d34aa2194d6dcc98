//! A deterministic engine whose scripts are small TOML documents.
//!
//! ```toml
//! [clip]
//! width = 640
//! height = 480
//! frames = 240
//! fps_num = 30000
//! fps_den = 1001
//! format = "YUV420P8"
//! ```
//!
//! A script without a `[clip]` table evaluates fine but sets no output.
//! Sample values come from [`sample_value`], so a packed frame can be
//! checked byte for byte. Rows are padded out to `stride_align` bytes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{
    write_error_message, Clip, DecodedFrame, Format, Fps, PresetFormat, ScriptContext,
    ScriptEngine, VideoInfo,
};

/// Value written into row padding
pub const PADDING_BYTE: u8 = 0xEE;

/// Sample value at (`x`, `y`) of `plane` in frame `frame`.
///
/// 8-bit formats store the low byte, wider formats store the value little-endian.
pub fn sample_value(frame: i32, plane: u32, x: u32, y: u32) -> u16 {
    (frame as u32)
        .wrapping_mul(37)
        .wrapping_add(plane * 101)
        .wrapping_add(x * 3)
        .wrapping_add(y * 7) as u16
}

/// Handle kinds recorded in the release log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Clip,
    Context,
}

#[derive(Default)]
struct Tracker {
    init_calls: AtomicUsize,
    contexts: AtomicUsize,
    clips: AtomicUsize,
    frames: AtomicUsize,
    releases: Mutex<Vec<Release>>,
    working_dirs: Mutex<Vec<PathBuf>>,
}

impl Tracker {
    fn released(&self, release: Release) {
        if let Ok(mut log) = self.releases.lock() {
            log.push(release);
        }
    }
}

/// Clip description read from a script's `[clip]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClipSpec {
    pub width: u32,
    pub height: u32,
    pub frames: i32,
    #[serde(default = "default_fps_num")]
    pub fps_num: i64,
    #[serde(default = "default_fps_den")]
    pub fps_den: i64,
    #[serde(default = "default_format")]
    pub format: PresetFormat,
    #[serde(default = "default_stride_align")]
    pub stride_align: usize,
    #[serde(default)]
    pub fail_frames: Vec<i32>,
    #[serde(default)]
    pub variable_format: bool,
    #[serde(default)]
    pub decode_delay_ms: u64,
}

fn default_fps_num() -> i64 {
    24
}

fn default_fps_den() -> i64 {
    1
}

fn default_format() -> PresetFormat {
    PresetFormat::YUV420P8
}

fn default_stride_align() -> usize {
    32
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptDocument {
    clip: Option<ClipSpec>,
}

impl ClipSpec {
    fn check(&self) -> Result<(), String> {
        let format = Format::from(self.format);
        if self.width % (1 << format.sub_sampling_w) != 0 || self.height % (1 << format.sub_sampling_h) != 0 {
            return Err(format!(
                "{}x{} is not a valid size for {}",
                self.width, self.height, format.name
            ));
        }
        if self.stride_align == 0 || !self.stride_align.is_power_of_two() {
            return Err(format!("stride_align must be a power of two, got {}", self.stride_align));
        }
        if self.frames < 0 {
            return Err(format!("frames must not be negative, got {}", self.frames));
        }
        Ok(())
    }
}

/// The bundled engine. Clones share handle accounting.
#[derive(Clone, Default)]
pub struct SyntheticEngine {
    tracker: Arc<Tracker>,
    init_failure: Option<String>,
}

impl SyntheticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose global initialization fails with `reason`
    pub fn failing_init<S: Into<String>>(reason: S) -> Self {
        Self {
            tracker: Arc::default(),
            init_failure: Some(reason.into()),
        }
    }

    pub fn init_calls(&self) -> usize {
        self.tracker.init_calls.load(Ordering::SeqCst)
    }

    /// Number of (contexts, clips, frames) currently alive
    pub fn live_handles(&self) -> (usize, usize, usize) {
        (
            self.tracker.contexts.load(Ordering::SeqCst),
            self.tracker.clips.load(Ordering::SeqCst),
            self.tracker.frames.load(Ordering::SeqCst),
        )
    }

    /// Clip and context releases in the order they happened
    pub fn release_log(&self) -> Vec<Release> {
        self.tracker.releases.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Working directories scripts were evaluated in
    pub fn working_dirs(&self) -> Vec<PathBuf> {
        self.tracker.working_dirs.lock().map(|dirs| dirs.clone()).unwrap_or_default()
    }
}

impl ScriptEngine for SyntheticEngine {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn initialize(&self) -> Result<(), String> {
        self.tracker.init_calls.fetch_add(1, Ordering::SeqCst);
        match &self.init_failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    fn evaluate(&self, script: &[u8], working_dir: &Path) -> Result<Box<dyn ScriptContext>, String> {
        let text = std::str::from_utf8(script).map_err(|e| format!("script is not valid UTF-8: {}", e))?;
        let document: ScriptDocument = toml::from_str(text).map_err(|e| e.to_string())?;
        if let Some(spec) = &document.clip {
            spec.check()?;
        }

        if let Ok(mut dirs) = self.tracker.working_dirs.lock() {
            dirs.push(working_dir.to_path_buf());
        }

        self.tracker.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticContext {
            clip: document.clip,
            tracker: Arc::clone(&self.tracker),
        }))
    }
}

struct SyntheticContext {
    clip: Option<ClipSpec>,
    tracker: Arc<Tracker>,
}

impl ScriptContext for SyntheticContext {
    fn output(&self, index: usize) -> Option<Box<dyn Clip>> {
        if index != 0 {
            return None;
        }
        let spec = self.clip.clone()?;

        self.tracker.clips.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(SyntheticClip {
            format: Format::from(spec.format),
            spec,
            tracker: Arc::clone(&self.tracker),
        }))
    }
}

impl Drop for SyntheticContext {
    fn drop(&mut self) {
        self.tracker.contexts.fetch_sub(1, Ordering::SeqCst);
        self.tracker.released(Release::Context);
    }
}

struct SyntheticClip {
    spec: ClipSpec,
    format: Format,
    tracker: Arc<Tracker>,
}

impl SyntheticClip {
    fn render(&self, n: i32) -> SyntheticFrame {
        let bytes_per_sample = self.format.bytes_per_sample as usize;
        let mut planes = Vec::with_capacity(self.format.num_planes as usize);

        for p in 0..self.format.num_planes {
            let (width, height) = self.format.plane_dimensions(p, self.spec.width, self.spec.height);
            let row_size = width as usize * bytes_per_sample;
            let stride = row_size.next_multiple_of(self.spec.stride_align);
            let mut data = vec![PADDING_BYTE; stride * height as usize];

            for (y, row) in data.chunks_exact_mut(stride.max(1)).enumerate() {
                for (x, sample) in row[..row_size].chunks_exact_mut(bytes_per_sample).enumerate() {
                    let value = sample_value(n, p, x as u32, y as u32);
                    if bytes_per_sample == 1 {
                        sample[0] = value as u8;
                    } else {
                        sample[..2].copy_from_slice(&value.to_le_bytes());
                    }
                }
            }

            planes.push(SyntheticPlane { width, height, stride, data });
        }

        self.tracker.frames.fetch_add(1, Ordering::SeqCst);
        SyntheticFrame {
            planes,
            tracker: Arc::clone(&self.tracker),
        }
    }
}

impl Clip for SyntheticClip {
    fn video_info(&self) -> VideoInfo {
        if self.spec.variable_format {
            return VideoInfo {
                format: None,
                width: 0,
                height: 0,
                num_frames: self.spec.frames,
                fps: Fps::new(self.spec.fps_num, self.spec.fps_den),
            };
        }

        VideoInfo {
            format: Some(self.format.clone()),
            width: self.spec.width,
            height: self.spec.height,
            num_frames: self.spec.frames,
            fps: Fps::new(self.spec.fps_num, self.spec.fps_den),
        }
    }

    fn get_frame(&self, n: i32, error_message: &mut [u8]) -> Option<Box<dyn DecodedFrame>> {
        if n < 0 || n >= self.spec.frames {
            write_error_message(
                error_message,
                &format!("Requested frame number {} is out of range (0-{})", n, self.spec.frames - 1),
            );
            return None;
        }

        if self.spec.decode_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.spec.decode_delay_ms));
        }

        if self.spec.fail_frames.contains(&n) {
            write_error_message(error_message, &format!("synthetic decode failure at frame {}", n));
            return None;
        }

        debug!("Synthetic engine rendering frame {}", n);
        Some(Box::new(self.render(n)))
    }
}

impl Drop for SyntheticClip {
    fn drop(&mut self) {
        self.tracker.clips.fetch_sub(1, Ordering::SeqCst);
        self.tracker.released(Release::Clip);
    }
}

struct SyntheticPlane {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

struct SyntheticFrame {
    planes: Vec<SyntheticPlane>,
    tracker: Arc<Tracker>,
}

impl DecodedFrame for SyntheticFrame {
    fn stride(&self, plane: u32) -> usize {
        self.planes.get(plane as usize).map_or(0, |p| p.stride)
    }

    fn plane_data(&self, plane: u32) -> &[u8] {
        self.planes.get(plane as usize).map_or(&[][..], |p| p.data.as_slice())
    }

    fn plane_width(&self, plane: u32) -> u32 {
        self.planes.get(plane as usize).map_or(0, |p| p.width)
    }

    fn plane_height(&self, plane: u32) -> u32 {
        self.planes.get(plane as usize).map_or(0, |p| p.height)
    }
}

impl Drop for SyntheticFrame {
    fn drop(&mut self) {
        self.tracker.frames.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorBuffer;

    const SCRIPT: &str = r#"
[clip]
width = 8
height = 4
frames = 3
format = "YUV420P8"
stride_align = 16
fail_frames = [1]
"#;

    fn evaluate(engine: &SyntheticEngine, script: &str) -> Result<Box<dyn ScriptContext>, String> {
        engine.evaluate(script.as_bytes(), Path::new("/tmp"))
    }

    #[test]
    fn test_rows_are_padded_to_alignment() {
        let engine = SyntheticEngine::new();
        let context = evaluate(&engine, SCRIPT).unwrap();
        let clip = context.output(0).unwrap();

        let mut error = ErrorBuffer::new();
        let frame = clip.get_frame(2, error.as_mut_slice()).unwrap();

        assert_eq!(frame.stride(0), 16);
        assert_eq!(frame.plane_width(1), 4);
        assert_eq!(frame.plane_height(1), 2);
        assert_eq!(frame.plane_data(0)[0], sample_value(2, 0, 0, 0) as u8);
        assert_eq!(frame.plane_data(0)[8], PADDING_BYTE);
        assert_eq!(frame.plane_data(2)[16 + 1], sample_value(2, 2, 1, 1) as u8);
    }

    #[test]
    fn test_failures_write_message() {
        let engine = SyntheticEngine::new();
        let context = evaluate(&engine, SCRIPT).unwrap();
        let clip = context.output(0).unwrap();

        let mut error = ErrorBuffer::new();
        assert!(clip.get_frame(1, error.as_mut_slice()).is_none());
        assert_eq!(error.message(), "synthetic decode failure at frame 1");

        let mut error = ErrorBuffer::new();
        assert!(clip.get_frame(3, error.as_mut_slice()).is_none());
        assert!(error.message().contains("out of range"));
    }

    #[test]
    fn test_only_slot_zero_is_bound() {
        let engine = SyntheticEngine::new();
        let context = evaluate(&engine, SCRIPT).unwrap();
        assert!(context.output(1).is_none());

        let empty = evaluate(&engine, "# nothing here\n").unwrap();
        assert!(empty.output(0).is_none());
    }

    #[test]
    fn test_invalid_scripts_report_diagnostics() {
        let engine = SyntheticEngine::new();
        assert!(evaluate(&engine, "[clip\nwidth = 1").is_err());

        let odd = "[clip]\nwidth = 7\nheight = 4\nframes = 1\n";
        let message = evaluate(&engine, odd).err().unwrap();
        assert!(message.contains("not a valid size"));
        assert_eq!(engine.live_handles(), (0, 0, 0));
    }

    #[test]
    fn test_handles_are_tracked() {
        let engine = SyntheticEngine::new();
        let context = evaluate(&engine, SCRIPT).unwrap();
        let clip = context.output(0).unwrap();
        assert_eq!(engine.live_handles(), (1, 1, 0));

        drop(clip);
        drop(context);
        assert_eq!(engine.live_handles(), (0, 0, 0));
        assert_eq!(engine.release_log(), vec![Release::Clip, Release::Context]);
        assert_eq!(engine.working_dirs(), vec![PathBuf::from("/tmp")]);
    }
}
