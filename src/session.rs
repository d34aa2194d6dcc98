//! # Sessions
//!
//! A [`Session`] binds one evaluated script to the clip at its output
//! slot 0. Construction validates the clip; afterwards its metadata never
//! changes and frames can be requested from any thread.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{Clip, EngineHost, Format, Fps, ScriptContext, VideoInfo};
use crate::error::{FrameError, SessionError, WorkerError};
use crate::layout::PackedLayout;
use crate::worker::{self, FramePool, FrameRequest};

/// Output slot the session reads from
pub const OUTPUT_INDEX: usize = 0;

/// Validated clip metadata, copied out once at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipInfo {
    pub width: u32,
    pub height: u32,
    pub num_frames: i32,
    pub fps: Fps,
    pub format: Format,
}

impl ClipInfo {
    /// Accept only constant-format clips with a known, nonzero length
    pub fn from_video_info(info: &VideoInfo) -> Option<Self> {
        if !info.is_constant_format() || info.num_frames <= 0 {
            return None;
        }

        Some(Self {
            width: info.width,
            height: info.height,
            num_frames: info.num_frames,
            fps: info.fps,
            format: info.format.clone()?,
        })
    }
}

/// What a host gets back from [`Session::info`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub width: u32,
    pub height: u32,
    pub num_frames: i32,
    pub fps: Fps,
    pub frame_size: usize,
}

/// A script bound to its validated output clip.
///
/// Cloning is cheap and every clone refers to the same clip. The engine
/// handles are released once the last clone and the last in-flight frame
/// request are gone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    // Field order is release order: the clip goes before its context.
    clip: Box<dyn Clip>,
    _context: Box<dyn ScriptContext>,
    info: ClipInfo,
    layout: PackedLayout,
    working_dir: PathBuf,
    pool: Arc<FramePool>,
}

impl Session {
    /// Evaluate `script` in `working_dir` and bind its output clip.
    ///
    /// Nothing acquired along the way survives a failure.
    pub fn open<P: AsRef<Path>>(
        host: &EngineHost,
        pool: Arc<FramePool>,
        script: &[u8],
        working_dir: P,
    ) -> Result<Self, SessionError> {
        host.ensure_initialized()?;

        let working_dir = working_dir.as_ref();
        debug!("Evaluating {} byte script in {:?}", script.len(), working_dir);

        let context = host
            .engine()
            .evaluate(script, working_dir)
            .map_err(|message| {
                warn!("Script evaluation failed in {:?}: {}", working_dir, message);
                SessionError::ScriptEvaluation {
                    path: working_dir.display().to_string(),
                    message: (!message.is_empty()).then_some(message),
                }
            })?;

        let Some(clip) = context.output(OUTPUT_INDEX) else {
            warn!("Script in {:?} set no output at slot {}", working_dir, OUTPUT_INDEX);
            drop(context);
            return Err(SessionError::NoOutput);
        };

        let video_info = clip.video_info();
        let Some(info) = ClipInfo::from_video_info(&video_info) else {
            warn!(
                "Rejecting clip: constant format = {}, frames = {}",
                video_info.is_constant_format(),
                video_info.num_frames
            );
            drop(clip);
            drop(context);
            return Err(SessionError::UnsupportedClip);
        };

        let layout = PackedLayout::for_info(&info);
        info!(
            "Session ready: {}x{} {} @ {}/{} fps, {} frames, {} bytes per frame",
            info.width,
            info.height,
            info.format.name,
            info.fps.numerator,
            info.fps.denominator,
            info.num_frames,
            layout.total_bytes()
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                clip,
                _context: context,
                info,
                layout,
                working_dir: working_dir.to_path_buf(),
                pool,
            }),
        })
    }

    /// Geometry, timing and packed frame size of the clip
    pub fn info(&self) -> SessionInfo {
        let info = &self.inner.info;
        SessionInfo {
            width: info.width,
            height: info.height,
            num_frames: info.num_frames,
            fps: info.fps,
            frame_size: self.frame_size(),
        }
    }

    pub fn clip_info(&self) -> &ClipInfo {
        &self.inner.info
    }

    pub fn layout(&self) -> &PackedLayout {
        &self.inner.layout
    }

    /// Bytes a buffer needs to hold one packed frame
    pub fn frame_size(&self) -> usize {
        self.inner.layout.total_bytes()
    }

    /// A zeroed buffer of exactly [`Session::frame_size`] bytes
    pub fn allocate_frame_buffer(&self) -> Vec<u8> {
        vec![0; self.frame_size()]
    }

    pub fn working_dir(&self) -> &Path {
        &self.inner.working_dir
    }

    /// Fetch and pack frame `n` into `buffer` on the worker pool.
    ///
    /// Returns at once. The buffer comes back in the completion whether or
    /// not the fetch succeeded.
    pub fn get_frame(&self, n: i32, buffer: Vec<u8>) -> FrameRequest {
        worker::submit(self.clone(), n, buffer)
    }

    /// Callback flavour of [`Session::get_frame`].
    ///
    /// `on_complete` receives `(error, frame, buffer)` exactly once, on the
    /// Tokio runtime this is called from. Fails without submitting anything
    /// when there is no current runtime.
    pub fn get_frame_with<F>(&self, n: i32, buffer: Vec<u8>, on_complete: F) -> Result<(), WorkerError>
    where
        F: FnOnce(Option<FrameError>, i32, Vec<u8>) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WorkerError::NoRuntime { reason: e.to_string() })?;

        let request = self.get_frame(n, buffer);
        runtime.spawn(async move {
            match request.await {
                Ok(completion) => {
                    let (error, frame, buffer) = completion.into_parts();
                    on_complete(error, frame, buffer);
                }
                Err(e) => tracing::error!("{}", e),
            }
        });
        Ok(())
    }

    /// Explicit teardown. Handles are released now unless other clones or
    /// in-flight requests still hold the session.
    pub fn close(self) {
        debug!(
            "Closing session for {:?} ({} other holders)",
            self.inner.working_dir,
            Arc::strong_count(&self.inner) - 1
        );
    }

    pub(crate) fn clip(&self) -> &dyn Clip {
        self.inner.clip.as_ref()
    }

    pub(crate) fn pool(&self) -> &FramePool {
        &self.inner.pool
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        info!("Releasing session for {:?}", self.working_dir);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("working_dir", &self.inner.working_dir)
            .field("info", &self.inner.info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::engine::synthetic::Release;
    use crate::engine::SyntheticEngine;

    const CLIP_4X4: &str = "[clip]\nwidth = 4\nheight = 4\nframes = 10\nfps_num = 30000\nfps_den = 1001\n";

    fn setup() -> (SyntheticEngine, EngineHost, Arc<FramePool>) {
        let engine = SyntheticEngine::new();
        let host = EngineHost::new(engine.clone());
        let pool = FramePool::new(&WorkerConfig { threads: 2, ..WorkerConfig::default() }).unwrap();
        (engine, host, Arc::new(pool))
    }

    #[test]
    fn test_open_reports_clip_info() {
        let (engine, host, pool) = setup();
        let session = Session::open(&host, pool, CLIP_4X4.as_bytes(), "/scripts").unwrap();

        let info = session.info();
        assert_eq!(info.width, 4);
        assert_eq!(info.height, 4);
        assert_eq!(info.num_frames, 10);
        assert_eq!(info.fps, Fps::new(30000, 1001));
        assert_eq!(info.frame_size, 24);
        assert_eq!(session.allocate_frame_buffer().len(), 24);
        assert_eq!(engine.working_dirs(), vec![PathBuf::from("/scripts")]);
        assert_eq!(engine.live_handles(), (1, 1, 0));
    }

    #[test]
    fn test_info_serializes_like_host_object() {
        let (_engine, host, pool) = setup();
        let session = Session::open(&host, pool, CLIP_4X4.as_bytes(), "/scripts").unwrap();

        let json = serde_json::to_value(session.info()).unwrap();
        assert_eq!(json["numFrames"], 10);
        assert_eq!(json["frameSize"], 24);
        assert_eq!(json["fps"]["numerator"], 30000);
        assert_eq!(json["fps"]["denominator"], 1001);
    }

    #[test]
    fn test_evaluation_failure_includes_path() {
        let (engine, host, pool) = setup();
        let err = Session::open(&host, pool, b"[clip\n", "/work/dir").unwrap_err();

        match err {
            SessionError::ScriptEvaluation { path, message } => {
                assert_eq!(path, "/work/dir");
                assert!(message.is_some());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(engine.live_handles(), (0, 0, 0));
    }

    #[test]
    fn test_no_output_releases_context() {
        let (engine, host, pool) = setup();
        let err = Session::open(&host, pool, b"# sets no output\n", "/").unwrap_err();

        assert_eq!(err, SessionError::NoOutput);
        assert_eq!(engine.live_handles(), (0, 0, 0));
        assert_eq!(engine.release_log(), vec![Release::Context]);
    }

    #[test]
    fn test_unsupported_clips_are_rejected() {
        let (engine, host, pool) = setup();
        let variable = "[clip]\nwidth = 4\nheight = 4\nframes = 5\nvariable_format = true\n";
        let empty = "[clip]\nwidth = 4\nheight = 4\nframes = 0\n";

        for _ in 0..3 {
            for script in [variable, empty] {
                let err = Session::open(&host, Arc::clone(&pool), script.as_bytes(), "/").unwrap_err();
                assert_eq!(err, SessionError::UnsupportedClip);
                assert_eq!(engine.live_handles(), (0, 0, 0));
            }
        }

        let log = engine.release_log();
        assert_eq!(log.len(), 12);
        assert!(log.chunks(2).all(|pair| pair == [Release::Clip, Release::Context]));
    }

    #[test]
    fn test_engine_init_failure_blocks_sessions() {
        let host = EngineHost::new(SyntheticEngine::failing_init("missing runtime"));
        let pool = Arc::new(FramePool::new(&WorkerConfig::default()).unwrap());

        let err = Session::open(&host, pool, CLIP_4X4.as_bytes(), "/").unwrap_err();
        assert!(matches!(err, SessionError::EngineInit { .. }));
    }

    #[test]
    fn test_teardown_releases_clip_then_context() {
        let (engine, host, pool) = setup();
        let session = Session::open(&host, pool, CLIP_4X4.as_bytes(), "/").unwrap();
        let other = session.clone();

        session.close();
        assert_eq!(engine.live_handles(), (1, 1, 0));

        other.close();
        assert_eq!(engine.live_handles(), (0, 0, 0));
        assert_eq!(engine.release_log(), vec![Release::Clip, Release::Context]);
    }
}
