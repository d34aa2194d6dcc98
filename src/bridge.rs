use std::collections::VecDeque;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    config::Config,
    engine::{EngineHost, ScriptEngine},
    error::{BridgeError, Result},
    session::Session,
    worker::{FramePool, FrameRequest},
};

/// Entry point that ties an engine, a worker pool and configuration together
///
/// A host creates one bridge per process:
/// 1. Engine setup - run the engine's one-time global initialization
/// 2. Session binding - evaluate scripts into validated sessions
/// 3. Frame delivery - fetch packed frames on the shared worker pool
pub struct Bridge {
    config: Config,
    host: Arc<EngineHost>,
    pool: Arc<FramePool>,
}

impl Bridge {
    /// Create a bridge for `engine`. The engine is not initialized until
    /// [`Bridge::initialize`] or the first session is opened.
    pub fn new<E: ScriptEngine + 'static>(config: Config, engine: E) -> Result<Self> {
        config.validate()?;
        let pool = FramePool::new(&config.worker)?;

        info!(
            "Bridge created: {} engine, {} frame workers",
            engine.name(),
            pool.threads()
        );

        Ok(Self {
            config,
            host: Arc::new(EngineHost::new(engine)),
            pool: Arc::new(pool),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn host(&self) -> &EngineHost {
        &self.host
    }

    // ==========================================
    // ENGINE SETUP
    // ==========================================

    /// Run the engine's global initialization now instead of on first use
    pub fn initialize(&self) -> Result<()> {
        self.host.ensure_initialized()?;
        Ok(())
    }

    // ==========================================
    // SESSION BINDING
    // ==========================================

    /// Evaluate `script` with `working_dir` as the current directory
    pub fn open_session<P: AsRef<Path>>(&self, script: &[u8], working_dir: P) -> Result<Session> {
        let session = Session::open(&self.host, Arc::clone(&self.pool), script, working_dir)?;
        Ok(session)
    }

    /// Read a script file and evaluate it. Without an explicit working
    /// directory the script's own directory is used.
    pub async fn open_script_file<P: AsRef<Path>>(
        &self,
        script_path: P,
        working_dir: Option<&Path>,
    ) -> Result<Session> {
        let script_path = script_path.as_ref();
        debug!("Loading script from {:?}", script_path);

        let script = tokio::fs::read(script_path).await?;
        let working_dir = match working_dir {
            Some(dir) => dir.to_path_buf(),
            None => script_directory(script_path),
        };

        self.open_session(&script, working_dir)
    }

    // ==========================================
    // FRAME DELIVERY
    // ==========================================

    /// Fetch `frames` in order and hand each packed frame to `sink`.
    ///
    /// At most `pipeline.max_in_flight` requests are outstanding; buffers
    /// are reused once `sink` returns. Stops at the first failed frame or
    /// sink error. Returns the number of frames delivered.
    pub async fn stream_frames<F>(&self, session: &Session, frames: Range<i32>, mut sink: F) -> Result<usize>
    where
        F: FnMut(i32, &[u8]) -> Result<()>,
    {
        let max_in_flight = self.config.pipeline.max_in_flight;
        let frame_size = session.frame_size();

        let mut next = frames.start;
        let mut pending: VecDeque<FrameRequest> = VecDeque::with_capacity(max_in_flight);
        let mut spare: Vec<Vec<u8>> = Vec::new();
        let mut delivered = 0;

        debug!(
            "Streaming frames {}..{} with up to {} in flight",
            frames.start, frames.end, max_in_flight
        );

        loop {
            while pending.len() < max_in_flight && next < frames.end {
                let buffer = spare.pop().unwrap_or_else(|| vec![0; frame_size]);
                pending.push_back(session.get_frame(next, buffer));
                next += 1;
            }

            let Some(request) = pending.pop_front() else {
                break;
            };

            let completion = request.await?;
            let written = completion.result.map_err(BridgeError::from)?;
            sink(completion.frame, &completion.buffer[..written])?;
            spare.push(completion.buffer);
            delivered += 1;
        }

        info!("Delivered {} frames", delivered);
        Ok(delivered)
    }
}

/// Directory a script lives in, used as its default working directory
pub fn script_directory(script_path: &Path) -> PathBuf {
    match script_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
