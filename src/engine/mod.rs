//! # Script Engine Interface
//!
//! The script engine evaluates script text and hands out clip handles and
//! decoded frames. clip-bridge only consumes it through the traits in this
//! module; releasing any handle is done by dropping it.

pub mod synthetic;
pub mod types;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::{error, info};

use crate::error::SessionError;

pub use synthetic::SyntheticEngine;
pub use types::{ColorFamily, Format, Fps, PresetFormat, VideoInfo};

/// Capacity of the scratch buffer a clip writes decode diagnostics into
pub const ERROR_MESSAGE_CAPACITY: usize = 1024;

/// An engine capable of evaluating scripts
pub trait ScriptEngine: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// One-time global setup. Called at most once per [`EngineHost`].
    fn initialize(&self) -> Result<(), String> {
        Ok(())
    }

    /// Evaluate `script` with `working_dir` as the current directory.
    ///
    /// On failure the engine's diagnostic text is returned; it may be empty.
    fn evaluate(&self, script: &[u8], working_dir: &Path) -> Result<Box<dyn ScriptContext>, String>;
}

/// The result of a successful script evaluation
pub trait ScriptContext: Send + Sync {
    /// The clip bound to output slot `index`, if the script set one
    fn output(&self, index: usize) -> Option<Box<dyn Clip>>;
}

/// A handle to a decodable clip.
///
/// `get_frame` may be called concurrently from several threads.
pub trait Clip: Send + Sync {
    fn video_info(&self) -> VideoInfo;

    /// Decode frame `n`. On failure, returns `None` after writing a
    /// NUL-terminated message into `error_message`.
    fn get_frame(&self, n: i32, error_message: &mut [u8]) -> Option<Box<dyn DecodedFrame>>;
}

/// A decoded frame. Dropping it releases the decode result.
pub trait DecodedFrame: Send {
    /// Distance in bytes between the starts of consecutive rows
    fn stride(&self, plane: u32) -> usize;

    /// Read-only sample storage of `plane`, starting at its first row
    fn plane_data(&self, plane: u32) -> &[u8];

    /// Plane width in samples
    fn plane_width(&self, plane: u32) -> u32;

    /// Plane height in rows
    fn plane_height(&self, plane: u32) -> u32;
}

/// Stack scratch space handed to [`Clip::get_frame`].
///
/// Only copied into an owned string when the decode fails.
pub struct ErrorBuffer {
    bytes: [u8; ERROR_MESSAGE_CAPACITY],
}

impl ErrorBuffer {
    pub fn new() -> Self {
        Self { bytes: [0; ERROR_MESSAGE_CAPACITY] }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Text up to the first NUL
    pub fn message(&self) -> String {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }
}

impl Default for ErrorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `message` into `buffer` as a NUL-terminated string, truncating
/// if needed. Helper for [`Clip`] implementations.
pub fn write_error_message(buffer: &mut [u8], message: &str) {
    if buffer.is_empty() {
        return;
    }
    let len = message.len().min(buffer.len() - 1);
    buffer[..len].copy_from_slice(&message.as_bytes()[..len]);
    buffer[len] = 0;
}

/// Owns a script engine together with its process-wide initialization state.
///
/// Create one per process and share it; sessions call
/// [`EngineHost::ensure_initialized`] before evaluating anything.
pub struct EngineHost {
    engine: Arc<dyn ScriptEngine>,
    init: OnceLock<Result<(), String>>,
}

impl EngineHost {
    pub fn new<E: ScriptEngine + 'static>(engine: E) -> Self {
        Self::from_arc(Arc::new(engine))
    }

    pub fn from_arc(engine: Arc<dyn ScriptEngine>) -> Self {
        Self {
            engine,
            init: OnceLock::new(),
        }
    }

    /// Run the engine's global setup once. A failed setup is remembered and
    /// reported to every later caller.
    pub fn ensure_initialized(&self) -> Result<(), SessionError> {
        let outcome = self.init.get_or_init(|| {
            info!("Initializing {} script engine", self.engine.name());
            let outcome = self.engine.initialize();
            if let Err(reason) = &outcome {
                error!("Script engine initialization failed: {}", reason);
            }
            outcome
        });

        outcome
            .clone()
            .map_err(|reason| SessionError::EngineInit { reason })
    }

    pub fn engine(&self) -> &dyn ScriptEngine {
        self.engine.as_ref()
    }
}

impl fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHost")
            .field("engine", &self.engine.name())
            .field("initialized", &self.init.get().map(|r| r.is_ok()))
            .finish()
    }
}
