//! # clip-bridge
//!
//! Expose a video script's decoded output to a calling process as packed raw frames.
//!
//! A script is evaluated once into a [`Session`] bound to the clip at its
//! output slot 0. The session reports the clip's geometry and timing, and
//! delivers frames asynchronously: each request is decoded and packed on a
//! background worker pool, with color planes copied back to back and stride
//! padding removed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clip_bridge::{Bridge, Config, SyntheticEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let bridge = Bridge::new(Config::default(), SyntheticEngine::new())?;
//! let session = bridge.open_script_file("clip.toml", None).await?;
//!
//! let info = session.info();
//! println!("{}x{}, {} frames", info.width, info.height, info.num_frames);
//!
//! let completion = session.get_frame(0, session.allocate_frame_buffer()).await?;
//! let (error, frame, buffer) = completion.into_parts();
//! assert!(error.is_none());
//! println!("frame {} is {} bytes", frame, buffer.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`engine`] - Script engine interface and the bundled synthetic engine
//! - [`session`] - Session construction, validation and teardown
//! - [`layout`] - Packed frame size and plane offsets
//! - [`worker`] - Background fetch-and-pack jobs
//! - [`config`] - Configuration management
//!
//! ## Plugging In An Engine
//!
//! Any engine can be used by implementing [`ScriptEngine`](engine::ScriptEngine)
//! and the handle traits it hands out:
//!
//! ```rust,no_run
//! use std::path::Path;
//! use clip_bridge::engine::{ScriptContext, ScriptEngine};
//!
//! struct MyEngine;
//!
//! impl ScriptEngine for MyEngine {
//!     fn name(&self) -> &str {
//!         "my_engine"
//!     }
//!
//!     fn evaluate(&self, script: &[u8], working_dir: &Path) -> Result<Box<dyn ScriptContext>, String> {
//!         // Evaluate the script and wrap the result
//!         Err("not implemented".to_string())
//!     }
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod session;
pub mod worker;

// Re-export commonly used types for convenience
pub use crate::{
    bridge::Bridge,
    config::Config,
    engine::{EngineHost, ScriptEngine, SyntheticEngine},
    error::{BridgeError, FrameError, Result, SessionError},
    layout::{frame_size, PackedLayout},
    session::{ClipInfo, Session, SessionInfo},
    worker::{FrameCompletion, FramePool, FrameRequest, JobState},
};
