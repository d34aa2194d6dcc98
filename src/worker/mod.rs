//! # Frame Fetch Worker
//!
//! Frame requests are decoded and packed on a [`FramePool`] and handed back
//! to the requester through a oneshot channel, so the requesting task never
//! blocks on a decode.

mod pack;

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::engine::ErrorBuffer;
use crate::error::WorkerError;
use crate::session::Session;

pub use crate::error::FrameError;
pub use pack::pack_frame;

/// Background threads that run frame jobs
pub struct FramePool {
    pool: rayon::ThreadPool,
}

impl FramePool {
    pub fn new(config: &WorkerConfig) -> Result<Self, WorkerError> {
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()
            .map_err(|e| WorkerError::PoolBuildFailed { reason: e.to_string() })?;

        debug!("Started frame pool with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}

/// Lifecycle of a frame request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }
}

/// Result of one frame request. The buffer is always handed back.
#[derive(Debug)]
pub struct FrameCompletion {
    pub frame: i32,
    pub buffer: Vec<u8>,
    /// Bytes written into `buffer` on success
    pub result: Result<usize, FrameError>,
}

impl FrameCompletion {
    /// Error-first view: `(error, frame, buffer)`
    pub fn into_parts(self) -> (Option<FrameError>, i32, Vec<u8>) {
        (self.result.err(), self.frame, self.buffer)
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Handle to a submitted frame request. Await it for the [`FrameCompletion`].
///
/// Dropping the handle does not cancel the job; its result is discarded.
pub struct FrameRequest {
    frame: i32,
    state: Arc<AtomicU8>,
    receiver: oneshot::Receiver<FrameCompletion>,
}

impl FrameRequest {
    pub fn frame(&self) -> i32 {
        self.frame
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl Future for FrameRequest {
    type Output = Result<FrameCompletion, WorkerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let frame = self.frame;
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.map_err(|_| WorkerError::JobLost { frame }))
    }
}

pub(crate) fn submit(session: Session, n: i32, mut buffer: Vec<u8>) -> FrameRequest {
    let (sender, receiver) = oneshot::channel();
    let state = Arc::new(AtomicU8::new(JobState::Queued as u8));

    let job_state = Arc::clone(&state);
    let pool_session = session.clone();
    pool_session.pool().spawn(move || {
        job_state.store(JobState::Running as u8, Ordering::Release);

        let result = panic::catch_unwind(AssertUnwindSafe(|| fetch_and_pack(&session, n, &mut buffer)))
            .unwrap_or_else(|payload| {
                Err(FrameError::Decode {
                    frame: n,
                    message: format!("engine panicked: {}", panic_message(payload.as_ref())),
                })
            });

        match &result {
            Ok(written) => {
                debug!("Frame {} packed ({} bytes)", n, written);
                job_state.store(JobState::Completed as u8, Ordering::Release);
            }
            Err(e) => {
                warn!("{}", e);
                job_state.store(JobState::Failed as u8, Ordering::Release);
            }
        }

        // Nobody to tell if the request handle was dropped
        let _ = sender.send(FrameCompletion { frame: n, buffer, result });
        drop(session);
    });

    FrameRequest {
        frame: n,
        state,
        receiver,
    }
}

fn fetch_and_pack(session: &Session, n: i32, out: &mut [u8]) -> Result<usize, FrameError> {
    let mut error = ErrorBuffer::new();
    let Some(frame) = session.clip().get_frame(n, error.as_mut_slice()) else {
        return Err(FrameError::Decode {
            frame: n,
            message: error.message(),
        });
    };

    pack_frame(frame.as_ref(), &session.clip_info().format, n, out)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
