//! Continuous draining of the tool server's stderr.
//!
//! The pipe is read for the whole life of the child so a chatty server never
//! blocks on a full pipe buffer. Only the most recent bytes are kept, for the
//! crash report.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::debug;

const TRUNCATED_MARKER: &str = "(truncated)...";

/// Bounded tail of everything the child wrote to stderr.
#[derive(Debug)]
pub struct StderrTail {
    capacity: usize,
    inner: Mutex<TailBuffer>,
}

#[derive(Debug, Default)]
struct TailBuffer {
    bytes: VecDeque<u8>,
    dropped: u64,
}

impl StderrTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(TailBuffer::default()),
        }
    }

    pub fn push(&self, chunk: &[u8]) {
        let mut inner = self.inner.lock();

        let skip = chunk.len().saturating_sub(self.capacity);
        inner.dropped += skip as u64;
        inner.bytes.extend(&chunk[skip..]);

        let overflow = inner.bytes.len().saturating_sub(self.capacity);
        if overflow > 0 {
            inner.bytes.drain(..overflow);
            inner.dropped += overflow as u64;
        }
    }

    /// Number of bytes discarded to stay within capacity.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// The retained output as trimmed text, marked when older output was cut.
    pub fn snapshot(&self) -> String {
        let inner = self.inner.lock();
        let (front, back) = inner.bytes.as_slices();
        let mut raw = Vec::with_capacity(front.len() + back.len());
        raw.extend_from_slice(front);
        raw.extend_from_slice(back);

        let text = String::from_utf8_lossy(&raw);
        let text = text.trim();
        if inner.dropped > 0 {
            format!("{TRUNCATED_MARKER}{text}")
        } else {
            text.to_string()
        }
    }
}

/// Read `stream` until EOF on a background task, feeding `tail`.
pub fn spawn_drain<R>(mut stream: R, tail: Arc<StderrTail>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => tail.push(&buf[..n]),
                Err(e) => {
                    debug!(error = %e, "Stopped reading tool server stderr");
                    break;
                }
            }
        }
    })
}
