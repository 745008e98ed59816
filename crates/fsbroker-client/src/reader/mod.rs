//! Pipelined buffered reader.
//!
//! Keeps up to `max_outstanding` read requests in flight against one broker
//! file handle and serves blocking [`BufferedReader::read`] calls from the
//! completed responses, in issue order. Every time a response is fully
//! consumed the window is topped up again, so the pipeline stays full without
//! waiting for the buffer to run dry.
//!
//! Completions arrive on a transport thread through the [`CompletionSink`]
//! impl of the shared state. The transport holds an `Arc` to that state for
//! each request it accepted; dropping the reader waits until all of them have
//! come back.

mod queue;
mod state;
mod window;

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use fsbroker_core::config::ReaderConfig;
use fsbroker_core::error::{Error, Result};
use fsbroker_core::id::Fd;
use tracing::{debug, error, trace};

use crate::client::{CompletionSink, FsClient};
use crate::event::{Event, Message};
use crate::protocol;

use queue::CompletionQueue;
use state::StreamState;
use window::ReadWindow;

pub use state::StreamStatus;

/// Point-in-time view of a reader's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderStats {
    pub outstanding: u32,
    pub queued: usize,
    pub buffered_bytes: usize,
    pub next_issue_offset: u64,
    pub confirmed_offset: u64,
    pub status: StreamStatus,
}

struct Inner {
    window: ReadWindow,
    queue: CompletionQueue,
    state: StreamState,
    confirmed_offset: u64,
}

struct Shared {
    client: Arc<dyn FsClient>,
    fd: Fd,
    inner: Mutex<Inner>,
    cond: Condvar,
}

pub struct BufferedReader {
    shared: Arc<Shared>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while<'a, F>(&self, guard: MutexGuard<'a, Inner>, cond: F) -> MutexGuard<'a, Inner>
    where
        F: FnMut(&mut Inner) -> bool,
    {
        self.cond
            .wait_while(guard, cond)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, inner: &mut Inner, err: Error) {
        let amount = inner.window.read_size();
        if inner.state.latch_error(err.clone()) {
            error!(fd = self.fd.get(), amount, code = %err.code(), "FS read error: {}", err.message());
        } else {
            debug!(fd = self.fd.get(), amount, "ignoring failure after end of stream: {err}");
        }
    }

    fn latch_eof(&self, inner: &mut Inner) {
        if inner.state.latch_eof() {
            debug!(
                fd = self.fd.get(),
                confirmed_offset = inner.confirmed_offset,
                "end of stream"
            );
        }
    }

    /// Top the window up. A rejected issue latches the error and returns it.
    fn fill_window(self: &Arc<Self>, inner: &mut Inner) -> Result<()> {
        if !inner.state.is_open() {
            return Ok(());
        }

        let queued = inner.queue.len();
        let sink: Arc<dyn CompletionSink> = self.clone();
        let filled = inner.window.fill(queued, |len| {
            trace!(fd = self.fd.get(), len, "issuing read");
            self.client.read(self.fd, len, Arc::clone(&sink))
        });

        match filled {
            Ok(issued) => {
                if issued == 0
                    && inner.window.outstanding() == 0
                    && inner.queue.is_empty()
                    && inner.window.range_exhausted()
                {
                    self.latch_eof(inner);
                    self.cond.notify_all();
                }
                Ok(())
            }
            Err(e) => {
                self.fail(inner, e.clone());
                self.cond.notify_all();
                Err(e)
            }
        }
    }

    fn on_message(&self, inner: &mut Inner, msg: Message) {
        if let Err(e) = protocol::check_response(&msg) {
            self.fail(inner, e);
            return;
        }
        let resp = match self.client.decode_response_read(&msg) {
            Ok(resp) => resp,
            Err(e) => {
                self.fail(inner, e);
                return;
            }
        };

        // Anything after a latched failure or EOF lies past the end of what
        // the consumer may see.
        if !inner.state.is_open() {
            trace!(fd = self.fd.get(), amount = resp.amount, "dropping late completion");
            return;
        }

        inner.confirmed_offset += resp.amount as u64;
        if resp.amount > 0 {
            inner.queue.push(msg, &resp);
        }

        let short = resp.amount < inner.window.read_size();
        let range_done = inner
            .window
            .end_offset()
            .map_or(false, |end| inner.confirmed_offset >= end);
        if short || range_done {
            self.latch_eof(inner);
        }
    }
}

impl CompletionSink for Shared {
    fn handle(&self, event: Event) {
        let mut inner = self.lock();
        inner.window.complete();

        match event {
            Event::Message(msg) => self.on_message(&mut inner, msg),
            Event::Error { code, message } => {
                self.fail(&mut inner, Error::Transport { code, message });
            }
            other => {
                self.fail(&mut inner, Error::FailedExpectation(other.to_string()));
            }
        }

        self.cond.notify_all();
    }
}

impl BufferedReader {
    /// Seek `fd` to `cfg.start_offset` and prime the read-ahead window.
    ///
    /// `fd` must stay open on `client` until the reader is dropped.
    pub fn new(client: Arc<dyn FsClient>, fd: Fd, cfg: &ReaderConfig) -> Result<Self> {
        cfg.validate()?;

        if cfg.start_offset > 0 {
            client.seek(fd, cfg.start_offset)?;
        }

        let shared = Arc::new(Shared {
            client,
            fd,
            inner: Mutex::new(Inner {
                window: ReadWindow::new(
                    cfg.read_chunk_size,
                    cfg.max_outstanding,
                    cfg.start_offset,
                    cfg.end_offset,
                ),
                queue: CompletionQueue::new(),
                state: StreamState::Open,
                confirmed_offset: cfg.start_offset,
            }),
            cond: Condvar::new(),
        });

        // On failure the reader is dropped here, which waits out whatever was
        // issued before the rejection.
        let reader = BufferedReader { shared };
        {
            let mut inner = reader.shared.lock();
            reader.shared.fill_window(&mut inner)?;
        }
        Ok(reader)
    }

    /// Fill `buf` from the stream, blocking until enough data has arrived.
    ///
    /// Returns `buf.len()` unless the stream ended first, in which case the
    /// bytes that were left are returned. Reading again after that fails with
    /// [`Error::Eof`]. A failed request surfaces as its error once the data
    /// ahead of it has been read, and every later call returns the same error.
    /// A refill rejected by the client fails the call that triggered it and
    /// discards whatever was still buffered.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let shared = &self.shared;
        let mut inner = shared.lock();
        let mut copied = 0;

        loop {
            inner = shared.wait_while(inner, |i| i.queue.is_empty() && i.state.is_open());

            if inner.queue.is_empty() {
                match &inner.state {
                    StreamState::Failed(e) => return Err(e.clone()),
                    StreamState::Eof if copied > 0 => return Ok(copied),
                    StreamState::Eof => {
                        return Err(Error::Eof("short read (empty queue)".into()))
                    }
                    StreamState::Open => continue,
                }
            }

            if let Some((n, drained)) = inner.queue.copy_front(&mut buf[copied..]) {
                copied += n;
                if drained {
                    inner.queue.pop_front();
                    // A rejected refill latches the stream; nothing queued
                    // behind it may be handed out afterwards.
                    if let Err(e) = shared.fill_window(&mut inner) {
                        inner.queue.clear();
                        return Err(e);
                    }
                }
            }

            if copied == buf.len() {
                return Ok(copied);
            }
        }
    }

    pub fn fd(&self) -> Fd {
        self.shared.fd
    }

    pub fn stats(&self) -> ReaderStats {
        let inner = self.shared.lock();
        ReaderStats {
            outstanding: inner.window.outstanding(),
            queued: inner.queue.len(),
            buffered_bytes: inner.queue.buffered_bytes(),
            next_issue_offset: inner.window.next_issue_offset(),
            confirmed_offset: inner.confirmed_offset,
            status: inner.state.status(),
        }
    }
}

impl Drop for BufferedReader {
    fn drop(&mut self) {
        let shared = &self.shared;
        let mut inner = shared.lock();
        inner.state.latch_eof();
        if inner.window.outstanding() > 0 {
            debug!(
                fd = shared.fd.get(),
                outstanding = inner.window.outstanding(),
                "waiting for outstanding reads"
            );
        }
        let mut inner = shared.wait_while(inner, |i| i.window.outstanding() > 0);
        inner.queue.clear();
    }
}

impl io::Read for BufferedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match BufferedReader::read(self, buf) {
            Ok(n) => Ok(n),
            Err(Error::Eof(_)) => Ok(0),
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

impl std::fmt::Debug for BufferedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedReader")
            .field("fd", &self.shared.fd)
            .field("stats", &self.stats())
            .finish()
    }
}
