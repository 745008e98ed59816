//! In-process broker implementing [`FsClient`].
//!
//! Files are either registered in memory with [`LocalBroker::insert`] or opened
//! from the local filesystem. Requests are encoded with the parameter codec,
//! queued to one worker thread, and answered in issue order, so completions
//! for a handle always arrive in the order their reads were issued.
//!
//! Tests steer failures through [`LocalBroker::inject`],
//! [`LocalBroker::fail_next_seek`] and [`LocalBroker::pause`].

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read as _, Seek as _, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use fsbroker_core::error::{Error, ErrorCode, Result};
use fsbroker_core::id::{Fd, RequestId};
use fsbroker_core::serialization::Serializable;
use fsbroker_mem::{BufferPool, OwnedBuf};
use tracing::{debug, info, trace};

use crate::client::{CompletionSink, FsClient};
use crate::event::{Event, Message};
use crate::params::{self, debug::DEBUG_DUMP_STATS, debug::DEBUG_PURGE_CLOSED};
use crate::protocol::{self, READ_HEADER_LEN};

/// What happens to the read request a [`Fault`] targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// `read` returns an error instead of accepting the request.
    Reject,
    /// The request is answered with an error response.
    ErrorResponse { code: ErrorCode, message: String },
    /// The request completes with a transport error event.
    TransportError { code: ErrorCode, message: String },
    /// The request completes with an event that is not a response.
    UnexpectedEvent,
}

/// A failure scheduled for the read request with the given issue index.
/// Indices count every `read` call on the broker, starting at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub read_index: u64,
    pub kind: FaultKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub reads_issued: u64,
    pub reads_served: u64,
    pub bytes_served: u64,
    pub seeks: u64,
    pub open_files: usize,
}

enum Source {
    Memory(Arc<[u8]>),
    Disk(File),
}

struct OpenFile {
    name: String,
    source: Source,
    position: u64,
}

impl OpenFile {
    /// Read at the current position without moving it.
    fn read_at_position(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        match &mut self.source {
            Source::Memory(bytes) => {
                let start = (self.position.min(bytes.len() as u64)) as usize;
                let n = dst.len().min(bytes.len() - start);
                dst[..n].copy_from_slice(&bytes[start..start + n]);
                Ok(n)
            }
            Source::Disk(file) => {
                file.seek(SeekFrom::Start(self.position))?;
                let mut done = 0;
                while done < dst.len() {
                    match file.read(&mut dst[done..]) {
                        Ok(0) => break,
                        Ok(n) => done += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(done)
            }
        }
    }
}

#[derive(Default)]
struct Files {
    named: HashMap<String, Arc<[u8]>>,
    open: HashMap<Fd, OpenFile>,
    next_fd: u32,
}

enum Job {
    Read {
        id: RequestId,
        index: u64,
        params: Vec<u8>,
        sink: Arc<dyn CompletionSink>,
    },
    Seek {
        params: Vec<u8>,
        reply: Sender<Result<()>>,
    },
    Debug {
        params: Vec<u8>,
        reply: Sender<Result<()>>,
    },
}

struct State {
    files: Mutex<Files>,
    faults: Mutex<Vec<Fault>>,
    fail_seek: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    pool: BufferPool,
    next_request: AtomicU64,
    reads_issued: AtomicU64,
    reads_served: AtomicU64,
    bytes_served: AtomicU64,
    seeks: AtomicU64,
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl State {
    fn take_fault(&self, index: u64) -> Option<FaultKind> {
        let mut faults = relock(&self.faults);
        let pos = faults.iter().position(|f| f.read_index == index)?;
        Some(faults.remove(pos).kind)
    }

    fn wait_resumed(&self) {
        let paused = relock(&self.paused);
        let _unpaused = self
            .resumed
            .wait_while(paused, |p| *p)
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn error_event(&self, id: RequestId, code: ErrorCode, message: &str) -> Event {
        match protocol::encode_error_response(&self.pool, code, message) {
            Ok(body) => Event::Message(Message::new(id, body)),
            Err(e) => Event::Error {
                code: e.code(),
                message: format!("{message} (response not allocated: {e})"),
            },
        }
    }

    fn serve_read(&self, id: RequestId, index: u64, params: &[u8]) -> Event {
        match self.take_fault(index) {
            Some(FaultKind::ErrorResponse { code, message }) => {
                return self.error_event(id, code, &message)
            }
            Some(FaultKind::TransportError { code, message }) => {
                return Event::Error { code, message }
            }
            Some(FaultKind::UnexpectedEvent) => return Event::Timer,
            Some(FaultKind::Reject) | None => {}
        }

        let mut req = params::Read::default();
        if let Err(e) = req.decode(&mut &params[..]) {
            return self.error_event(id, e.code(), &e.message());
        }
        match self.read_file(req.fd(), req.amount()) {
            Ok(body) => Event::Message(Message::new(id, body)),
            Err(e) => self.error_event(id, e.code(), &e.message()),
        }
    }

    fn read_file(&self, fd: Fd, amount: u32) -> Result<OwnedBuf> {
        let mut files = relock(&self.files);
        let file = files.open.get_mut(&fd).ok_or(Error::BadFileHandle(fd))?;

        let mut body = self
            .pool
            .alloc_zeroed(READ_HEADER_LEN + amount as usize, "read-response")?;
        let n = file.read_at_position(&mut body[READ_HEADER_LEN..])?;
        let offset = file.position;
        file.position += n as u64;
        trace!(fd = fd.get(), file = %file.name, offset, n, "served read");

        protocol::write_read_header(&mut body, offset, n as u32);
        body.truncate(READ_HEADER_LEN + n);
        self.reads_served.fetch_add(1, Ordering::Relaxed);
        self.bytes_served.fetch_add(n as u64, Ordering::Relaxed);
        Ok(body)
    }

    fn serve_seek(&self, params: &[u8]) -> Result<()> {
        let mut req = params::Seek::default();
        req.decode(&mut &params[..])?;
        if self.fail_seek.swap(false, Ordering::AcqRel) {
            return Err(Error::Protocol {
                code: ErrorCode::IoError,
                message: format!("seek to {} failed", req.offset()),
            });
        }
        let mut files = relock(&self.files);
        let file = files
            .open
            .get_mut(&req.fd())
            .ok_or(Error::BadFileHandle(req.fd()))?;
        file.position = req.offset();
        self.seeks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn serve_debug(&self, params: &[u8]) -> Result<()> {
        let mut req = params::Debug::default();
        req.decode(&mut &params[..])?;
        match req.command() {
            DEBUG_DUMP_STATS => {
                let stats = self.stats();
                info!(
                    reads_issued = stats.reads_issued,
                    reads_served = stats.reads_served,
                    bytes_served = stats.bytes_served,
                    seeks = stats.seeks,
                    open_files = stats.open_files,
                    pool_used = self.pool.used_bytes(),
                    pool_peak = self.pool.peak_bytes(),
                    "broker stats"
                );
                Ok(())
            }
            DEBUG_PURGE_CLOSED => {
                let mut files = relock(&self.files);
                let Files { named, open, .. } = &mut *files;
                let before = named.len();
                named.retain(|name, _| open.values().any(|f| &f.name == name));
                debug!(purged = before - named.len(), "purged closed files");
                Ok(())
            }
            other => Err(Error::Protocol {
                code: ErrorCode::InvalidArgument,
                message: format!("unknown debug command {other}"),
            }),
        }
    }

    fn stats(&self) -> BrokerStats {
        BrokerStats {
            reads_issued: self.reads_issued.load(Ordering::Relaxed),
            reads_served: self.reads_served.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            seeks: self.seeks.load(Ordering::Relaxed),
            open_files: relock(&self.files).open.len(),
        }
    }
}

fn run_worker(state: Arc<State>, jobs: Receiver<Job>) {
    for job in jobs {
        match job {
            Job::Read {
                id,
                index,
                params,
                sink,
            } => {
                state.wait_resumed();
                let event = state.serve_read(id, index, &params);
                sink.handle(event);
            }
            Job::Seek { params, reply } => {
                let _ = reply.send(state.serve_seek(&params));
            }
            Job::Debug { params, reply } => {
                let _ = reply.send(state.serve_debug(&params));
            }
        }
    }
    debug!("local broker worker exiting");
}

pub struct LocalBroker {
    state: Arc<State>,
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Option<JoinHandle<()>>,
}

impl LocalBroker {
    pub fn new() -> Result<Self> {
        Self::with_pool(BufferPool::unbounded())
    }

    /// Response payloads are allocated from `pool`; when it is exhausted reads
    /// are answered with `BAD_MEMORY_ALLOCATION`.
    pub fn with_pool(pool: BufferPool) -> Result<Self> {
        let state = Arc::new(State {
            files: Mutex::new(Files::default()),
            faults: Mutex::new(Vec::new()),
            fail_seek: AtomicBool::new(false),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            pool,
            next_request: AtomicU64::new(0),
            reads_issued: AtomicU64::new(0),
            reads_served: AtomicU64::new(0),
            bytes_served: AtomicU64::new(0),
            seeks: AtomicU64::new(0),
        });
        let (tx, rx) = mpsc::channel();
        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("fsbroker-local".into())
            .spawn(move || run_worker(worker_state, rx))?;
        Ok(Self {
            state,
            jobs: Mutex::new(Some(tx)),
            worker: Some(worker),
        })
    }

    /// Register an in-memory file under `name`.
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        relock(&self.state.files)
            .named
            .insert(name.into(), Arc::from(bytes));
    }

    /// Open a registered in-memory file, or else a path on the local disk.
    pub fn open(&self, name: &str) -> Result<Fd> {
        let mut files = relock(&self.state.files);
        let source = match files.named.get(name) {
            Some(bytes) => Source::Memory(Arc::clone(bytes)),
            None => match File::open(name) {
                Ok(f) => Source::Disk(f),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::Protocol {
                        code: ErrorCode::FileNotFound,
                        message: format!("{name}: not found"),
                    })
                }
                Err(e) => return Err(Error::Io(format!("{name}: {e}"))),
            },
        };
        files.next_fd += 1;
        let fd = Fd::new(files.next_fd);
        files.open.insert(
            fd,
            OpenFile {
                name: name.to_string(),
                source,
                position: 0,
            },
        );
        debug!(fd = fd.get(), name, "opened");
        Ok(fd)
    }

    pub fn close(&self, fd: Fd) -> Result<()> {
        relock(&self.state.files)
            .open
            .remove(&fd)
            .map(|_| ())
            .ok_or(Error::BadFileHandle(fd))
    }

    /// Send a debug command and wait for the broker to act on it.
    pub fn debug(&self, command: i32) -> Result<()> {
        let (reply, rx) = mpsc::channel();
        self.submit(Job::Debug {
            params: params::Debug::new(command).to_bytes(),
            reply,
        })?;
        rx.recv().map_err(|_| broken_connection())?
    }

    pub fn inject(&self, fault: Fault) {
        relock(&self.state.faults).push(fault);
    }

    pub fn fail_next_seek(&self) {
        self.state.fail_seek.store(true, Ordering::Release);
    }

    /// Hold back read completions until [`resume`](Self::resume).
    pub fn pause(&self) {
        *relock(&self.state.paused) = true;
    }

    pub fn resume(&self) {
        *relock(&self.state.paused) = false;
        self.state.resumed.notify_all();
    }

    pub fn stats(&self) -> BrokerStats {
        self.state.stats()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.state.pool
    }

    fn submit(&self, job: Job) -> Result<()> {
        relock(&self.jobs)
            .as_ref()
            .ok_or_else(broken_connection)?
            .send(job)
            .map_err(|_| broken_connection())
    }
}

fn broken_connection() -> Error {
    Error::Transport {
        code: ErrorCode::CommBrokenConnection,
        message: "local broker worker is gone".into(),
    }
}

impl FsClient for LocalBroker {
    fn seek(&self, fd: Fd, offset: u64) -> Result<()> {
        let (reply, rx) = mpsc::channel();
        self.submit(Job::Seek {
            params: params::Seek::new(fd, offset).to_bytes(),
            reply,
        })?;
        rx.recv().map_err(|_| broken_connection())?
    }

    fn read(&self, fd: Fd, amount: u32, sink: Arc<dyn CompletionSink>) -> Result<()> {
        let index = self.state.reads_issued.fetch_add(1, Ordering::Relaxed);
        {
            let mut faults = relock(&self.state.faults);
            if let Some(pos) = faults
                .iter()
                .position(|f| f.read_index == index && f.kind == FaultKind::Reject)
            {
                faults.remove(pos);
                return Err(Error::Transport {
                    code: ErrorCode::CommNotConnected,
                    message: format!("read request {index} rejected"),
                });
            }
        }

        let id = RequestId::new(self.state.next_request.fetch_add(1, Ordering::Relaxed));
        self.submit(Job::Read {
            id,
            index,
            params: params::Read::new(fd, amount).to_bytes(),
            sink,
        })
    }
}

impl Drop for LocalBroker {
    fn drop(&mut self) {
        self.resume();
        relock(&self.jobs).take();
        if let Some(worker) = self.worker.take() {
            // The last handle can be released by a completion sink running on
            // the worker itself; it exits on its own once the queue drains.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
