//! Terminal input core, §4.7: a reader task multiplexing one non-blocking
//! handle between concurrent `readBytes` callers, backed by a staging ring
//! for bytes that arrive when nobody is waiting.
use std::{
    collections::VecDeque,
    io,
    os::unix::io::RawFd,
    sync::Arc,
};

use tokio::{
    io::unix::AsyncFd,
    sync::{oneshot, Mutex, Notify},
    task::JoinHandle,
};

use crate::error::TerminalError;

const STAGING_CAPACITY: usize = 4096;

struct StagingRing {
    buf: Vec<u8>,
    read_off: usize,
    write_off: usize,
}

impl StagingRing {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            read_off: 0,
            write_off: 0,
        }
    }

    /// Drain up to `dst.len()` bytes into `dst`; resets both offsets to zero
    /// once fully drained, per the §4.7 staging-ring drain rule.
    fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let available = self.write_off - self.read_off;
        let n = available.min(dst.len());
        dst[..n].copy_from_slice(&self.buf[self.read_off..self.read_off + n]);
        self.read_off += n;
        if self.read_off == self.write_off {
            self.read_off = 0;
            self.write_off = 0;
        }
        n
    }

    fn room(&self) -> usize {
        self.buf.len() - self.write_off
    }

    fn write_slice(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_off..]
    }

    fn commit(&mut self, n: usize) {
        self.write_off += n;
    }
}

struct PendingRead {
    buf: Vec<u8>,
    filled: usize,
    completion: oneshot::Sender<Result<ReadOutcome, TerminalError>>,
}

/// The result of a completed `readBytes` request: the caller's buffer,
/// filled as far as possible, and a typed flag for whether the underlying
/// handle hit end-of-file before the buffer was filled.
pub struct ReadOutcome {
    pub buf: Vec<u8>,
    pub eof: bool,
}

struct InputInner {
    pending: VecDeque<PendingRead>,
    staging: StagingRing,
    eof: bool,
    fatal: Option<TerminalError>,
}

/// One side of a [`super::Terminal`]: the reader state machine.
pub struct TerminalInput {
    fd: AsyncFd<RawFd>,
    inner: Mutex<InputInner>,
    waiter_added: Notify,
}

impl TerminalInput {
    /// Wrap a non-blocking, readable file descriptor. The caller retains
    /// ownership of `fd`'s lifetime; this type does not close it.
    pub fn new(fd: RawFd) -> io::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            fd: AsyncFd::new(fd)?,
            inner: Mutex::new(InputInner {
                pending: VecDeque::new(),
                staging: StagingRing::new(STAGING_CAPACITY),
                eof: false,
                fatal: None,
            }),
            waiter_added: Notify::new(),
        }))
    }

    /// Spawn the dedicated reader task. One call per [`TerminalInput`].
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(run_reader(self.clone()))
    }

    /// `readBytes(size, dst)`, §4.7. `buf.len()` is the requested size; the
    /// returned [`ReadOutcome`] hands the same allocation back, filled as far
    /// as the stream allowed.
    pub async fn read_bytes(self: &Arc<Self>, mut buf: Vec<u8>) -> Result<ReadOutcome, TerminalError> {
        if buf.is_empty() {
            return Err(TerminalError::InvalidRange);
        }
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            if let Some(err) = &inner.fatal {
                return Err(err.clone());
            }
            let copied = inner.staging.drain_into(&mut buf);
            if copied == buf.len() {
                return Ok(ReadOutcome { buf, eof: false });
            }
            if inner.eof {
                return Ok(ReadOutcome { buf, eof: true });
            }
            inner.pending.push_front(PendingRead {
                buf,
                filled: copied,
                completion: tx,
            });
        }
        self.waiter_added.notify_one();
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(TerminalError::HandleClosed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "terminal reader task stopped",
            ))),
        }
    }

    /// `waitForKey(h)`, §6: read a single byte.
    pub async fn wait_for_key(self: &Arc<Self>) -> Result<u8, TerminalError> {
        let outcome = self.read_bytes(vec![0u8; 1]).await?;
        if outcome.eof {
            return Err(TerminalError::Eof);
        }
        Ok(outcome.buf[0])
    }

    /// `readFixed<T>(h)`, §6, realized over a fixed-size byte array since a
    /// caller-chosen `T` would require `unsafe` transmutation to populate
    /// from bytes; callers needing a typed value convert from the array.
    pub async fn read_fixed<const N: usize>(self: &Arc<Self>) -> Result<[u8; N], TerminalError> {
        let outcome = self.read_bytes(vec![0u8; N]).await?;
        if outcome.eof {
            return Err(TerminalError::Eof);
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&outcome.buf);
        Ok(out)
    }

    async fn fail(&self, err: TerminalError) {
        let mut inner = self.inner.lock().await;
        inner.fatal = Some(err.clone());
        while let Some(p) = inner.pending.pop_back() {
            let _ = p.completion.send(Err(err.clone()));
        }
    }
}

async fn run_reader(input: Arc<TerminalInput>) {
    loop {
        let mut guard = match input.fd.readable().await {
            Ok(g) => g,
            Err(e) => {
                input.fail(TerminalError::HandleClosed(e)).await;
                break;
            }
        };

        let mut inner = input.inner.lock().await;
        let has_waiter = inner.pending.back().is_some();
        if !has_waiter && inner.staging.room() == 0 {
            drop(inner);
            drop(guard);
            input.waiter_added.notified().await;
            continue;
        }

        // Read straight into the caller's own buffer (or the staging ring's
        // backing array) — no intermediate copy, per §4.7's zero-copy promise.
        let dest: &mut [u8] = if has_waiter {
            let p = inner.pending.back_mut().unwrap();
            &mut p.buf[p.filled..]
        } else {
            inner.staging.write_slice()
        };
        let result = guard.try_io(|fd| nix::unistd::read(*fd.get_ref(), dest).map_err(io::Error::from));

        match result {
            Err(_would_block) => continue,
            Ok(Ok(0)) => {
                inner.eof = true;
                while let Some(p) = inner.pending.pop_back() {
                    let _ = p.completion.send(Ok(ReadOutcome { buf: p.buf, eof: true }));
                }
            }
            Ok(Ok(n)) => {
                if has_waiter {
                    let p = inner.pending.back_mut().unwrap();
                    p.filled += n;
                    if p.filled == p.buf.len() {
                        let done = inner.pending.pop_back().unwrap();
                        let _ = done.completion.send(Ok(ReadOutcome { buf: done.buf, eof: false }));
                    }
                } else {
                    inner.staging.commit(n);
                }
            }
            Ok(Err(e)) => {
                drop(inner);
                input.fail(TerminalError::HandleClosed(e)).await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{close, pipe, write};

    #[tokio::test]
    async fn drains_staged_bytes_before_syscall_read() {
        let (r, w) = pipe().unwrap();
        nix::fcntl::fcntl(r, nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK)).unwrap();
        let input = TerminalInput::new(r).unwrap();
        let _task = input.spawn();

        write(w, b"hello world").unwrap();
        let outcome = input.read_bytes(vec![0u8; 5]).await.unwrap();
        assert_eq!(&outcome.buf, b"hello");
        assert!(!outcome.eof);

        let outcome = input.read_bytes(vec![0u8; 6]).await.unwrap();
        assert_eq!(&outcome.buf, b" world");

        close(w).unwrap();
    }

    #[tokio::test]
    async fn eof_is_reported_as_typed_flag() {
        let (r, w) = pipe().unwrap();
        nix::fcntl::fcntl(r, nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK)).unwrap();
        let input = TerminalInput::new(r).unwrap();
        let _task = input.spawn();

        close(w).unwrap();
        let outcome = input.read_bytes(vec![0u8; 4]).await.unwrap();
        assert!(outcome.eof);
    }
}
