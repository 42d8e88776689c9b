//! Terminal output core, §4.8: a writer task draining a FIFO queue of
//! pending writes onto one non-blocking handle.
use std::{collections::VecDeque, io, os::unix::io::RawFd, sync::Arc};

use tokio::{
    io::unix::AsyncFd,
    sync::{oneshot, Mutex, Notify},
    task::JoinHandle,
};

use crate::error::TerminalError;

struct PendingWrite {
    buf: Vec<u8>,
    written: usize,
    completion: oneshot::Sender<Result<(), TerminalError>>,
}

pub struct TerminalOutput {
    fd: AsyncFd<RawFd>,
    pending: Mutex<VecDeque<PendingWrite>>,
    fatal: Mutex<Option<TerminalError>>,
    item_added: Notify,
}

impl TerminalOutput {
    pub fn new(fd: RawFd) -> io::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            fd: AsyncFd::new(fd)?,
            pending: Mutex::new(VecDeque::new()),
            fatal: Mutex::new(None),
            item_added: Notify::new(),
        }))
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(run_writer(self.clone()))
    }

    /// `writeBytes(size, src)`, §4.8: atomically enqueues `buf` and returns
    /// its completion. The caller decides whether to await it.
    pub async fn write_bytes(
        self: &Arc<Self>,
        buf: Vec<u8>,
    ) -> Result<oneshot::Receiver<Result<(), TerminalError>>, TerminalError> {
        if buf.is_empty() {
            return Err(TerminalError::InvalidRange);
        }
        if let Some(err) = &*self.fatal.lock().await {
            return Err(err.clone());
        }
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.push_front(PendingWrite {
                buf,
                written: 0,
                completion: tx,
            });
        }
        self.item_added.notify_one();
        Ok(rx)
    }

    /// `writeLine(s)`, §4.8: writes `s` then a single `'\n'`, awaiting only
    /// the newline's completion so the payload write pipelines behind it.
    pub async fn write_line(self: &Arc<Self>, s: &str) -> Result<(), TerminalError> {
        let _payload = self.write_bytes(s.as_bytes().to_vec()).await?;
        let newline = self.write_bytes(vec![b'\n']).await?;
        match newline.await {
            Ok(result) => result,
            Err(_) => Err(TerminalError::HandleClosed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "terminal writer task stopped",
            ))),
        }
    }

    async fn fail(&self, err: TerminalError, in_flight: Option<PendingWrite>) {
        *self.fatal.lock().await = Some(err.clone());
        if let Some(entry) = in_flight {
            let _ = entry.completion.send(Err(err.clone()));
        }
        let mut pending = self.pending.lock().await;
        while let Some(entry) = pending.pop_back() {
            let _ = entry.completion.send(Err(err.clone()));
        }
    }
}

async fn run_writer(output: Arc<TerminalOutput>) {
    loop {
        let mut entry = {
            let mut pending = output.pending.lock().await;
            match pending.pop_back() {
                Some(e) => e,
                None => {
                    drop(pending);
                    output.item_added.notified().await;
                    continue;
                }
            }
        };

        loop {
            let mut guard = match output.fd.writable().await {
                Ok(g) => g,
                Err(e) => {
                    output.fail(TerminalError::HandleClosed(e), Some(entry)).await;
                    return;
                }
            };

            let remaining_len = entry.buf.len() - entry.written;
            let written = entry.written;
            let buf = &entry.buf;
            let result = guard.try_io(|fd| {
                nix::unistd::write(*fd.get_ref(), &buf[written..written + remaining_len])
                    .map_err(io::Error::from)
            });

            match result {
                Err(_would_block) => continue,
                Ok(Ok(n)) => {
                    entry.written += n;
                    if entry.written == entry.buf.len() {
                        let _ = entry.completion.send(Ok(()));
                        break;
                    }
                }
                Ok(Err(e)) => {
                    output.fail(TerminalError::HandleClosed(e), Some(entry)).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{close, pipe, read};

    #[tokio::test]
    async fn write_bytes_delivers_in_order() {
        let (r, w) = pipe().unwrap();
        nix::fcntl::fcntl(w, nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK)).unwrap();
        let output = TerminalOutput::new(w).unwrap();
        let _task = output.spawn();

        output.write_line("hello").await.unwrap();

        let mut buf = [0u8; 6];
        read(r, &mut buf).unwrap();
        assert_eq!(&buf, b"hello\n");

        close(r).unwrap();
    }

    #[tokio::test]
    async fn short_writes_are_resumed() {
        let (r, w) = pipe().unwrap();
        nix::fcntl::fcntl(w, nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK)).unwrap();
        let output = TerminalOutput::new(w).unwrap();
        let _task = output.spawn();

        let payload = vec![b'x'; 4096];
        let rx = output.write_bytes(payload.clone()).await.unwrap();
        rx.await.unwrap().unwrap();

        let mut total = 0usize;
        let mut buf = vec![0u8; 4096];
        while total < payload.len() {
            let n = read(r, &mut buf[total..]).unwrap();
            total += n;
        }
        assert_eq!(total, payload.len());
        close(r).unwrap();
    }
}
