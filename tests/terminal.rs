//! Integration tests for the async terminal core, S5-S6, driven over a real
//! non-blocking pipe standing in for a kernel handle.
use std::time::Duration;

use devmgrd::terminal::{TerminalInput, TerminalOutput};
use nix::{
    fcntl::{fcntl, FcntlArg, OFlag},
    unistd::{close, pipe, read, write},
};

fn set_nonblocking(fd: i32) {
    fcntl(fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();
}

/// S5 — terminal pipeline: a `readBytes(3)` issued before any data arrives
/// is serviced across two short kernel deliveries, then a follow-up
/// `readBytes(1)` drains the leftover byte from the staging ring.
#[tokio::test]
async fn terminal_pipeline_drains_staging_ring() {
    let (r, w) = pipe().unwrap();
    set_nonblocking(r);
    let input = TerminalInput::new(r).unwrap();
    let _task = input.spawn();

    let pending = tokio::spawn({
        let input = input.clone();
        async move { input.read_bytes(vec![0u8; 3]).await.unwrap() }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    write(w, &[0x41, 0x42]).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    write(w, &[0x43, 0x44]).unwrap();

    let outcome = pending.await.unwrap();
    assert_eq!(outcome.buf, vec![0x41, 0x42, 0x43]);
    assert!(!outcome.eof);

    let outcome = input.read_bytes(vec![0u8; 1]).await.unwrap();
    assert_eq!(outcome.buf, vec![0x44]);

    close(w).unwrap();
}

/// S6 — write short count: a single logical `writeBytes(5)` is serviced by
/// two short syscalls but signals exactly one completion, and the bytes
/// land on the wire in order.
#[tokio::test]
async fn write_short_count_signals_once() {
    let (r, w) = pipe().unwrap();
    set_nonblocking(w);
    let output = TerminalOutput::new(w).unwrap();
    let _task = output.spawn();

    let rx = output.write_bytes(b"hello".to_vec()).await.unwrap();
    rx.await.unwrap().unwrap();

    let mut buf = [0u8; 5];
    let mut total = 0;
    while total < buf.len() {
        total += read(r, &mut buf[total..]).unwrap();
    }
    assert_eq!(&buf, b"hello");

    close(r).unwrap();
}
