//! Buffered reader scenarios against the in-process broker

use fsbroker_client::{BufferedReader, Fault, FaultKind, FsClient, LocalBroker, StreamStatus};
use fsbroker_core::config::ReaderConfig;
use fsbroker_core::error::{Error, ErrorCode};
use fsbroker_core::id::Fd;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn file_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

fn broker_with(len: usize) -> (Arc<LocalBroker>, Fd, Vec<u8>) {
    let broker = Arc::new(LocalBroker::new().expect("broker start failed"));
    let data = file_bytes(len);
    broker.insert("data", data.clone());
    let fd = broker.open("data").expect("open failed");
    (broker, fd, data)
}

fn reader(broker: &Arc<LocalBroker>, fd: Fd, cfg: &ReaderConfig) -> BufferedReader {
    let client: Arc<dyn FsClient> = broker.clone();
    BufferedReader::new(client, fd, cfg).expect("reader construction failed")
}

#[test]
fn test_file_of_2500_bytes_with_window_3() {
    let (broker, fd, data) = broker_with(2500);
    let r = reader(&broker, fd, &ReaderConfig::new(1000, 3));

    let mut buf = vec![0u8; 2500];
    assert_eq!(r.read(&mut buf[..1000]).unwrap(), 1000);
    assert_eq!(r.read(&mut buf[1000..]).unwrap(), 1500);
    assert_eq!(buf, data);

    // Stream is exhausted now
    let err = r.read(&mut buf).unwrap_err();
    assert!(matches!(err, Error::Eof(_)));
    assert_eq!(err.code(), ErrorCode::Eof);
    assert_eq!(r.read(&mut buf).unwrap_err(), err);
    assert_eq!(r.stats().status, StreamStatus::Eof);
}

#[test]
fn test_order_preserved_across_chunk_and_window_sizes() {
    let (broker, fd, data) = broker_with(10_007);

    for chunk in [1u32, 7, 1000, 4096, 20_000] {
        for window in [1u32, 2, 5] {
            broker.seek(fd, 0).unwrap();
            let mut r = reader(&broker, fd, &ReaderConfig::new(chunk, window));
            let mut out = Vec::new();
            r.read_to_end(&mut out).unwrap();
            assert_eq!(out.len(), data.len(), "chunk={chunk} window={window}");
            assert!(out == data, "bytes out of order: chunk={chunk} window={window}");
        }
    }
}

#[test]
fn test_protocol_error_on_second_request() {
    let (broker, fd, data) = broker_with(10_000);
    broker.inject(Fault {
        read_index: 1,
        kind: FaultKind::ErrorResponse {
            code: ErrorCode::IoError,
            message: "sector unreadable".into(),
        },
    });
    let r = reader(&broker, fd, &ReaderConfig::new(1000, 3));

    // Data from the first response is still delivered
    let mut buf = vec![0u8; 1000];
    assert_eq!(r.read(&mut buf).unwrap(), 1000);
    assert_eq!(buf, data[..1000]);

    let err = r.read(&mut buf).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IoError);
    assert!(err.to_string().contains("sector unreadable"));

    // Repeated calls fail identically
    for _ in 0..3 {
        assert_eq!(r.read(&mut buf).unwrap_err(), err);
    }
    assert_eq!(r.stats().status, StreamStatus::Failed(ErrorCode::IoError));
}

#[test]
fn test_transport_error_and_unexpected_event() {
    let (broker, fd, _) = broker_with(1000);
    broker.inject(Fault {
        read_index: 0,
        kind: FaultKind::TransportError {
            code: ErrorCode::CommBrokenConnection,
            message: "peer reset".into(),
        },
    });
    let r = reader(&broker, fd, &ReaderConfig::new(100, 2));
    let err = r.read(&mut [0u8; 10]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CommBrokenConnection);
    drop(r);

    let (broker, fd, _) = broker_with(1000);
    broker.inject(Fault {
        read_index: 0,
        kind: FaultKind::UnexpectedEvent,
    });
    let r = reader(&broker, fd, &ReaderConfig::new(100, 2));
    let err = r.read(&mut [0u8; 10]).unwrap_err();
    assert!(matches!(err, Error::FailedExpectation(_)));
}

#[test]
fn test_range_truncation() {
    let (broker, fd, data) = broker_with(10_000);
    let cfg = ReaderConfig::new(1000, 8).with_range(1500, Some(4200));
    let r = reader(&broker, fd, &cfg);

    // Everything fits in the window; the last request is cut to the remainder
    let stats = r.stats();
    assert_eq!(stats.next_issue_offset, 4200);
    assert!(stats.outstanding as usize + stats.queued <= 8);
    assert_eq!(broker.stats().reads_issued, 3);

    let mut buf = vec![0u8; 5000];
    let n = r.read(&mut buf).unwrap();
    assert_eq!(n, 2700);
    assert_eq!(buf[..n], data[1500..4200]);
    assert!(matches!(r.read(&mut buf), Err(Error::Eof(_))));
}

#[test]
fn test_range_ending_on_chunk_boundary_terminates() {
    let (broker, fd, data) = broker_with(10_000);
    let cfg = ReaderConfig::new(1000, 2).with_range(2000, Some(5000));
    let mut r = reader(&broker, fd, &cfg);

    let mut out = Vec::new();
    r.read_to_end(&mut out).unwrap();
    assert_eq!(out, data[2000..5000]);
    assert_eq!(r.stats().confirmed_offset, 5000);
}

#[test]
fn test_window_bound_holds_while_reading() {
    let (broker, fd, _) = broker_with(50_000);
    let r = reader(&broker, fd, &ReaderConfig::new(100, 4));

    let mut buf = [0u8; 37];
    loop {
        let stats = r.stats();
        assert!(
            stats.outstanding as usize + stats.queued <= 4,
            "window overrun: {stats:?}"
        );
        match r.read(&mut buf) {
            Ok(n) if n < buf.len() => break,
            Ok(_) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

#[test]
fn test_drop_waits_for_outstanding_reads() {
    let (broker, fd, _) = broker_with(100_000);
    broker.pause();
    let r = reader(&broker, fd, &ReaderConfig::new(1000, 3));
    assert_eq!(r.stats().outstanding, 3);

    let dropped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&dropped);
    let handle = thread::spawn(move || {
        drop(r);
        flag.store(true, Ordering::SeqCst);
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!dropped.load(Ordering::SeqCst), "drop returned with reads in flight");

    broker.resume();
    handle.join().unwrap();
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(broker.stats().reads_served, 3);
}

#[test]
fn test_seek_failure_fails_construction() {
    let (broker, fd, _) = broker_with(1000);
    broker.fail_next_seek();
    let client: Arc<dyn FsClient> = broker.clone();
    let cfg = ReaderConfig::new(100, 2).with_range(500, None);
    let err = BufferedReader::new(client, fd, &cfg).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IoError);
    assert_eq!(broker.stats().reads_issued, 0);
}

#[test]
fn test_rejected_issue_during_construction() {
    let (broker, fd, _) = broker_with(10_000);
    broker.inject(Fault {
        read_index: 1,
        kind: FaultKind::Reject,
    });
    let client: Arc<dyn FsClient> = broker.clone();
    let err = BufferedReader::new(client, fd, &ReaderConfig::new(1000, 3)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CommNotConnected);

    // The request accepted before the rejection was waited out
    assert_eq!(broker.stats().reads_served, 1);
}

#[test]
fn test_rejected_refill_surfaces_on_read() {
    let (broker, fd, _) = broker_with(10_000);
    broker.inject(Fault {
        read_index: 2,
        kind: FaultKind::Reject,
    });
    let r = reader(&broker, fd, &ReaderConfig::new(100, 2));

    let mut buf = [0u8; 100];
    let err = r.read(&mut buf).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CommNotConnected);
    assert_eq!(
        r.stats().status,
        StreamStatus::Failed(ErrorCode::CommNotConnected)
    );
}

#[test]
fn test_rejected_refill_with_full_window_stays_failed() {
    let (broker, fd, _) = broker_with(10_000);
    broker.inject(Fault {
        read_index: 3,
        kind: FaultKind::Reject,
    });
    let r = reader(&broker, fd, &ReaderConfig::new(100, 3));

    // Let every primed response land in the queue first
    let started = Instant::now();
    while r.stats().queued < 3 {
        assert!(started.elapsed() < Duration::from_secs(5), "responses never arrived");
        thread::sleep(Duration::from_millis(1));
    }

    let mut buf = [0u8; 100];
    let err = r.read(&mut buf).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CommNotConnected);

    // Buffered responses are gone; every later call fails the same way
    for _ in 0..4 {
        assert_eq!(r.read(&mut buf).unwrap_err(), err);
    }
    assert_eq!(r.stats().queued, 0);
}

#[test]
fn test_reads_from_disk_through_io_read() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("blob.bin");
    let data = file_bytes(65_536 + 123);
    std::fs::write(&path, &data).unwrap();

    let broker = Arc::new(LocalBroker::new().unwrap());
    let fd = broker.open(path.to_str().unwrap()).unwrap();
    let mut r = reader(&broker, fd, &ReaderConfig::default());

    let mut out = Vec::new();
    r.read_to_end(&mut out).unwrap();
    assert!(out == data);
    drop(r);
    broker.close(fd).unwrap();
}

#[test]
fn test_consumer_on_another_thread() {
    let (broker, fd, data) = broker_with(20_000);
    let r = reader(&broker, fd, &ReaderConfig::new(512, 3));

    let out = thread::spawn(move || {
        let mut out = Vec::new();
        let mut buf = [0u8; 999];
        loop {
            let n = r.read(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                break;
            }
        }
        out
    })
    .join()
    .unwrap();
    assert!(out == data);
}
