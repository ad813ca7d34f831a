// tests/memory_transfer.rs

use std::io::Cursor;

use t32ctl::errors::T32Error;
use t32ctl::output::MemoryPipe;
use t32ctl::session::{Session, Workdir};
use t32ctl::transfer::{self, MAX_ATTEMPTS};
use t32ctl_test_utils::builders::ConfigFileBuilder;
use t32ctl_test_utils::{FakeConnector, FakeEngine, init_tracing, with_timeout};

type TestSession = Session<FakeConnector, MemoryPipe>;

async fn connect(engine: &FakeEngine) -> TestSession {
    init_tracing();
    let workdir = Workdir::create(None).expect("workdir");
    Session::connect(
        engine.connector(),
        engine.pipe(),
        workdir,
        ConfigFileBuilder::new().build(),
    )
    .await
    .expect("connect")
}

#[tokio::test]
async fn read_is_split_into_blocks() {
    let engine = FakeEngine::new();
    let image: Vec<u8> = (0..10).collect();
    engine.set_memory(0x2000, &image);
    let mut session = connect(&engine).await;

    let mut sink = Vec::new();
    let read = with_timeout(transfer::read_to(&mut session, 0x2000, 10, 4, &mut sink))
        .await
        .expect("read");

    assert_eq!(read, 10);
    assert_eq!(sink, image);
    let calls = engine.calls();
    assert!(calls.contains(&"T32_ReadMemory 0x2000 32 4".to_string()));
    assert!(calls.contains(&"T32_ReadMemory 0x2004 32 4".to_string()));
    assert!(calls.contains(&"T32_ReadMemory 0x2008 32 2".to_string()));
}

#[tokio::test]
async fn read_failures_are_retried() {
    let engine = FakeEngine::new();
    engine.set_memory(0x10, b"abcd");
    let mut session = connect(&engine).await;
    engine.fail_reads(MAX_ATTEMPTS - 1);

    let mut sink = Vec::new();
    transfer::read_to(&mut session, 0x10, 4, 16, &mut sink)
        .await
        .expect("read after retries");
    assert_eq!(sink, b"abcd");
}

#[tokio::test]
async fn read_gives_up_after_max_attempts() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;
    engine.fail_reads(MAX_ATTEMPTS);

    let mut sink = Vec::new();
    let err = transfer::read_to(&mut session, 0x10, 4, 16, &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, T32Error::CallFailure { .. }), "unexpected error: {err:?}");
    assert_eq!(
        engine.count_calls("T32_ReadMemory"),
        MAX_ATTEMPTS as usize
    );
    assert!(sink.is_empty());
}

#[tokio::test]
async fn write_streams_the_whole_source() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;
    let payload: Vec<u8> = (0..=255).collect();

    let written = transfer::write_from(&mut session, 0x8000, 100, false, &mut Cursor::new(&payload))
        .await
        .expect("write");

    assert_eq!(written, 256);
    assert_eq!(engine.memory(0x8000, 256), payload);
    assert_eq!(engine.count_calls("T32_WriteMemory"), 3);
}

#[tokio::test]
async fn verify_rewrites_corrupted_blocks() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;
    engine.corrupt_writes(1);
    engine.fail_writes(2);

    let payload = b"firmware".to_vec();
    transfer::write_from(&mut session, 0x400, 64, true, &mut Cursor::new(&payload))
        .await
        .expect("verified write");

    assert_eq!(engine.memory(0x400, payload.len()), payload);
    // Two rejected calls, the corrupted write and the good rewrite.
    assert_eq!(engine.count_calls("T32_WriteMemory"), 4);
    assert_eq!(engine.count_calls("T32_ReadMemory"), 2);
}

#[tokio::test]
async fn unverified_write_keeps_corruption() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;
    engine.corrupt_writes(1);

    transfer::write_from(&mut session, 0x400, 64, false, &mut Cursor::new(b"\x01\x02"))
        .await
        .expect("write");
    assert_eq!(engine.memory(0x400, 2), vec![0xFE, 0x02]);
}

#[tokio::test]
async fn read_past_the_top_of_memory_is_rejected() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;

    let mut sink = Vec::new();
    let err = transfer::read_to(&mut session, u64::MAX - 1, 4, 2, &mut sink)
        .await
        .unwrap_err();
    assert!(
        matches!(err, T32Error::AddressOverflow { offset: 2, .. }),
        "unexpected error: {err:?}"
    );
    assert_eq!(sink.len(), 2);
    assert_eq!(engine.count_calls("T32_ReadMemory"), 1);
}

#[tokio::test]
async fn write_past_the_top_of_memory_is_rejected() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;

    let err = transfer::write_from(&mut session, u64::MAX - 2, 2, false, &mut Cursor::new(b"abcd"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, T32Error::AddressOverflow { offset: 2, .. }),
        "unexpected error: {err:?}"
    );
    assert_eq!(engine.memory(u64::MAX - 2, 2), b"ab");
    assert_eq!(engine.count_calls("T32_WriteMemory"), 1);
}
