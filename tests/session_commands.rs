// tests/session_commands.rs

use t32ctl::decode::{ResultType, Value};
use t32ctl::errors::T32Error;
use t32ctl::output::MemoryPipe;
use t32ctl::rpc::MessageKinds;
use t32ctl::session::{DisconnectMode, Session, Workdir};
use t32ctl::status::codes;
use t32ctl_test_utils::builders::ConfigFileBuilder;
use t32ctl_test_utils::{CommandResponse, FakeConnector, FakeEngine, init_tracing, with_timeout};

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
async fn run_command_returns_only_the_commands_output() {
    let engine = FakeEngine::new();
    engine.on_command(
        "Register.View",
        CommandResponse::output(&["R0 0x1\n", "R1 0x2\n"]),
    );
    let mut session = connect(&engine).await;

    // Leftovers from earlier activity must not leak into the result.
    engine.pipe().push(b"stale output\n");

    let output = with_timeout(session.run_command("Register.View"))
        .await
        .expect("command");
    assert_eq!(output, "R0 0x1\nR1 0x2\n");
    assert_eq!(engine.pipe().buffered(), 0);
}

#[tokio::test]
async fn command_without_output_yields_empty_string() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;

    let output = with_timeout(session.run_command("SYStem.Up"))
        .await
        .expect("command");
    assert!(output.is_empty());
}

#[tokio::test]
async fn error_message_after_command_is_command_failed() {
    let engine = FakeEngine::new();
    engine.on_command(
        "X",
        CommandResponse::default().with_message("unknown command", MessageKinds::ERROR),
    );
    let mut session = connect(&engine).await;

    let err = with_timeout(session.run_command("X")).await.unwrap_err();
    match err {
        T32Error::CommandFailed { command, message } => {
            assert_eq!(command, "X");
            assert_eq!(message, "unknown command");
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn informational_message_is_not_an_error() {
    let engine = FakeEngine::new();
    engine.on_command(
        "Data.LOAD.Elf app.elf",
        CommandResponse::output(&["loading\n"])
            .with_message("3 symbols loaded", MessageKinds::GENERAL_INFO),
    );
    let mut session = connect(&engine).await;

    let output = with_timeout(session.run_command("Data.LOAD.Elf app.elf"))
        .await
        .expect("command");
    assert_eq!(output, "loading\n");
}

#[tokio::test]
async fn rejected_command_reports_engine_reply() {
    let engine = FakeEngine::new();
    engine.on_command(
        "Bogus",
        CommandResponse::failing(codes::T32_ERR_EXECUTECOMMAND_FAIL, "syntax error  \n"),
    );
    let mut session = connect(&engine).await;

    let err = with_timeout(session.run_command("Bogus")).await.unwrap_err();
    assert!(
        matches!(&err, T32Error::CommandFailed { command, message } if command == "Bogus" && message == "syntax error"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn evaluate_decodes_by_type_tag() {
    let engine = FakeEngine::new();
    engine.on_eval("Register(PC)", "0x1000", ResultType::Hexadecimal.tag());
    engine.on_eval("STATE.RUN()", "FALSE()", ResultType::Boolean.tag());
    engine.on_eval("Var.VALUE(count)", "-12.", ResultType::Decimal.tag());
    engine.on_eval("OS.PWD()", "C:\\work", ResultType::String.tag());
    let mut session = connect(&engine).await;

    assert_eq!(
        session.evaluate("Register(PC)").await.unwrap(),
        Value::Int(0x1000)
    );
    assert_eq!(
        session.evaluate("STATE.RUN()").await.unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        session.evaluate("Var.VALUE(count)").await.unwrap(),
        Value::Int(-12)
    );
    assert_eq!(
        session.evaluate("OS.PWD()").await.unwrap(),
        Value::Text("C:\\work".to_string())
    );
}

#[tokio::test]
async fn unknown_type_tag_is_a_decode_error() {
    let engine = FakeEngine::new();
    engine.on_eval("Odd()", "1", 0x2000);
    let mut session = connect(&engine).await;

    let raw = session.evaluate_raw("Odd()").await.expect("raw result");
    assert_eq!(raw.tag, 0x2000);
    let err = session.evaluate("Odd()").await.unwrap_err();
    assert!(matches!(err, T32Error::Decode(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn statement_falls_back_to_command() {
    let engine = FakeEngine::new();
    engine.on_eval("1+1", "2.", ResultType::Decimal.tag());
    engine.on_command("Break.Set main", CommandResponse::output(&["breakpoint set\n"]));
    let mut session = connect(&engine).await;

    assert_eq!(session.execute_statement("1+1").await.unwrap(), "2");
    assert_eq!(
        session.execute_statement("Break.Set main").await.unwrap(),
        "breakpoint set\n"
    );
    assert_eq!(engine.count_calls("T32_ExecuteCommand Break.Set main"), 1);
}

#[tokio::test]
async fn memory_access_picks_address_width() {
    let engine = FakeEngine::new();
    engine.set_memory(0x100, &[1, 2, 3, 4]);
    let mut session = connect(&engine).await;

    assert_eq!(
        session.read_memory(0x100, 4, None).await.unwrap(),
        vec![1, 2, 3, 4]
    );
    session
        .write_memory(0x1_0000_0000, &[9, 9], None)
        .await
        .unwrap();
    assert_eq!(engine.memory(0x1_0000_0000, 2), vec![9, 9]);

    let calls = engine.calls();
    assert!(calls.contains(&"T32_ReadMemory 0x100 32 4".to_string()));
    assert!(calls.contains(&"T32_WriteMemory 0x100000000 64 2".to_string()));
}

#[tokio::test]
async fn failed_memory_read_is_call_failure() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;
    engine.fail_reads(1);

    let err = session.read_memory(0x20, 4, None).await.unwrap_err();
    assert!(
        matches!(&err, T32Error::CallFailure { call, .. } if call.starts_with("T32_ReadMemory(")),
        "unexpected error: {err:?}"
    );
    assert!(!err.is_communication());
}

#[tokio::test]
async fn operations_after_disconnect_are_rejected() {
    let engine = FakeEngine::new();
    let mut session = connect(&engine).await;
    session.disconnect(DisconnectMode::Forced).await.unwrap();

    let err = session.run_command("PRINT 1").await.unwrap_err();
    assert!(matches!(err, T32Error::NotConnected));
    let err = session.evaluate("1").await.unwrap_err();
    assert!(matches!(err, T32Error::NotConnected));
}
