//! In-process stand-in for the engine's remote API.
//!
//! A [`FakeEngine`] holds the engine-side state every channel shares: the
//! output window (mirrored into a [`MemoryPipe`]), the message line, the
//! script interpreter and target memory. [`FakeConnector`] hands out one
//! [`FakeApi`] per channel, so probes and watchers behave like separate
//! clients of the same engine.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use t32ctl::output::MemoryPipe;
use t32ctl::session::InterruptHandle;
use t32ctl::rpc::{
    AddressWidth, CallFuture, ConfigKey, Connector, DeviceKind, MessageKinds, RemotePrimitives,
};
use t32ctl::session::window::MESSAGE_AREA;
use t32ctl::status::codes;
use tracing::{debug, trace};

/// What the engine does when a given command is executed.
#[derive(Debug, Clone, Default)]
pub struct CommandResponse {
    pub output: Vec<Vec<u8>>,
    pub message: Option<(String, MessageKinds)>,
    pub status: i32,
    pub reply: String,
}

impl CommandResponse {
    /// Print `chunks` into the output window, one pipe write each.
    pub fn output(chunks: &[&str]) -> Self {
        Self {
            output: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, text: &str, kinds: MessageKinds) -> Self {
        self.message = Some((text.to_string(), kinds));
        self
    }

    /// Reject the command at the primitive level.
    pub fn failing(status: i32, reply: &str) -> Self {
        Self {
            status,
            reply: reply.to_string(),
            ..Self::default()
        }
    }
}

/// Behaviour of the next script submitted with `DO`.
#[derive(Debug, Clone, Default)]
pub struct ScriptPlan {
    /// Interpreter state polls answered with "running".
    pub busy_polls: u32,
    /// Output written while running, one chunk per busy poll; leftovers are
    /// written when the interpreter goes idle.
    pub output: Vec<Vec<u8>>,
    /// Output the engine only flushes once a client reconnects.
    pub late_output: Vec<u8>,
    /// Message line left behind by the script.
    pub message: Option<(String, MessageKinds)>,
    /// Status returned for the `DO` submission itself.
    pub status: i32,
    pub reply: String,
}

impl ScriptPlan {
    pub fn running_for(polls: u32) -> Self {
        Self {
            busy_polls: polls,
            ..Self::default()
        }
    }

    pub fn output(mut self, chunk: &[u8]) -> Self {
        self.output.push(chunk.to_vec());
        self
    }

    pub fn late_output(mut self, bytes: &[u8]) -> Self {
        self.late_output = bytes.to_vec();
        self
    }

    pub fn with_message(mut self, text: &str, kinds: MessageKinds) -> Self {
        self.message = Some((text.to_string(), kinds));
        self
    }

    pub fn rejected(status: i32, reply: &str) -> Self {
        Self {
            status,
            reply: reply.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct RunningScript {
    polls_left: u32,
    output: VecDeque<Vec<u8>>,
    late_output: Vec<u8>,
    message: Option<(String, MessageKinds)>,
}

#[derive(Debug, Default)]
struct EngineState {
    window: Option<String>,
    message: (String, u16),
    responses: HashMap<String, CommandResponse>,
    scripts: VecDeque<ScriptPlan>,
    running: Option<RunningScript>,
    late_output: Option<Vec<u8>>,
    evals: HashMap<String, (i32, String, u32)>,
    memory: BTreeMap<u64, u8>,
    read_failures: u32,
    write_failures: u32,
    corrupt_writes: u32,
    calls: Vec<String>,
    open_channels: usize,
    unreachable: bool,
    hang_init: bool,
    init_failures: u32,
    terminated: Option<i32>,
    stops: u32,
    stop_status: i32,
    interrupt_on_submit: Option<InterruptHandle>,
}

enum InitOutcome {
    Hang,
    Status(i32),
}

/// Shared engine state. Cloning yields another handle to the same engine.
#[derive(Debug, Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
    pipe: MemoryPipe,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState::default())),
            pipe: MemoryPipe::new("/virtual/t32ctl/area.fifo"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    /// The pipe the engine writes its output window into.
    pub fn pipe(&self) -> MemoryPipe {
        self.pipe.clone()
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            engine: self.clone(),
        }
    }

    pub fn on_command(&self, text: &str, response: CommandResponse) {
        self.lock().responses.insert(text.to_string(), response);
    }

    pub fn queue_script(&self, plan: ScriptPlan) {
        self.lock().scripts.push_back(plan);
    }

    pub fn on_eval(&self, expression: &str, text: &str, tag: u32) {
        self.lock()
            .evals
            .insert(expression.to_string(), (0, text.to_string(), tag));
    }

    pub fn set_memory(&self, address: u64, bytes: &[u8]) {
        let mut state = self.lock();
        for (offset, byte) in bytes.iter().enumerate() {
            state.memory.insert(address + offset as u64, *byte);
        }
    }

    pub fn memory(&self, address: u64, len: usize) -> Vec<u8> {
        let state = self.lock();
        read_bytes(&state.memory, address, len)
    }

    /// Fail the next `count` memory reads with a call failure.
    pub fn fail_reads(&self, count: u32) {
        self.lock().read_failures = count;
    }

    pub fn fail_writes(&self, count: u32) {
        self.lock().write_failures = count;
    }

    /// Corrupt the first byte of the next `count` writes after storing them.
    pub fn corrupt_writes(&self, count: u32) {
        self.lock().corrupt_writes = count;
    }

    /// Refuse every connection attempt with a transmit failure.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Never answer `init`.
    pub fn hang_init(&self) {
        self.lock().hang_init = true;
    }

    pub fn fail_inits(&self, count: u32) {
        self.lock().init_failures = count;
    }

    /// Answer every `stop` with `status`, leaving the interpreter running.
    pub fn fail_stops(&self, status: i32) {
        self.lock().stop_status = status;
    }

    /// Fire `handle` while the next `DO` submission is being handled.
    pub fn interrupt_on_submit(&self, handle: InterruptHandle) {
        self.lock().interrupt_on_submit = Some(handle);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Channels that completed `init` and have not exited yet.
    pub fn open_channels(&self) -> usize {
        self.lock().open_channels
    }

    pub fn window(&self) -> Option<String> {
        self.lock().window.clone()
    }

    pub fn message(&self) -> (String, u16) {
        self.lock().message.clone()
    }

    pub fn terminated(&self) -> Option<i32> {
        self.lock().terminated
    }

    pub fn stops(&self) -> u32 {
        self.lock().stops
    }

    pub fn script_running(&self) -> bool {
        self.lock().running.is_some()
    }

    fn record(&self, call: String) {
        trace!(%call, "fake engine call");
        self.lock().calls.push(call);
    }

    fn begin_init(&self) -> InitOutcome {
        let mut state = self.lock();
        state.calls.push("T32_Init".to_string());
        if state.unreachable {
            debug!("fake engine refusing connection");
            return InitOutcome::Status(codes::T32_ERR_COM_TRANSMIT_FAIL);
        }
        if state.hang_init {
            return InitOutcome::Hang;
        }
        if state.init_failures > 0 {
            state.init_failures -= 1;
            return InitOutcome::Status(codes::T32_ERR_COM_RECEIVE_FAIL);
        }
        state.open_channels += 1;
        if let Some(late) = state.late_output.take() {
            self.pipe.push(&late);
        }
        InitOutcome::Status(0)
    }

    fn close_channel(&self) {
        let mut state = self.lock();
        state.calls.push("T32_Exit".to_string());
        state.open_channels = state.open_channels.saturating_sub(1);
    }

    fn handle_cmd(&self, text: &str) -> i32 {
        let mut state = self.lock();
        state.calls.push(format!("T32_Cmd {text}"));

        if let Some(rest) = text.strip_prefix("PRINT %AREA ") {
            let Some((area, body)) = rest.split_once(' ') else {
                return codes::T32_ERR_STD_INVALID;
            };
            let body = body.trim().trim_matches('"');
            if area == MESSAGE_AREA {
                state.message = (body.to_string(), MessageKinds::GENERAL_INFO.bits());
            } else if state.window.as_deref() == Some(area) {
                self.pipe.push(format!("{body}\n").as_bytes());
            }
            return 0;
        }
        if let Some(rest) = text.strip_prefix("AREA.Create ") {
            state.window = rest.split_whitespace().next().map(str::to_string);
            return 0;
        }
        if let Some(rest) = text.strip_prefix("AREA.Delete ") {
            if state.window.as_deref() == Some(rest.trim()) {
                state.window = None;
            }
            return 0;
        }
        if text.starts_with("AREA.") {
            return 0;
        }

        let response = state.responses.get(text).cloned().unwrap_or_default();
        self.apply(&mut state, &response);
        response.status
    }

    fn handle_execute(&self, text: &str) -> (i32, String) {
        let mut state = self.lock();
        state.calls.push(format!("T32_ExecuteCommand {text}"));

        if text.starts_with("DO ") {
            if let Some(handle) = state.interrupt_on_submit.take() {
                handle.interrupt();
            }
            let plan = state.scripts.pop_front().unwrap_or_default();
            debug!(
                busy_polls = plan.busy_polls,
                status = plan.status,
                "fake engine starting script"
            );
            if plan.status != 0 {
                return (plan.status, plan.reply);
            }
            state.running = Some(RunningScript {
                polls_left: plan.busy_polls,
                output: plan.output.into(),
                late_output: plan.late_output,
                message: plan.message,
            });
            return (0, String::new());
        }

        let response = state.responses.get(text).cloned().unwrap_or_default();
        self.apply(&mut state, &response);
        (response.status, response.reply)
    }

    fn apply(&self, state: &mut EngineState, response: &CommandResponse) {
        if response.status != 0 {
            return;
        }
        for chunk in &response.output {
            self.pipe.push(chunk);
        }
        if let Some((text, kinds)) = &response.message {
            state.message = (text.clone(), kinds.bits());
        }
    }

    fn handle_eval(&self, expression: &str) -> (i32, String, u32) {
        let mut state = self.lock();
        state.calls.push(format!("T32_ExecuteFunction {expression}"));
        state.evals.get(expression).cloned().unwrap_or_else(|| {
            (
                codes::T32_ERR_EXECUTEFUNCTION_FAIL,
                format!("unknown function or symbol '{expression}'"),
                0,
            )
        })
    }

    fn poll_practice_state(&self) -> (i32, i32) {
        let mut state = self.lock();
        state.calls.push("T32_GetPracticeState".to_string());

        let Some(running) = state.running.as_mut() else {
            return (0, 0);
        };
        if running.polls_left > 0 {
            running.polls_left -= 1;
            if let Some(chunk) = running.output.pop_front() {
                self.pipe.push(&chunk);
            }
            return (0, 1);
        }

        if let Some(finished) = state.running.take() {
            for chunk in &finished.output {
                self.pipe.push(chunk);
            }
            if !finished.late_output.is_empty() {
                state.late_output = Some(finished.late_output);
            }
            if let Some((text, kinds)) = finished.message {
                state.message = (text, kinds.bits());
            }
        }
        (0, 0)
    }

    fn handle_terminate(&self, exit_code: i32) -> i32 {
        let mut state = self.lock();
        state.calls.push(format!("T32_Terminate {exit_code}"));
        state.terminated = Some(exit_code);
        0
    }

    fn handle_stop(&self) -> i32 {
        let mut state = self.lock();
        state.calls.push("T32_Stop".to_string());
        if state.stop_status != 0 {
            return state.stop_status;
        }
        state.stops += 1;
        state.running = None;
        0
    }

    fn handle_read(&self, address: u64, width: AddressWidth, len: usize) -> (i32, Vec<u8>) {
        let mut state = self.lock();
        state
            .calls
            .push(format!("T32_ReadMemory {address:#x} {} {len}", width.bits()));
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return (codes::T32_ERR_STD_FAILED, Vec::new());
        }
        (0, read_bytes(&state.memory, address, len))
    }

    fn handle_write(&self, address: u64, width: AddressWidth, data: &[u8]) -> i32 {
        let mut state = self.lock();
        state.calls.push(format!(
            "T32_WriteMemory {address:#x} {} {}",
            width.bits(),
            data.len()
        ));
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return codes::T32_ERR_STD_FAILED;
        }
        for (offset, byte) in data.iter().enumerate() {
            state.memory.insert(address + offset as u64, *byte);
        }
        if state.corrupt_writes > 0 && !data.is_empty() {
            state.corrupt_writes -= 1;
            if let Some(byte) = state.memory.get_mut(&address) {
                *byte ^= 0xFF;
            }
        }
        0
    }
}

fn read_bytes(memory: &BTreeMap<u64, u8>, address: u64, len: usize) -> Vec<u8> {
    (0..len as u64)
        .map(|offset| memory.get(&(address + offset)).copied().unwrap_or(0))
        .collect()
}

#[derive(Debug, Clone)]
pub struct FakeConnector {
    engine: FakeEngine,
}

impl Connector for FakeConnector {
    type Api = FakeApi;

    fn open(&self) -> FakeApi {
        FakeApi {
            engine: self.engine.clone(),
            open: false,
        }
    }
}

/// One client channel to a [`FakeEngine`].
#[derive(Debug)]
pub struct FakeApi {
    engine: FakeEngine,
    open: bool,
}

impl RemotePrimitives for FakeApi {
    fn config<'a>(&'a mut self, key: ConfigKey, value: &'a str) -> CallFuture<'a, i32> {
        Box::pin(async move {
            self.engine.record(format!("T32_Config {key}{value}"));
            0
        })
    }

    fn init(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move {
            match self.engine.begin_init() {
                InitOutcome::Hang => std::future::pending::<i32>().await,
                InitOutcome::Status(status) => {
                    if status == 0 {
                        self.open = true;
                    }
                    status
                }
            }
        })
    }

    fn attach(&mut self, device: DeviceKind) -> CallFuture<'_, i32> {
        Box::pin(async move {
            self.engine.record(format!("T32_Attach {}", device.code()));
            0
        })
    }

    fn exit(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move {
            if self.open {
                self.open = false;
                self.engine.close_channel();
            }
            0
        })
    }

    fn ping(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move {
            self.engine.record("T32_Ping".to_string());
            0
        })
    }

    fn nop(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move {
            self.engine.record("T32_Nop".to_string());
            0
        })
    }

    fn cmd<'a>(&'a mut self, text: &'a str) -> CallFuture<'a, i32> {
        Box::pin(async move { self.engine.handle_cmd(text) })
    }

    fn execute_command<'a>(
        &'a mut self,
        text: &'a str,
        _capacity: usize,
    ) -> CallFuture<'a, (i32, String)> {
        Box::pin(async move { self.engine.handle_execute(text) })
    }

    fn execute_function<'a>(
        &'a mut self,
        expression: &'a str,
        _capacity: usize,
    ) -> CallFuture<'a, (i32, String, u32)> {
        Box::pin(async move { self.engine.handle_eval(expression) })
    }

    fn get_message_string(&mut self) -> CallFuture<'_, (i32, String, u16)> {
        Box::pin(async move {
            let (text, kinds) = self.engine.message();
            (0, text, kinds)
        })
    }

    fn get_practice_state(&mut self) -> CallFuture<'_, (i32, i32)> {
        Box::pin(async move { self.engine.poll_practice_state() })
    }

    fn terminate(&mut self, exit_code: i32) -> CallFuture<'_, i32> {
        Box::pin(async move { self.engine.handle_terminate(exit_code) })
    }

    fn stop(&mut self) -> CallFuture<'_, i32> {
        Box::pin(async move { self.engine.handle_stop() })
    }

    fn read_memory(
        &mut self,
        address: u64,
        width: AddressWidth,
        len: usize,
    ) -> CallFuture<'_, (i32, Vec<u8>)> {
        Box::pin(async move { self.engine.handle_read(address, width, len) })
    }

    fn write_memory<'a>(
        &'a mut self,
        address: u64,
        width: AddressWidth,
        data: &'a [u8],
    ) -> CallFuture<'a, i32> {
        Box::pin(async move { self.engine.handle_write(address, width, data) })
    }
}
