use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{DriverError, Res};
use crate::eval::{Bound, EvalValue, VALUE_MAX_MATE_PLY};
use crate::log;
use crate::scanner::Scanner;
use crate::state::{EngineOptions, EngineState, Turn};
use crate::think::{ThinkPV, ThinkResult};

/// Protocol state plus the auxiliary fields a caller blocking on a one-line
/// response needs, all under one lock so a state check and a condvar wait
/// can never straddle a lost wakeup.
struct DriverState {
    engine_state: EngineState,
    last_line: Option<String>,
    line_seq: u64,
}

struct Shared {
    state: Mutex<DriverState>,
    cv: Condvar,
    think: Mutex<ThinkResult>,
    exit_state: Mutex<Option<String>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(DriverState {
                engine_state: EngineState::WaitConnecting,
                last_line: None,
                line_seq: 0,
            }),
            cv: Condvar::new(),
            think: Mutex::new(ThinkResult::new()),
            exit_state: Mutex::new(None),
        }
    }

    fn get_state(&self) -> EngineState {
        self.state.lock().unwrap().engine_state
    }

    fn line_seq(&self) -> u64 {
        self.state.lock().unwrap().line_seq
    }

    /// The single chokepoint every transition goes through: ignores an
    /// attempted change once disconnected, and refuses to enter
    /// `WaitBestmove` from anything but `WaitCommand`.
    fn change_state(&self, new: EngineState) {
        let mut guard = self.state.lock().unwrap();
        if guard.engine_state == EngineState::Disconnected {
            return;
        }
        if new == EngineState::WaitBestmove && guard.engine_state != EngineState::WaitCommand {
            return;
        }
        guard.engine_state = new;
        self.cv.notify_all();
    }

    fn force_disconnected(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.engine_state = EngineState::Disconnected;
        self.cv.notify_all();
    }

    fn wait_for_state(&self, target: EngineState) -> Res<()> {
        let mut guard = self.state.lock().unwrap();
        while guard.engine_state != target {
            if guard.engine_state == EngineState::Disconnected {
                return Err(DriverError::DisconnectedWhileWaiting(format!("{target:?}")));
            }
            guard = self.cv.wait(guard).unwrap();
        }
        Ok(())
    }

    /// Records a one-line extension-command response (`moves`/`side`) and
    /// returns to `WaitCommand`, bumping `line_seq` so a waiter that
    /// snapshotted the sequence before sending can't miss a transient visit
    /// to `WaitOneLine`.
    fn complete_one_line(&self, line: String) {
        let mut guard = self.state.lock().unwrap();
        if guard.engine_state == EngineState::Disconnected {
            return;
        }
        guard.last_line = Some(line);
        guard.line_seq = guard.line_seq.wrapping_add(1);
        guard.engine_state = EngineState::WaitCommand;
        self.cv.notify_all();
    }

    fn recv_one_line(&self, after_seq: u64) -> Res<String> {
        let mut guard = self.state.lock().unwrap();
        while guard.line_seq == after_seq {
            if guard.engine_state == EngineState::Disconnected {
                return Err(DriverError::DisconnectedWhileWaiting("one-line response".to_string()));
            }
            guard = self.cv.wait(guard).unwrap();
        }
        Ok(guard.last_line.clone().unwrap_or_default())
    }
}

/// Drives one external USI engine subprocess: spawns it, serializes commands
/// from any number of caller threads onto its stdin, and parses its stdout
/// into a protocol state machine plus a running `ThinkResult`.
pub struct EngineDriver {
    shared: Arc<Shared>,
    sender: Sender<String>,
    receiver: Mutex<Option<Receiver<String>>>,
    child: Arc<Mutex<Option<Child>>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    options: Mutex<EngineOptions>,
    instance_id: usize,
}

impl Default for EngineDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineDriver {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            shared: Arc::new(Shared::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            child: Arc::new(Mutex::new(None)),
            reader_handle: Mutex::new(None),
            writer_handle: Mutex::new(None),
            options: Mutex::new(EngineOptions::new()),
            instance_id: log::next_instance_id(),
        }
    }

    /// Must be called before `connect`; replayed as `setoption` lines once
    /// the subprocess is up.
    pub fn set_options(&self, options: EngineOptions) {
        *self.options.lock().unwrap() = options;
    }

    pub fn state(&self) -> EngineState {
        self.shared.get_state()
    }

    pub fn is_connected(&self) -> bool {
        self.child.lock().unwrap().is_some() && self.state() != EngineState::Disconnected
    }

    pub fn last_exit_diagnostic(&self) -> Option<String> {
        self.shared.exit_state.lock().unwrap().clone()
    }

    pub fn connect(&self, path: impl AsRef<Path>) -> Res<()> {
        self.connect_with_args(path, &[])
    }

    /// Like `connect`, but forwards `args` to the spawned process. Useful
    /// for engines that need startup flags, and for pointing a single test
    /// helper binary at different scripted behaviors without relying on
    /// global process state such as environment variables.
    pub fn connect_with_args(&self, path: impl AsRef<Path>, args: &[&str]) -> Res<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DriverError::NotFound(path.display().to_string()));
        }
        self.shared.change_state(EngineState::WaitConnecting);

        let mut command = Command::new(path);
        command.args(args);
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DriverError::ConnectionError(e.to_string()))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        *self.child.lock().unwrap() = Some(child);
        self.shared.change_state(EngineState::Connected);

        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| DriverError::InvalidState("driver is already connected".to_string()))?;
        let options = self.options.lock().unwrap().clone();

        let shared_w = Arc::clone(&self.shared);
        let writer = thread::Builder::new()
            .name(format!("usi-writer-{}", self.instance_id))
            .spawn(move || writer_loop(&shared_w, &receiver, stdin, &options))
            .map_err(|e| DriverError::ConnectionError(e.to_string()))?;
        *self.writer_handle.lock().unwrap() = Some(writer);

        let shared_r = Arc::clone(&self.shared);
        let child_r = Arc::clone(&self.child);
        let instance_id = self.instance_id;
        let reader = thread::Builder::new()
            .name(format!("usi-reader-{instance_id}"))
            .spawn(move || reader_loop(&shared_r, stdout, &child_r, instance_id))
            .map_err(|e| DriverError::ConnectionError(e.to_string()))?;
        *self.reader_handle.lock().unwrap() = Some(reader);

        self.shared.wait_for_state(EngineState::WaitCommand)
    }

    pub fn send_command(&self, line: impl Into<String>) {
        let _ = self.sender.send(line.into());
    }

    pub fn wait_for_state(&self, target: EngineState) -> Res<()> {
        self.shared.wait_for_state(target)
    }

    pub fn think_result(&self) -> ThinkResult {
        self.shared.think.lock().unwrap().clone()
    }

    pub fn send_command_and_getline(&self, cmd: &str) -> Res<String> {
        if self.state() != EngineState::WaitCommand {
            return Err(DriverError::InvalidState(format!("'{cmd}' requires WaitCommand, got {:?}", self.state())));
        }
        let seq = self.shared.line_seq();
        self.send_command(cmd);
        self.shared.recv_one_line(seq)
    }

    pub fn usi_position(&self, sfen: &str) {
        self.send_command(format!("position {sfen}"));
    }

    pub fn usi_go(&self, args: &str) -> Res<()> {
        if self.state() != EngineState::WaitCommand {
            return Err(DriverError::InvalidState(format!("go requires WaitCommand, got {:?}", self.state())));
        }
        *self.shared.think.lock().unwrap() = ThinkResult::new();
        self.send_command(format!("go {args}"));
        Ok(())
    }

    fn go_and_wait(&self, args: &str) -> Res<ThinkResult> {
        self.usi_go(args)?;
        self.shared.wait_for_state(EngineState::WaitCommand)?;
        Ok(self.think_result())
    }

    pub fn usi_go_and_wait_bestmove(&self, args: &str) -> Res<ThinkResult> {
        self.go_and_wait(args)
    }

    pub fn usi_go_and_wait_checkmate(&self, args: &str) -> Res<ThinkResult> {
        self.go_and_wait(args)
    }

    /// Best-effort: dropped by the writer unless a search is in flight, and
    /// does not itself wake any waiter.
    pub fn usi_stop(&self) {
        self.send_command("stop");
    }

    pub fn get_moves(&self) -> Res<String> {
        self.send_command_and_getline("moves")
    }

    pub fn get_side_to_move(&self) -> Res<Turn> {
        let line = self.send_command_and_getline("side")?;
        Ok(if line.trim() == "black" { Turn::Black } else { Turn::White })
    }

    /// Sends `quit`, gives the engine up to five seconds to exit on its
    /// own, then kills the process. Idempotent.
    pub fn disconnect(&self) {
        if self.state() == EngineState::Disconnected && self.child.lock().unwrap().is_none() {
            return;
        }
        self.send_command("quit");

        if let Some(handle) = self.writer_handle.lock().unwrap().take() {
            let _ = handle.join();
        }

        if let Some(mut child) = self.child.lock().unwrap().take() {
            let start = Instant::now();
            let mut exited = false;
            while start.elapsed() < Duration::from_millis(5000) {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    exited = true;
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
            if !exited {
                let _ = child.kill();
            }
            let _ = child.wait();
        }

        if let Some(handle) = self.reader_handle.lock().unwrap().take() {
            let _ = handle.join();
        }

        self.shared.force_disconnected();
    }
}

impl Drop for EngineDriver {
    fn drop(&mut self) {
        if self.child.lock().unwrap().is_some() {
            self.disconnect();
        }
    }
}

fn writer_loop(shared: &Shared, receiver: &Receiver<String>, mut stdin: ChildStdin, options: &EngineOptions) {
    for (name, value) in options.iter() {
        if writeln!(stdin, "setoption name {name} value {value}").is_err() {
            *shared.exit_state.lock().unwrap() = Some(format!("write failed sending setoption {name}"));
            return;
        }
    }
    shared.change_state(EngineState::WaitReadyOk);
    if writeln!(stdin, "isready").is_err() {
        *shared.exit_state.lock().unwrap() = Some("write failed sending isready".to_string());
        return;
    }
    let _ = stdin.flush();

    while let Ok(line) = receiver.recv() {
        let head = line.split_whitespace().next().unwrap_or("");

        match head {
            "stop" => {
                if shared.get_state() != EngineState::WaitBestmove {
                    continue;
                }
            }
            "go" | "position" | "moves" | "side" | "usinewgame" | "gameover" => {
                if shared.wait_for_state(EngineState::WaitCommand).is_err() {
                    return;
                }
            }
            _ => {}
        }

        if writeln!(stdin, "{line}").is_err() {
            *shared.exit_state.lock().unwrap() = Some(format!("write failed for '{line}'"));
            return;
        }
        let _ = stdin.flush();

        match head {
            "go" => shared.change_state(EngineState::WaitBestmove),
            "moves" | "side" => shared.change_state(EngineState::WaitOneLine),
            "quit" => {
                shared.force_disconnected();
                return;
            }
            _ => {}
        }
    }
}

fn reader_loop(shared: &Shared, stdout: ChildStdout, child: &Mutex<Option<Child>>, instance_id: usize) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = String::new();
        let n = match reader.read_line(&mut line) {
            Ok(n) => n,
            Err(_) => break,
        };
        if n == 0 {
            let still_running =
                child.lock().unwrap().as_mut().map(|c| matches!(c.try_wait(), Ok(None))).unwrap_or(false);
            if still_running {
                continue;
            }
            *shared.exit_state.lock().unwrap() = Some("0".to_string());
            shared.force_disconnected();
            break;
        }
        let line = line.trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        dispatch_line(shared, &line, instance_id);
    }
}

fn dispatch_line(shared: &Shared, line: &str, instance_id: usize) {
    if shared.get_state() == EngineState::WaitOneLine {
        shared.complete_one_line(line.to_string());
        return;
    }

    let head = line.split_whitespace().next().unwrap_or("");
    match head {
        "readyok" => shared.change_state(EngineState::WaitCommand),
        "bestmove" => {
            handle_bestmove(shared, line);
            shared.change_state(EngineState::WaitCommand);
        }
        "info" => handle_info(shared, line, instance_id),
        "checkmate" => {
            let rest = line.splitn(2, ' ').nth(1).unwrap_or("").to_string();
            shared.think.lock().unwrap().checkmate = Some(rest);
            shared.change_state(EngineState::WaitCommand);
        }
        _ => {}
    }
}

fn handle_bestmove(shared: &Shared, line: &str) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut think = shared.think.lock().unwrap();
    if tokens.len() < 2 {
        think.bestmove = Some("none".to_string());
        return;
    }
    think.bestmove = Some(tokens[1].to_string());
    if tokens.len() >= 4 && tokens[2] == "ponder" {
        think.ponder = Some(tokens[3].to_string());
    }
}

fn handle_info(shared: &Shared, line: &str, instance_id: usize) {
    let mut sc = Scanner::new(line);
    let _ = sc.get(); // "info"
    let mut pv = ThinkPV::default();
    let mut multipv: usize = 1;

    while !sc.is_eof() {
        let Some(key) = sc.get() else { break };
        match key.as_str() {
            "string" => break,
            "depth" => pv.depth = sc.get_int(),
            "seldepth" => pv.seldepth = sc.get_int(),
            "nodes" => pv.nodes = sc.get_int(),
            "nps" => pv.nps = sc.get_int(),
            "hashfull" => pv.hashfull = sc.get_int(),
            "time" => pv.time = sc.get_int(),
            "multipv" => multipv = sc.get_int().unwrap_or(1).max(1) as usize,
            "pv" => pv.pv = Some(sc.rest()),
            "score" => parse_score(&mut sc, &mut pv, instance_id, line),
            other => log_parse_error(instance_id, other, line),
        }
    }

    shared.think.lock().unwrap().set_pv(multipv, pv);
}

fn parse_score(sc: &mut Scanner, pv: &mut ThinkPV, instance_id: usize, line: &str) {
    let Some(kind) = sc.get() else { return };
    match kind.as_str() {
        "mate" => {
            let ply_tok = sc.peek().map(str::to_string);
            let negative = ply_tok.as_deref().is_some_and(|t| t.starts_with('-'));
            let digits = ply_tok.as_deref().unwrap_or("").trim_start_matches('-');
            let ply = digits.parse::<i64>().unwrap_or(VALUE_MAX_MATE_PLY);
            if ply_tok.is_some() {
                sc.get();
            }
            pv.eval = Some(if negative { EvalValue::mated_in(ply) } else { EvalValue::mate_in(ply) });
        }
        "cp" => pv.eval = sc.get_int().map(EvalValue::new),
        other => log_parse_error(instance_id, other, line),
    }
    match sc.peek() {
        Some("upperbound") => {
            pv.bound = Bound::Upper;
            sc.get();
        }
        Some("lowerbound") => {
            pv.bound = Bound::Lower;
            sc.get();
        }
        _ => pv.bound = Bound::Exact,
    }
}

fn log_parse_error(instance_id: usize, token: &str, line: &str) {
    log::singleton().print(&format!("[driver {instance_id}] unrecognized token '{token}' in '{line}'"), false, true, true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_rejects_wait_bestmove_from_wrong_state() {
        let shared = Shared::new();
        shared.change_state(EngineState::Connected);
        shared.change_state(EngineState::WaitBestmove);
        assert_eq!(shared.get_state(), EngineState::Connected);
    }

    #[test]
    fn state_machine_allows_wait_bestmove_from_wait_command() {
        let shared = Shared::new();
        shared.change_state(EngineState::WaitCommand);
        shared.change_state(EngineState::WaitBestmove);
        assert_eq!(shared.get_state(), EngineState::WaitBestmove);
    }

    #[test]
    fn disconnected_is_sticky() {
        let shared = Shared::new();
        shared.force_disconnected();
        shared.change_state(EngineState::WaitCommand);
        assert_eq!(shared.get_state(), EngineState::Disconnected);
    }

    #[test]
    fn handle_bestmove_with_no_move_records_none() {
        let shared = Shared::new();
        handle_bestmove(&shared, "bestmove");
        assert_eq!(shared.think.lock().unwrap().bestmove.as_deref(), Some("none"));
    }

    #[test]
    fn handle_bestmove_with_ponder() {
        let shared = Shared::new();
        handle_bestmove(&shared, "bestmove 8c8d ponder 2g2f");
        let think = shared.think.lock().unwrap();
        assert_eq!(think.bestmove.as_deref(), Some("8c8d"));
        assert_eq!(think.ponder.as_deref(), Some("2g2f"));
    }

    #[test]
    fn info_parses_cp_score_and_pv() {
        let shared = Shared::new();
        handle_info(&shared, "info depth 10 score cp 42 pv 8c8d", 0);
        let think = shared.think.lock().unwrap();
        let pv = think.pvs[0].as_ref().unwrap();
        assert_eq!(pv.depth, Some(10));
        assert_eq!(pv.eval, Some(EvalValue::new(42)));
        assert_eq!(pv.bound, Bound::Exact);
        assert_eq!(pv.pv.as_deref(), Some("8c8d"));
    }

    #[test]
    fn info_parses_mate_score() {
        let shared = Shared::new();
        handle_info(&shared, "info depth 5 score mate 3 pv 2h3h 4a4b 3h3a", 0);
        let think = shared.think.lock().unwrap();
        let pv = think.pvs[0].as_ref().unwrap();
        assert_eq!(pv.eval, Some(EvalValue::mate_in(3)));
        assert_eq!(pv.eval.unwrap().to_string(), "mate 3");
    }

    #[test]
    fn info_tolerates_missing_mate_ply_and_stops_at_string() {
        let shared = Shared::new();
        handle_info(&shared, "info depth 1 nodes 0 time 0 score mate + string Nyugyoku", 0);
        let think = shared.think.lock().unwrap();
        let pv = think.pvs[0].as_ref().unwrap();
        assert_eq!(pv.eval, Some(EvalValue::mate_in(VALUE_MAX_MATE_PLY)));
        assert_eq!(pv.depth, Some(1));
    }

    #[test]
    fn info_handles_multipv() {
        let shared = Shared::new();
        handle_info(&shared, "info multipv 1 depth 10 score cp 10 pv 7g7f", 0);
        handle_info(&shared, "info multipv 2 depth 10 score cp 5 pv 2g2f", 0);
        let think = shared.think.lock().unwrap();
        assert_eq!(think.pvs.len(), 2);
        assert_eq!(think.pvs[0].as_ref().unwrap().eval, Some(EvalValue::new(10)));
        assert_eq!(think.pvs[1].as_ref().unwrap().eval, Some(EvalValue::new(5)));
    }

    #[test]
    fn info_with_bound_suffix() {
        let shared = Shared::new();
        handle_info(&shared, "info depth 3 score cp 12 upperbound", 0);
        let think = shared.think.lock().unwrap();
        assert_eq!(think.pvs[0].as_ref().unwrap().bound, Bound::Upper);
    }

    #[test]
    fn checkmate_extracts_remainder() {
        let shared = Shared::new();
        dispatch_line(&shared, "checkmate 7g7f 3c3d", 0);
        assert_eq!(shared.think.lock().unwrap().checkmate.as_deref(), Some("7g7f 3c3d"));
        assert_eq!(shared.get_state(), EngineState::WaitCommand);
    }
}
