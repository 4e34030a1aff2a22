use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::driver::EngineDriver;
use crate::error::{DriverError, Res};
use crate::log;
use crate::state::{EngineOptions, GameResult, Turn};

/// Parsed `time ... byoyomi ... inc ...` time control, all fields in
/// milliseconds, indexed by `Turn as usize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeControl {
    pub time: [i64; 2],
    pub byoyomi: [i64; 2],
    pub inc: [i64; 2],
}

impl TimeControl {
    pub fn parse(spec: &str) -> Res<Self> {
        let mut tc = TimeControl::default();
        let tokens: Vec<&str> = spec.split_whitespace().collect();
        let mut i = 0;
        while i < tokens.len() {
            let key = tokens[i];
            let value_str =
                tokens.get(i + 1).ok_or_else(|| DriverError::InvalidTime(format!("missing value for '{key}'")))?;
            let value: i64 =
                value_str.parse().map_err(|_| DriverError::InvalidTime(format!("non-numeric value '{value_str}'")))?;
            match key {
                "time" => tc.time = [value, value],
                "time1p" => tc.time[0] = value,
                "time2p" => tc.time[1] = value,
                "byoyomi" => tc.byoyomi = [value, value],
                "byoyomi1p" => tc.byoyomi[0] = value,
                "byoyomi2p" => tc.byoyomi[1] = value,
                "inc" => tc.inc = [value, value],
                "inc1p" => tc.inc[0] = value,
                "inc2p" => tc.inc[1] = value,
                other => return Err(DriverError::InvalidTime(format!("unknown token '{other}'"))),
            }
            i += 2;
        }
        Ok(tc)
    }
}

fn player_number(turn: Turn, flip_turn: bool) -> usize {
    let idx = turn as usize;
    if flip_turn {
        idx ^ 1
    } else {
        idx
    }
}

/// Truncates the `moves` section of a `position`-style sfen string to the
/// first `start_gameply` moves. Pure string surgery: actual move legality
/// and board state live in the engine, never in this driver.
fn truncate_to_gameply(sfen: &str, start_gameply: u32) -> String {
    if start_gameply == 0 {
        return sfen.to_string();
    }
    if let Some(pos) = sfen.find(" moves ") {
        let head = &sfen[..pos];
        let moves_str = &sfen[pos + " moves ".len()..];
        let truncated: Vec<&str> = moves_str.split_whitespace().take(start_gameply as usize).collect();
        format!("{head} moves {}", truncated.join(" "))
    } else {
        sfen.to_string()
    }
}

fn build_go_args(side: Turn, tc: &TimeControl, rest_time: &[i64; 2]) -> String {
    let black = rest_time[Turn::Black as usize].max(0);
    let white = rest_time[Turn::White as usize].max(0);
    let idx = side as usize;
    let mut s = format!("btime {black} wtime {white}");
    if tc.inc[idx] != 0 {
        s.push_str(&format!(" binc {} winc {}", tc.inc[0], tc.inc[1]));
    } else {
        s.push_str(&format!(" byoyomi {}", tc.byoyomi[idx]));
    }
    s
}

fn signal_gameover(engines: &[Arc<EngineDriver>; 2], flip: bool, result: GameResult) {
    if result.is_draw() {
        for e in engines.iter() {
            e.send_command("gameover draw");
        }
    } else if result.is_black_or_white_win() {
        let winner_turn = if result == GameResult::BlackWin { Turn::Black } else { Turn::White };
        let winner_idx = player_number(winner_turn, flip);
        let loser_idx = winner_idx ^ 1;
        engines[winner_idx].send_command("gameover win");
        engines[loser_idx].send_command("gameover lose");
    }
}

/// Two engines playing a single game under a time control.
pub struct PairServer {
    engines: [Arc<EngineDriver>; 2],
    flip_turn: Arc<Mutex<bool>>,
    time_control: Arc<Mutex<TimeControl>>,
    moves_to_draw: Arc<Mutex<u32>>,
    start_sfen: Arc<Mutex<String>>,
    start_gameply: Arc<Mutex<u32>>,
    game_result: Arc<Mutex<GameResult>>,
    sfen_history: Arc<Mutex<Vec<String>>>,
    stop_flag: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PairServer {
    pub fn new(engine1: EngineDriver, engine2: EngineDriver) -> Self {
        Self {
            engines: [Arc::new(engine1), Arc::new(engine2)],
            flip_turn: Arc::new(Mutex::new(false)),
            time_control: Arc::new(Mutex::new(TimeControl::default())),
            moves_to_draw: Arc::new(Mutex::new(320)),
            start_sfen: Arc::new(Mutex::new("startpos".to_string())),
            start_gameply: Arc::new(Mutex::new(0)),
            game_result: Arc::new(Mutex::new(GameResult::Init)),
            sfen_history: Arc::new(Mutex::new(Vec::new())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn connect_player(&self, index: usize, path: impl AsRef<Path>) -> Res<()> {
        self.engines[index].connect(path)
    }

    pub fn set_options(&self, index: usize, options: EngineOptions) {
        self.engines[index].set_options(options);
    }

    pub fn set_flip_turn(&self, flip: bool) {
        *self.flip_turn.lock().unwrap() = flip;
    }

    pub fn flip_turn(&self) -> bool {
        *self.flip_turn.lock().unwrap()
    }

    pub fn set_time_setting(&self, spec: &str) -> Res<()> {
        *self.time_control.lock().unwrap() = TimeControl::parse(spec)?;
        Ok(())
    }

    pub fn set_moves_to_draw(&self, n: u32) {
        *self.moves_to_draw.lock().unwrap() = n;
    }

    pub fn set_start_sfen(&self, sfen: &str, start_gameply: u32) {
        *self.start_sfen.lock().unwrap() = sfen.to_string();
        *self.start_gameply.lock().unwrap() = start_gameply;
    }

    pub fn game_result(&self) -> GameResult {
        *self.game_result.lock().unwrap()
    }

    pub fn kifu_sfen(&self) -> String {
        self.sfen_history.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn start(&self) {
        self.stop_flag.store(false, Ordering::SeqCst);
        *self.game_result.lock().unwrap() = GameResult::Playing;

        let engines = self.engines.clone();
        let flip = *self.flip_turn.lock().unwrap();
        let tc = *self.time_control.lock().unwrap();
        let moves_to_draw = *self.moves_to_draw.lock().unwrap();
        let start_sfen = self.start_sfen.lock().unwrap().clone();
        let start_gameply = *self.start_gameply.lock().unwrap();
        let game_result = Arc::clone(&self.game_result);
        let sfen_history = Arc::clone(&self.sfen_history);
        let stop_flag = Arc::clone(&self.stop_flag);

        let handle = thread::spawn(move || {
            game_worker(&engines, flip, tc, moves_to_draw, &start_sfen, start_gameply, &game_result, &sfen_history, &stop_flag);
        });
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        for e in self.engines.iter() {
            e.usi_stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().unwrap().as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub fn terminate(&self) {
        self.stop();
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        for e in self.engines.iter() {
            e.disconnect();
        }
    }
}

#[allow(clippy::too_many_arguments)]
/// Converts a think time into whole seconds of clock debit, after a small
/// grace period that absorbs scheduling/IPC jitter around the engine call.
fn debit_for_elapsed(elapsed_ms: i64) -> i64 {
    const GRACE_MS: i64 = 300;
    (((elapsed_ms - GRACE_MS).max(0) as f64 / 1000.0).ceil() as i64) * 1000
}

/// A side has timed up once its remaining time plus byoyomi has run more
/// than two seconds negative.
fn is_timeout(rest_time_after_debit: i64, byoyomi_ms: i64) -> bool {
    rest_time_after_debit + byoyomi_ms < -2000
}

fn game_worker(
    engines: &[Arc<EngineDriver>; 2],
    flip: bool,
    tc: TimeControl,
    moves_to_draw: u32,
    start_sfen: &str,
    start_gameply: u32,
    game_result: &Mutex<GameResult>,
    sfen_history: &Mutex<Vec<String>>,
    stop_flag: &AtomicBool,
) {
    let mut side_to_move = engines[0].get_side_to_move().unwrap_or(Turn::Black);

    for e in engines.iter() {
        e.send_command("usinewgame");
    }

    let sfen = truncate_to_gameply(start_sfen, start_gameply);
    let mut moves: Vec<String> = Vec::new();
    let mut rest_time = [tc.time[0], tc.time[1]];
    let mut game_ply: u32 = 0;

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            *game_result.lock().unwrap() = GameResult::StopGame;
            return;
        }
        if game_ply >= moves_to_draw {
            *game_result.lock().unwrap() = GameResult::MaxMoves;
            break;
        }

        let side_idx = side_to_move as usize;
        let engine = &engines[player_number(side_to_move, flip)];

        let position_cmd =
            if moves.is_empty() { sfen.clone() } else { format!("{sfen} moves {}", moves.join(" ")) };
        engine.usi_position(&position_cmd);

        let go_args = build_go_args(side_to_move, &tc, &rest_time);
        let start = Instant::now();
        let think = match engine.usi_go_and_wait_bestmove(&go_args) {
            Ok(t) => t,
            Err(_) => {
                *game_result.lock().unwrap() = GameResult::from_win_turn(side_to_move.flip());
                break;
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as i64;

        rest_time[side_idx] -= debit_for_elapsed(elapsed_ms);

        if is_timeout(rest_time[side_idx], tc.byoyomi[side_idx]) {
            log::singleton().error("Error! : player timeup");
            *game_result.lock().unwrap() = GameResult::from_win_turn(side_to_move.flip());
            break;
        }

        let bestmove = think.bestmove.unwrap_or_else(|| "none".to_string());
        match bestmove.as_str() {
            "resign" => {
                *game_result.lock().unwrap() = GameResult::from_win_turn(side_to_move.flip());
                break;
            }
            "win" => {
                *game_result.lock().unwrap() = GameResult::from_win_turn(side_to_move);
                break;
            }
            mv => {
                moves.push(mv.to_string());
                rest_time[side_idx] += tc.inc[side_idx];
                side_to_move = side_to_move.flip();
                game_ply += 1;
            }
        }
    }

    let full_sfen = if moves.is_empty() { sfen.clone() } else { format!("{sfen} moves {}", moves.join(" ")) };
    sfen_history.lock().unwrap().push(full_sfen);

    signal_gameover(engines, flip, *game_result.lock().unwrap());
}
