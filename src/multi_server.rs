use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;

use crate::driver::EngineDriver;
use crate::error::Res;
use crate::pair_server::PairServer;
use crate::rating::EloRating;
use crate::state::{EngineOptions, GameKifu, GameResult};

fn pick_sfen(sfens: &[String]) -> String {
    if sfens.is_empty() {
        return "startpos".to_string();
    }
    let idx = rand::rng().random_range(0..sfens.len());
    sfens[idx].clone()
}

/// Buckets one finished game's result. Any non-decisive result (`Draw`,
/// `MaxMoves`, `StopGame`, the unreachable `IllegalMove`) falls into
/// `draws`, matching the original's `count_result` catch-all; `total`
/// is incremented unconditionally so it can never be definitionally
/// equal to `p1 + p2 + draws` if a bucket is ever missed.
#[allow(clippy::too_many_arguments)]
fn tally_one(
    result: GameResult,
    flip: bool,
    p1: &mut u64,
    p2: &mut u64,
    black: &mut u64,
    white: &mut u64,
    draws: &mut u64,
    total: &mut u64,
) {
    if result.is_black_or_white_win() {
        if result.is_player1_win(flip) {
            *p1 += 1;
        } else {
            *p2 += 1;
        }
        match result {
            GameResult::BlackWin => *black += 1,
            GameResult::WhiteWin => *white += 1,
            _ => unreachable!(),
        }
    } else {
        *draws += 1;
    }
    *total += 1;
}

/// A pool of `PairServer`s run in parallel, restarted as each finishes, with
/// aggregate outcome tallying and kifu collection.
pub struct MultiServer {
    pairs: Vec<Arc<PairServer>>,
    start_sfens: Mutex<Vec<String>>,
    start_gameply: Mutex<u32>,
    flip_turn_every_game: Mutex<bool>,
    kifu: Arc<Mutex<Vec<GameKifu>>>,
    player1_win: Arc<Mutex<u64>>,
    player2_win: Arc<Mutex<u64>>,
    black_win: Arc<Mutex<u64>>,
    white_win: Arc<Mutex<u64>>,
    draw_games: Arc<Mutex<u64>>,
    total_games: Arc<Mutex<u64>>,
    stop_flag: Arc<AtomicBool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl MultiServer {
    pub fn init(n: usize) -> Self {
        let pairs = (0..n).map(|_| Arc::new(PairServer::new(EngineDriver::new(), EngineDriver::new()))).collect();
        Self {
            pairs,
            start_sfens: Mutex::new(vec!["startpos".to_string()]),
            start_gameply: Mutex::new(0),
            flip_turn_every_game: Mutex::new(true),
            kifu: Arc::new(Mutex::new(Vec::new())),
            player1_win: Arc::new(Mutex::new(0)),
            player2_win: Arc::new(Mutex::new(0)),
            black_win: Arc::new(Mutex::new(0)),
            white_win: Arc::new(Mutex::new(0)),
            draw_games: Arc::new(Mutex::new(0)),
            total_games: Arc::new(Mutex::new(0)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            supervisor: Mutex::new(None),
        }
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn init_engine(&self, index: usize, path: impl AsRef<Path>, options: EngineOptions) -> Res<()> {
        let path = path.as_ref();
        for pair in &self.pairs {
            pair.set_options(index, options.clone());
            pair.connect_player(index, path)?;
        }
        Ok(())
    }

    pub fn set_time_setting(&self, spec: &str) -> Res<()> {
        for pair in &self.pairs {
            pair.set_time_setting(spec)?;
        }
        Ok(())
    }

    pub fn set_start_sfens(&self, sfens: Vec<String>, start_gameply: u32) {
        *self.start_sfens.lock().unwrap() = sfens;
        *self.start_gameply.lock().unwrap() = start_gameply;
    }

    pub fn set_flip_turn_every_game(&self, flip: bool) {
        *self.flip_turn_every_game.lock().unwrap() = flip;
    }

    pub fn set_moves_to_draw(&self, n: u32) {
        for pair in &self.pairs {
            pair.set_moves_to_draw(n);
        }
    }

    fn seed_and_start(&self, pair: &PairServer) {
        let sfens = self.start_sfens.lock().unwrap().clone();
        let start_gameply = *self.start_gameply.lock().unwrap();
        pair.set_start_sfen(&pick_sfen(&sfens), start_gameply);
        pair.start();
    }

    pub fn game_start(&self) {
        *self.player1_win.lock().unwrap() = 0;
        *self.player2_win.lock().unwrap() = 0;
        *self.black_win.lock().unwrap() = 0;
        *self.white_win.lock().unwrap() = 0;
        *self.draw_games.lock().unwrap() = 0;
        *self.total_games.lock().unwrap() = 0;
        self.kifu.lock().unwrap().clear();
        self.stop_flag.store(false, Ordering::SeqCst);

        for pair in &self.pairs {
            pair.set_flip_turn(false);
            self.seed_and_start(pair);
        }

        let pairs = self.pairs.clone();
        let kifu = Arc::clone(&self.kifu);
        let player1_win = Arc::clone(&self.player1_win);
        let player2_win = Arc::clone(&self.player2_win);
        let black_win = Arc::clone(&self.black_win);
        let white_win = Arc::clone(&self.white_win);
        let draw_games = Arc::clone(&self.draw_games);
        let total_games = Arc::clone(&self.total_games);
        let stop_flag = Arc::clone(&self.stop_flag);
        let start_sfens = self.start_sfens.lock().unwrap().clone();
        let start_gameply = *self.start_gameply.lock().unwrap();
        let flip_every = *self.flip_turn_every_game.lock().unwrap();

        let handle = thread::spawn(move || {
            supervisor_loop(
                &pairs, &kifu, &player1_win, &player2_win, &black_win, &white_win, &draw_games, &total_games,
                &stop_flag, &start_sfens, start_gameply, flip_every,
            );
        });
        *self.supervisor.lock().unwrap() = Some(handle);
    }

    pub fn game_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.supervisor.lock().unwrap().take() {
            let _ = handle.join();
        }
        for pair in &self.pairs {
            pair.terminate();
        }
    }

    pub fn game_info(&self) -> (u64, u64, u64, u64, u64) {
        (
            *self.player1_win.lock().unwrap(),
            *self.player2_win.lock().unwrap(),
            *self.black_win.lock().unwrap(),
            *self.white_win.lock().unwrap(),
            *self.draw_games.lock().unwrap(),
        )
    }

    /// Independent per-finished-game counter, bumped once per game
    /// regardless of which outcome bucket it landed in; disagreeing with
    /// `player1_win + player2_win + draw_games` in `game_info()` would mean
    /// a game finished without being tallied into any bucket.
    pub fn total_games(&self) -> u64 {
        *self.total_games.lock().unwrap()
    }

    pub fn game_rating(&self) -> EloRating {
        let (p1, p2, b, w, d) = self.game_info();
        EloRating::new(p1, p2, b, w, d)
    }

    pub fn kifu(&self) -> Vec<GameKifu> {
        self.kifu.lock().unwrap().clone()
    }
}

#[allow(clippy::too_many_arguments)]
fn supervisor_loop(
    pairs: &[Arc<PairServer>],
    kifu: &Mutex<Vec<GameKifu>>,
    player1_win: &Mutex<u64>,
    player2_win: &Mutex<u64>,
    black_win: &Mutex<u64>,
    white_win: &Mutex<u64>,
    draw_games: &Mutex<u64>,
    total_games: &Mutex<u64>,
    stop_flag: &AtomicBool,
    start_sfens: &[String],
    start_gameply: u32,
    flip_every: bool,
) {
    while !stop_flag.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(1));
        for pair in pairs {
            if stop_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = pair.game_result();
            if !result.is_gameover() {
                continue;
            }

            let flip = pair.flip_turn();
            tally_one(
                result,
                flip,
                &mut player1_win.lock().unwrap(),
                &mut player2_win.lock().unwrap(),
                &mut black_win.lock().unwrap(),
                &mut white_win.lock().unwrap(),
                &mut draw_games.lock().unwrap(),
                &mut total_games.lock().unwrap(),
            );

            kifu.lock().unwrap().push(GameKifu { sfen: pair.kifu_sfen(), flip_turn: flip, game_result: result });

            if flip_every {
                pair.set_flip_turn(!flip);
            }
            let sfen = pick_sfen(start_sfens);
            pair.set_start_sfen(&sfen, start_gameply);
            pair.start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_black_win_credits_player1_when_not_flipped() {
        let (mut p1, mut p2, mut b, mut w, mut d, mut t) = (0, 0, 0, 0, 0, 0);
        tally_one(GameResult::BlackWin, false, &mut p1, &mut p2, &mut b, &mut w, &mut d, &mut t);
        assert_eq!((p1, p2, b, w, d, t), (1, 0, 1, 0, 0, 1));
    }

    #[test]
    fn tally_black_win_credits_player2_when_flipped() {
        let (mut p1, mut p2, mut b, mut w, mut d, mut t) = (0, 0, 0, 0, 0, 0);
        tally_one(GameResult::BlackWin, true, &mut p1, &mut p2, &mut b, &mut w, &mut d, &mut t);
        assert_eq!((p1, p2, b, w, d, t), (0, 1, 1, 0, 0, 1));
    }

    #[test]
    fn tally_draw_does_not_credit_either_player() {
        let (mut p1, mut p2, mut b, mut w, mut d, mut t) = (0, 0, 0, 0, 0, 0);
        tally_one(GameResult::Draw, false, &mut p1, &mut p2, &mut b, &mut w, &mut d, &mut t);
        assert_eq!((p1, p2, b, w, d, t), (0, 0, 0, 0, 1, 1));
    }

    #[test]
    fn tally_stop_game_falls_into_draws_like_the_original_catch_all() {
        let (mut p1, mut p2, mut b, mut w, mut d, mut t) = (0, 0, 0, 0, 0, 0);
        tally_one(GameResult::StopGame, false, &mut p1, &mut p2, &mut b, &mut w, &mut d, &mut t);
        assert_eq!((p1, p2, b, w, d, t), (0, 0, 0, 0, 1, 1));
    }

    #[test]
    fn tally_illegal_move_falls_into_draws_like_the_original_catch_all() {
        let (mut p1, mut p2, mut b, mut w, mut d, mut t) = (0, 0, 0, 0, 0, 0);
        tally_one(GameResult::IllegalMove, true, &mut p1, &mut p2, &mut b, &mut w, &mut d, &mut t);
        assert_eq!((p1, p2, b, w, d, t), (0, 0, 0, 0, 1, 1));
    }

    #[test]
    fn totals_invariant_holds_across_many_results() {
        let results = [
            GameResult::BlackWin,
            GameResult::WhiteWin,
            GameResult::Draw,
            GameResult::MaxMoves,
            GameResult::WhiteWin,
            GameResult::StopGame,
        ];
        let (mut p1, mut p2, mut b, mut w, mut d, mut t) = (0, 0, 0, 0, 0, 0);
        for (i, r) in results.iter().enumerate() {
            tally_one(*r, i % 2 == 0, &mut p1, &mut p2, &mut b, &mut w, &mut d, &mut t);
        }
        assert_eq!(p1 + p2 + d, results.len() as u64);
        assert_eq!(t, results.len() as u64);
        assert!(b + w <= results.len() as u64);
    }

    #[test]
    fn pick_sfen_falls_back_to_startpos_when_empty() {
        assert_eq!(pick_sfen(&[]), "startpos");
    }

    #[test]
    fn pick_sfen_returns_single_entry() {
        let sfens = vec!["startpos moves 7g7f".to_string()];
        assert_eq!(pick_sfen(&sfens), "startpos moves 7g7f");
    }

    #[test]
    fn init_creates_requested_number_of_pairs() {
        let server = MultiServer::init(4);
        assert_eq!(server.pair_count(), 4);
    }
}
