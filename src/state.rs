use std::collections::HashMap;

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Turn {
    Black = 0,
    White = 1,
}

impl Turn {
    pub fn flip(self) -> Self {
        match self {
            Turn::Black => Turn::White,
            Turn::White => Turn::Black,
        }
    }
}

/// Protocol phase of an `EngineDriver`. Ordered by the handshake/command
/// lifecycle, not a total order over values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    WaitConnecting,
    Connected,
    WaitReadyOk,
    WaitCommand,
    WaitBestmove,
    WaitOneLine,
    Disconnected,
}

/// Outcome of a single game, mirroring the original engine wrapper's
/// `GameResult` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Init,
    Playing,
    BlackWin,
    WhiteWin,
    Draw,
    MaxMoves,
    IllegalMove,
    StopGame,
}

impl GameResult {
    pub fn from_win_turn(turn: Turn) -> Self {
        match turn {
            Turn::Black => GameResult::BlackWin,
            Turn::White => GameResult::WhiteWin,
        }
    }

    pub fn is_draw(self) -> bool {
        matches!(self, GameResult::Draw | GameResult::MaxMoves)
    }

    pub fn is_black_or_white_win(self) -> bool {
        matches!(self, GameResult::BlackWin | GameResult::WhiteWin)
    }

    pub fn is_gameover(self) -> bool {
        !matches!(self, GameResult::Init | GameResult::Playing)
    }

    /// Whether player 1 (the side not swapped by `flip_turn`) won.
    pub fn is_player1_win(self, flip_turn: bool) -> bool {
        (self == GameResult::BlackWin && !flip_turn) || (self == GameResult::WhiteWin && flip_turn)
    }
}

/// A single recorded game, appended to a `MultiServer`'s history.
#[derive(Debug, Clone)]
pub struct GameKifu {
    pub sfen: String,
    pub flip_turn: bool,
    pub game_result: GameResult,
}

/// Engine option map, seeded before `connect` and replayed as `setoption`
/// lines immediately after the subprocess is spawned.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    values: HashMap<String, String>,
    /// Some engines expose the hash-size option as `USI_Hash` instead of
    /// `Hash`; the driver writes whichever key is present here.
    hash_key: String,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self { values: HashMap::new(), hash_key: "Hash".to_string() }
    }

    pub fn set_hash_key(&mut self, key: &str) {
        self.hash_key = key.to_string();
    }

    pub fn set_hash(&mut self, mb: u64) {
        let key = self.hash_key.clone();
        self.values.insert(key, mb.to_string());
    }

    pub fn set(&mut self, name: &str, value: impl ToString) {
        self.values.insert(name.to_string(), value.to_string());
    }

    /// Iterates in a deterministic order so the handshake's `setoption`
    /// lines are reproducible across runs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        use itertools::Itertools;
        self.values.iter().sorted_by(|a, b| a.0.cmp(b.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_toggles_turn() {
        assert_eq!(Turn::Black.flip(), Turn::White);
        assert_eq!(Turn::White.flip(), Turn::Black);
    }

    #[test]
    fn game_result_predicates() {
        assert!(GameResult::Draw.is_draw());
        assert!(GameResult::MaxMoves.is_draw());
        assert!(!GameResult::BlackWin.is_draw());

        assert!(GameResult::BlackWin.is_black_or_white_win());
        assert!(GameResult::WhiteWin.is_black_or_white_win());
        assert!(!GameResult::Draw.is_black_or_white_win());

        assert!(!GameResult::Init.is_gameover());
        assert!(!GameResult::Playing.is_gameover());
        assert!(GameResult::BlackWin.is_gameover());
        assert!(GameResult::StopGame.is_gameover());
    }

    #[test]
    fn player1_win_respects_flip() {
        assert!(GameResult::BlackWin.is_player1_win(false));
        assert!(!GameResult::BlackWin.is_player1_win(true));
        assert!(GameResult::WhiteWin.is_player1_win(true));
        assert!(!GameResult::WhiteWin.is_player1_win(false));
    }

    #[test]
    fn from_win_turn_maps_correctly() {
        assert_eq!(GameResult::from_win_turn(Turn::Black), GameResult::BlackWin);
        assert_eq!(GameResult::from_win_turn(Turn::White), GameResult::WhiteWin);
    }

    #[test]
    fn options_iterate_in_sorted_order() {
        let mut opts = EngineOptions::new();
        opts.set("Threads", 4);
        opts.set_hash(256);
        let rendered: Vec<_> = opts.iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(rendered, vec!["Hash=256".to_string(), "Threads=4".to_string()]);
    }
}
