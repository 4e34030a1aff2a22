//! Drives external USI shogi engines over stdio and coordinates self-play
//! between pairs of them.
//!
//! [`driver::EngineDriver`] owns a single engine subprocess and its protocol
//! state machine. [`pair_server::PairServer`] plays one game between two
//! drivers under a time control; [`multi_server::MultiServer`] runs a pool
//! of those in parallel and tallies outcomes. [`rating::EloRating`] turns
//! those tallies into a rating estimate with confidence bounds.

pub mod cli;
pub mod driver;
pub mod error;
pub mod eval;
pub mod log;
pub mod multi_server;
pub mod pair_server;
pub mod rating;
pub mod scanner;
pub mod state;
pub mod think;

pub use driver::EngineDriver;
pub use error::{DriverError, Res};
pub use eval::{Bound, EvalValue};
pub use multi_server::MultiServer;
pub use pair_server::PairServer;
pub use rating::EloRating;
pub use scanner::Scanner;
pub use state::{EngineOptions, EngineState, GameKifu, GameResult, Turn};
pub use think::{ThinkPV, ThinkResult};
