//! A tiny scripted USI engine used only by the integration tests under
//! `tests/`. Not part of the public crate surface.
use std::env;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

fn main() {
    let script = env::args().nth(1).or_else(|| env::var("FAKE_ENGINE_SCRIPT").ok()).unwrap_or_else(|| "default".to_string());
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let head = line.split_whitespace().next().unwrap_or("");
        match head {
            "usi" => {
                let _ = writeln!(stdout, "id name FakeUsiEngine");
                let _ = writeln!(stdout, "id author test-harness");
                let _ = writeln!(stdout, "usiok");
            }
            "isready" => {
                let _ = writeln!(stdout, "readyok");
            }
            "side" => {
                let _ = writeln!(stdout, "black");
            }
            "moves" => {
                let _ = writeln!(stdout, "none");
            }
            "go" => emit_go_response(&mut stdout, &script),
            "setoption" | "usinewgame" | "position" | "stop" => {}
            "quit" => break,
            _ => {}
        }
        let _ = stdout.flush();
    }
}

fn emit_go_response(stdout: &mut impl Write, script: &str) {
    match script {
        "simple" => {
            let _ = writeln!(stdout, "info depth 10 score cp 42 pv 8c8d");
            let _ = writeln!(stdout, "bestmove 8c8d ponder 2g2f");
        }
        "mate" => {
            let _ = writeln!(stdout, "info depth 5 score mate 3 pv 2h3h 4a4b 3h3a");
            let _ = writeln!(stdout, "bestmove 2h3h");
        }
        "tolerant_mate" => {
            let _ = writeln!(stdout, "info depth 1 nodes 0 time 0 score mate + string Nyugyoku");
            let _ = writeln!(stdout, "bestmove resign");
        }
        "multipv" => {
            let _ = writeln!(stdout, "info multipv 1 depth 10 score cp 10 pv 7g7f");
            let _ = writeln!(stdout, "info multipv 2 depth 10 score cp 5 pv 2g2f");
            let _ = writeln!(stdout, "bestmove 7g7f");
        }
        "slow" => {
            thread::sleep(Duration::from_millis(2500));
            let _ = writeln!(stdout, "bestmove 7g7f");
        }
        _ => {
            let _ = writeln!(stdout, "bestmove 7g7f");
        }
    }
}
