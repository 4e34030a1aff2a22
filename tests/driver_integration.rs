//! Exercises `EngineDriver` against a real child process speaking a scripted
//! dialect of USI, since handshake and line-dispatch behavior depend on
//! genuine stdio rather than anything a unit test can fake in-process.
use ayane::state::EngineState;
use ayane::EngineDriver;

fn fake_engine_path() -> String {
    env!("CARGO_BIN_EXE_fake_usi_engine").to_string()
}

fn connected_driver(script: &str) -> EngineDriver {
    let driver = EngineDriver::new();
    driver.connect_with_args(fake_engine_path(), &[script]).expect("connect should succeed");
    driver
}

#[test]
fn handshake_reaches_wait_command() {
    let driver = connected_driver("default");
    assert_eq!(driver.state(), EngineState::WaitCommand);
    driver.disconnect();
}

#[test]
fn simple_search_reports_score_and_bestmove() {
    let driver = connected_driver("simple");
    driver.usi_position("startpos");
    let result = driver.usi_go_and_wait_bestmove("byoyomi 100").expect("search should finish");
    assert_eq!(result.bestmove.as_deref(), Some("8c8d"));
    assert_eq!(result.ponder.as_deref(), Some("2g2f"));
    let pv = result.pvs[0].as_ref().unwrap();
    assert_eq!(pv.depth, Some(10));
    assert_eq!(pv.eval.unwrap().to_string(), "cp 42");
    driver.disconnect();
}

#[test]
fn mate_score_is_reported_as_mate_in_n() {
    let driver = connected_driver("mate");
    driver.usi_position("startpos");
    let result = driver.usi_go_and_wait_bestmove("mate infinite").expect("search should finish");
    let pv = result.pvs[0].as_ref().unwrap();
    assert_eq!(pv.eval.unwrap().to_string(), "mate 3");
    driver.disconnect();
}

#[test]
fn malformed_mate_ply_is_tolerated() {
    let driver = connected_driver("tolerant_mate");
    driver.usi_position("startpos");
    let result = driver.usi_go_and_wait_bestmove("byoyomi 100").expect("search should finish");
    let pv = result.pvs[0].as_ref().unwrap();
    assert_eq!(pv.depth, Some(1));
    assert!(pv.eval.unwrap().is_mate_score());
    assert_eq!(result.bestmove.as_deref(), Some("resign"));
    driver.disconnect();
}

#[test]
fn multipv_lines_populate_distinct_slots() {
    let driver = connected_driver("multipv");
    driver.usi_position("startpos");
    let result = driver.usi_go_and_wait_bestmove("byoyomi 100").expect("search should finish");
    assert_eq!(result.pvs.len(), 2);
    assert_eq!(result.pvs[0].as_ref().unwrap().pv.as_deref(), Some("7g7f"));
    assert_eq!(result.pvs[1].as_ref().unwrap().pv.as_deref(), Some("2g2f"));
    driver.disconnect();
}

#[test]
fn stop_before_any_go_is_a_harmless_no_op() {
    let driver = connected_driver("default");
    driver.usi_stop();
    // No search was started, so the writer must have dropped the command;
    // the driver should remain healthy and fully responsive afterwards.
    assert_eq!(driver.state(), EngineState::WaitCommand);
    assert!(driver.last_exit_diagnostic().is_none());
    driver.usi_position("startpos");
    let result = driver.usi_go_and_wait_bestmove("byoyomi 100").expect("engine should still respond");
    assert_eq!(result.bestmove.as_deref(), Some("7g7f"));
    driver.disconnect();
}

#[test]
fn moves_and_side_extension_commands_round_trip() {
    let driver = connected_driver("default");
    assert_eq!(driver.get_side_to_move().unwrap(), ayane::state::Turn::Black);
    assert_eq!(driver.get_moves().unwrap(), "none");
    driver.disconnect();
}

#[test]
fn disconnect_is_idempotent() {
    let driver = connected_driver("default");
    driver.disconnect();
    driver.disconnect();
    assert_eq!(driver.state(), EngineState::Disconnected);
}
