use std::env;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use ayane::cli::{engine_options, engine_path_from_env, parse_cli};
use ayane::{log, MultiServer};

fn run() -> ayane::Res<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = parse_cli(&args)?;

    let engine1 = if cli.engine1.is_empty() { engine_path_from_env().unwrap_or_default() } else { cli.engine1.clone() };
    let engine2 = if cli.engine2.is_empty() { engine1.clone() } else { cli.engine2.clone() };

    if engine1.is_empty() {
        return Err(ayane::DriverError::NotFound(
            "no engine path given (-engine1=... or ENGINE_PATH)".to_string(),
        ));
    }

    log::singleton().print(&format!("starting {} self-play instance(s)", cli.instances), true, true, true);

    let server = MultiServer::init(cli.instances);
    server.init_engine(0, &engine1, engine_options(&cli))?;
    server.init_engine(1, &engine2, engine_options(&cli))?;
    server.set_time_setting(&cli.time_setting)?;
    server.set_moves_to_draw(cli.moves_to_draw);
    server.game_start();

    loop {
        thread::sleep(Duration::from_secs(1));
        let (p1, p2, b, w, d) = server.game_info();
        let total = p1 + p2 + d;
        if total as usize >= cli.instances.max(1) * 20 {
            break;
        }
        let _ = (b, w);
    }

    server.game_stop();
    let rating = server.game_rating();
    log::singleton().print(&rating.to_string(), true, true, true);
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::singleton().error(&format!("fatal: {e}"));
            ExitCode::FAILURE
        }
    }
}
