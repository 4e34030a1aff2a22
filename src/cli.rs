use std::env;

use crate::error::{DriverError, Res};
use crate::state::EngineOptions;

/// Hand-rolled `-flag value` parser for the self-play demonstration binary,
/// in the style of a cutechess-cli-compatible front end rather than a
/// derive-based arg parser.
#[derive(Debug, Clone)]
pub struct CommandLineArgs {
    pub engine1: String,
    pub engine2: String,
    pub instances: usize,
    pub time_setting: String,
    pub hash_mb: u64,
    pub threads: u64,
    pub moves_to_draw: u32,
}

impl Default for CommandLineArgs {
    fn default() -> Self {
        Self {
            engine1: String::new(),
            engine2: String::new(),
            instances: 1,
            time_setting: "byoyomi 1000".to_string(),
            hash_mb: 256,
            threads: 1,
            moves_to_draw: 320,
        }
    }
}

fn parse_key_equals_value(arg: &str) -> Option<(&str, &str)> {
    arg.strip_prefix('-')?.split_once('=')
}

/// Parses `-key=value` / `-flag value` style arguments. Unrecognized flags
/// are ignored rather than rejected, matching the forgiving style of the
/// engine wrapper's own CLI entry point.
pub fn parse_cli(args: &[String]) -> Res<CommandLineArgs> {
    let mut result = CommandLineArgs::default();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if let Some((key, value)) = parse_key_equals_value(arg) {
            apply_flag(&mut result, key, value)?;
            i += 1;
            continue;
        }
        let key = arg.trim_start_matches('-');
        let value = args.get(i + 1).map(String::as_str).unwrap_or("");
        apply_flag(&mut result, key, value)?;
        i += 2;
    }
    Ok(result)
}

fn apply_flag(result: &mut CommandLineArgs, key: &str, value: &str) -> Res<()> {
    match key {
        "engine1" => result.engine1 = value.to_string(),
        "engine2" => result.engine2 = value.to_string(),
        "instances" => {
            result.instances = value.parse().map_err(|_| DriverError::InvalidState(format!("bad -instances '{value}'")))?
        }
        "tc" | "time" => result.time_setting = value.to_string(),
        "hash" => {
            result.hash_mb = value.parse().map_err(|_| DriverError::InvalidState(format!("bad -hash '{value}'")))?
        }
        "threads" => {
            result.threads = value.parse().map_err(|_| DriverError::InvalidState(format!("bad -threads '{value}'")))?
        }
        "maxmoves" => {
            result.moves_to_draw =
                value.parse().map_err(|_| DriverError::InvalidState(format!("bad -maxmoves '{value}'")))?
        }
        _ => {} // unrecognized flags are ignored, not fatal
    }
    Ok(())
}

pub fn engine_options(args: &CommandLineArgs) -> EngineOptions {
    let mut options = EngineOptions::new();
    options.set_hash(args.hash_mb);
    options.set("Threads", args.threads);
    options
}

/// Reads `ENGINE_PATH`/`KIFU_PATH` for runs that don't pass `-engine1`
/// explicitly. Configuration *loading* beyond these two variables is out of
/// scope for this crate.
pub fn engine_path_from_env() -> Option<String> {
    env::var("ENGINE_PATH").ok()
}

pub fn kifu_path_from_env() -> Option<String> {
    env::var("KIFU_PATH").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_equals_value_form() {
        let args = parse_cli(&["-engine1=./a".to_string(), "-instances=4".to_string()]).unwrap();
        assert_eq!(args.engine1, "./a");
        assert_eq!(args.instances, 4);
    }

    #[test]
    fn parses_flag_space_value_form() {
        let args = parse_cli(&["-engine1".to_string(), "./a".to_string(), "-hash".to_string(), "512".to_string()])
            .unwrap();
        assert_eq!(args.engine1, "./a");
        assert_eq!(args.hash_mb, 512);
    }

    #[test]
    fn unrecognized_flags_are_ignored() {
        let args = parse_cli(&["-wat".to_string(), "value".to_string()]).unwrap();
        assert_eq!(args.instances, 1);
    }

    #[test]
    fn bad_numeric_value_is_an_error() {
        assert!(parse_cli(&["-instances=nope".to_string()]).is_err());
    }

    #[test]
    fn engine_options_seeds_hash_and_threads() {
        let args = CommandLineArgs { hash_mb: 128, threads: 8, ..Default::default() };
        let opts = engine_options(&args);
        let rendered: Vec<_> = opts.iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert!(rendered.contains(&"Hash=128".to_string()));
        assert!(rendered.contains(&"Threads=8".to_string()));
    }
}
