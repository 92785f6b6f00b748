//! sable: UCI chess engine binary.

use std::io::{self, BufRead, Write};
use std::process;
use std::sync::Arc;

use sb_uci::{format_bestmove, format_info, parse_command, Engine, UciCommand};

const NAME: &str = "Sable";

fn print_help() {
    eprintln!(
        r#"{NAME} {} - UCI chess engine

USAGE:
    sable            Run the UCI loop on stdin/stdout

OPTIONS:
    --help           Show this help
    --version        Show the version
"#,
        sb_uci::VERSION
    );
}

fn respond(line: &str) {
    println!("{line}");
    let _ = io::stdout().flush();
}

fn fatal(err: impl std::fmt::Display) -> ! {
    eprintln!("fatal: {err}");
    process::exit(1);
}

fn main() {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                return;
            }
            "--version" | "-V" => {
                println!("{NAME} {}", sb_uci::VERSION);
                return;
            }
            other => {
                eprintln!("unknown argument `{other}`; try --help");
                process::exit(1);
            }
        }
    }

    let mut engine = Engine::new(
        Arc::new(|bm| respond(&format_bestmove(bm))),
        Arc::new(|info| respond(&format_info(info))),
    );

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(err) => {
                respond(&format!("info string error: {err}"));
                continue;
            }
        };
        let result = match cmd {
            UciCommand::Uci => {
                respond(&format!("id name {NAME} {}", sb_uci::VERSION));
                respond("id author the Sable authors");
                for opt in engine.option_lines() {
                    respond(&opt);
                }
                respond("uciok");
                Ok(())
            }
            UciCommand::IsReady => engine.ensure_ready().map(|()| respond("readyok")),
            UciCommand::SetOption { name, value } => engine.set_option(&name, &value),
            UciCommand::UciNewGame => engine.new_game(),
            UciCommand::Position { fen, moves } => {
                engine.set_position(fen.as_deref(), &moves)
            }
            UciCommand::Go(params) => engine.go(&params),
            UciCommand::Stop => engine.stop(),
            UciCommand::Quit => break,
        };
        if let Err(err) = result {
            if err.is_fatal() {
                fatal(err);
            }
            respond(&format!("info string error: {err}"));
        }
    }
    // EOF or quit: tear the search down without emitting a best move.
    drop(engine);
}
