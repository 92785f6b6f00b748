//! Line-oriented UCI command parsing and response formatting.

use thiserror::Error;

use sb_search::{BestMoveInfo, ThinkingInfo};

#[derive(Debug, Error)]
pub enum UciError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("malformed `{command}` command: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },
}

/// Time-control and scope fields of a `go` command. Clocks are milliseconds;
/// absent fields stay `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GoParams {
    pub wtime: Option<i64>,
    pub btime: Option<i64>,
    pub winc: Option<i64>,
    pub binc: Option<i64>,
    pub movestogo: Option<i64>,
    pub movetime: Option<i64>,
    pub nodes: Option<u64>,
    pub infinite: bool,
    pub ponder: bool,
    pub searchmoves: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UciCommand {
    Uci,
    IsReady,
    SetOption { name: String, value: String },
    UciNewGame,
    Position { fen: Option<String>, moves: Vec<String> },
    Go(GoParams),
    Stop,
    Quit,
}

/// Parse one input line. `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<UciCommand>, UciError> {
    let mut tokens = line.split_whitespace().peekable();
    let Some(head) = tokens.next() else {
        return Ok(None);
    };
    let cmd = match head {
        "uci" => UciCommand::Uci,
        "isready" => UciCommand::IsReady,
        "ucinewgame" => UciCommand::UciNewGame,
        "stop" => UciCommand::Stop,
        "quit" => UciCommand::Quit,
        "setoption" => parse_setoption(tokens)?,
        "position" => parse_position(tokens)?,
        "go" => UciCommand::Go(parse_go(tokens)?),
        _ => return Err(UciError::UnknownCommand(line.trim().to_string())),
    };
    Ok(Some(cmd))
}

fn parse_setoption<'a, I: Iterator<Item = &'a str>>(tokens: I) -> Result<UciCommand, UciError> {
    // `setoption name <name...> [value <value...>]`; both parts may contain
    // spaces.
    let mut tokens = tokens.peekable();
    if tokens.next() != Some("name") {
        return Err(UciError::Malformed {
            command: "setoption",
            reason: "expected `name`".to_string(),
        });
    }
    let mut name = Vec::new();
    for tok in tokens.by_ref() {
        if tok == "value" {
            break;
        }
        name.push(tok);
    }
    if name.is_empty() {
        return Err(UciError::Malformed {
            command: "setoption",
            reason: "missing option name".to_string(),
        });
    }
    let value: Vec<&str> = tokens.collect();
    Ok(UciCommand::SetOption {
        name: name.join(" "),
        value: value.join(" "),
    })
}

fn parse_position<'a, I: Iterator<Item = &'a str>>(tokens: I) -> Result<UciCommand, UciError> {
    let mut tokens = tokens.peekable();
    let fen = match tokens.next() {
        Some("startpos") => None,
        Some("fen") => {
            let mut fields = Vec::new();
            while let Some(&tok) = tokens.peek() {
                if tok == "moves" {
                    break;
                }
                fields.push(tok);
                tokens.next();
            }
            if fields.is_empty() {
                return Err(UciError::Malformed {
                    command: "position",
                    reason: "empty FEN".to_string(),
                });
            }
            Some(fields.join(" "))
        }
        other => {
            return Err(UciError::Malformed {
                command: "position",
                reason: format!("expected `startpos` or `fen`, got {other:?}"),
            })
        }
    };
    let moves = match tokens.next() {
        Some("moves") => tokens.map(str::to_string).collect(),
        Some(tok) => {
            return Err(UciError::Malformed {
                command: "position",
                reason: format!("unexpected token `{tok}`"),
            })
        }
        None => Vec::new(),
    };
    Ok(UciCommand::Position { fen, moves })
}

fn parse_go<'a, I: Iterator<Item = &'a str>>(tokens: I) -> Result<GoParams, UciError> {
    const KEYWORDS: [&str; 11] = [
        "wtime",
        "btime",
        "winc",
        "binc",
        "movestogo",
        "movetime",
        "nodes",
        "depth",
        "infinite",
        "ponder",
        "searchmoves",
    ];
    fn number<'a, I: Iterator<Item = &'a str>, T: std::str::FromStr>(
        tokens: &mut I,
        field: &'static str,
    ) -> Result<T, UciError> {
        tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or(UciError::Malformed {
                command: "go",
                reason: format!("bad value for `{field}`"),
            })
    }

    let mut params = GoParams::default();
    let mut tokens = tokens.peekable();
    while let Some(tok) = tokens.next() {
        match tok {
            "wtime" => params.wtime = Some(number(&mut tokens, "wtime")?),
            "btime" => params.btime = Some(number(&mut tokens, "btime")?),
            "winc" => params.winc = Some(number(&mut tokens, "winc")?),
            "binc" => params.binc = Some(number(&mut tokens, "binc")?),
            "movestogo" => params.movestogo = Some(number(&mut tokens, "movestogo")?),
            "movetime" => params.movetime = Some(number(&mut tokens, "movetime")?),
            "nodes" => params.nodes = Some(number(&mut tokens, "nodes")?),
            // The search has no depth cap; accepted and ignored.
            "depth" => {
                let _: i64 = number(&mut tokens, "depth")?;
            }
            "infinite" => params.infinite = true,
            "ponder" => params.ponder = true,
            "searchmoves" => {
                while let Some(&next) = tokens.peek() {
                    if KEYWORDS.contains(&next) {
                        break;
                    }
                    params.searchmoves.push(next.to_string());
                    tokens.next();
                }
            }
            other => {
                return Err(UciError::Malformed {
                    command: "go",
                    reason: format!("unknown token `{other}`"),
                })
            }
        }
    }
    Ok(params)
}

/// Format one `info` line.
pub fn format_info(info: &ThinkingInfo) -> String {
    if let Some(comment) = &info.comment {
        return format!("info string {comment}");
    }
    let mut line = format!(
        "info depth {} seldepth {} time {} nodes {} score cp {} nps {} hashfull {}",
        info.depth, info.seldepth, info.time_ms, info.nodes, info.score_cp, info.nps, info.hashfull
    );
    if !info.pv.is_empty() {
        line.push_str(" pv");
        for mv in &info.pv {
            line.push(' ');
            line.push_str(mv);
        }
    }
    line
}

/// Format the final `bestmove` line; no legal move prints the null move.
pub fn format_bestmove(info: &BestMoveInfo) -> String {
    let mut line = format!("bestmove {}", info.best.as_deref().unwrap_or("0000"));
    if let Some(ponder) = &info.ponder {
        line.push_str(" ponder ");
        line.push_str(ponder);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_commands_parse() {
        assert_eq!(parse_command("uci").unwrap(), Some(UciCommand::Uci));
        assert_eq!(parse_command("isready").unwrap(), Some(UciCommand::IsReady));
        assert_eq!(parse_command("stop").unwrap(), Some(UciCommand::Stop));
        assert_eq!(parse_command("quit").unwrap(), Some(UciCommand::Quit));
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn unknown_commands_error_but_do_not_panic() {
        assert!(parse_command("xyzzy 123").is_err());
    }

    #[test]
    fn setoption_names_and_values_may_contain_spaces() {
        let cmd = parse_command("setoption name cache history length value 5").unwrap();
        assert_eq!(
            cmd,
            Some(UciCommand::SetOption {
                name: "cache history length".to_string(),
                value: "5".to_string(),
            })
        );
        let cmd = parse_command("setoption name weights value /nets/my net.safetensors").unwrap();
        assert_eq!(
            cmd,
            Some(UciCommand::SetOption {
                name: "weights".to_string(),
                value: "/nets/my net.safetensors".to_string(),
            })
        );
    }

    #[test]
    fn position_startpos_with_moves() {
        let cmd = parse_command("position startpos moves e2e4 e7e5").unwrap();
        assert_eq!(
            cmd,
            Some(UciCommand::Position {
                fen: None,
                moves: vec!["e2e4".to_string(), "e7e5".to_string()],
            })
        );
    }

    #[test]
    fn position_fen_keeps_all_fields() {
        let cmd =
            parse_command("position fen 8/8/8/4k3/8/8/4P3/4K3 w - - 4 31 moves e2e4").unwrap();
        assert_eq!(
            cmd,
            Some(UciCommand::Position {
                fen: Some("8/8/8/4k3/8/8/4P3/4K3 w - - 4 31".to_string()),
                moves: vec!["e2e4".to_string()],
            })
        );
    }

    #[test]
    fn go_parses_clock_fields_and_flags() {
        let cmd = parse_command(
            "go wtime 60000 btime 59000 winc 1000 binc 1000 movestogo 30 nodes 5000",
        )
        .unwrap();
        let Some(UciCommand::Go(p)) = cmd else { panic!() };
        assert_eq!(p.wtime, Some(60000));
        assert_eq!(p.btime, Some(59000));
        assert_eq!(p.winc, Some(1000));
        assert_eq!(p.movestogo, Some(30));
        assert_eq!(p.nodes, Some(5000));
        assert!(!p.infinite);

        let Some(UciCommand::Go(p)) = parse_command("go infinite").unwrap() else {
            panic!()
        };
        assert!(p.infinite);
    }

    #[test]
    fn go_searchmoves_stops_at_the_next_keyword() {
        let Some(UciCommand::Go(p)) =
            parse_command("go searchmoves e2e4 d2d4 movetime 1000").unwrap()
        else {
            panic!()
        };
        assert_eq!(p.searchmoves, vec!["e2e4", "d2d4"]);
        assert_eq!(p.movetime, Some(1000));
    }

    #[test]
    fn go_with_bad_number_is_malformed() {
        assert!(parse_command("go wtime soon").is_err());
    }

    #[test]
    fn info_and_bestmove_formatting() {
        let info = ThinkingInfo {
            depth: 4,
            seldepth: 11,
            time_ms: 321,
            nodes: 1000,
            nps: 3115,
            hashfull: 12,
            score_cp: -35,
            pv: vec!["e2e4".into(), "e7e5".into()],
            comment: None,
        };
        assert_eq!(
            format_info(&info),
            "info depth 4 seldepth 11 time 321 nodes 1000 score cp -35 nps 3115 hashfull 12 pv e2e4 e7e5"
        );
        let stats = ThinkingInfo {
            comment: Some("e2e4 N: 12".to_string()),
            ..ThinkingInfo::default()
        };
        assert_eq!(format_info(&stats), "info string e2e4 N: 12");

        assert_eq!(
            format_bestmove(&BestMoveInfo {
                best: Some("e2e4".to_string()),
                ponder: None,
            }),
            "bestmove e2e4"
        );
        assert_eq!(format_bestmove(&BestMoveInfo::default()), "bestmove 0000");
    }
}
