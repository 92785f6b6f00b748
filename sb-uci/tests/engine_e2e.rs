//! End-to-end tests driving the engine controller the way the UCI loop does.

use std::sync::{Arc, Mutex};

use sb_uci::{format_bestmove, format_info, Engine, GoParams};

struct Outputs {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Outputs {
    fn bestmoves(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.starts_with("bestmove"))
            .cloned()
            .collect()
    }
}

fn engine() -> (Engine, Outputs) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let best_lines = lines.clone();
    let info_lines = lines.clone();
    let engine = Engine::new(
        Arc::new(move |bm| {
            best_lines.lock().unwrap().push(format_bestmove(bm));
        }),
        Arc::new(move |info| {
            info_lines.lock().unwrap().push(format_info(info));
        }),
    );
    (engine, Outputs { lines })
}

fn quiet_engine() -> (Engine, Outputs) {
    let (mut e, out) = engine();
    e.set_option("backend", "uniform").unwrap();
    e.set_option("threads", "1").unwrap();
    e.set_option("minibatch-size", "8").unwrap();
    e.set_option("max-prefetch", "4").unwrap();
    (e, out)
}

#[test]
fn options_advertisement_covers_the_surface() {
    let (engine, _) = engine();
    let lines = engine.option_lines();
    for name in [
        "weights",
        "backend",
        "backend-opts",
        "threads",
        "nncache",
        "minibatch-size",
        "max-prefetch",
        "allowed-node-collisions",
        "cpuct",
        "fpu-reduction",
        "policy-softmax-temp",
        "temperature",
        "tempdecay-moves",
        "noise",
        "smart-pruning",
        "verbose-move-stats",
        "virtual-loss-bug",
        "slowmover",
        "move-overhead",
        "time-curve-peak",
        "time-curve-left-width",
        "time-curve-right-width",
        "cache-history-length",
    ] {
        assert!(
            lines.iter().any(|l| l.contains(&format!("option name {name} "))),
            "missing option `{name}`"
        );
    }
    assert!(lines
        .iter()
        .any(|l| l == "option name threads type spin default 2 min 1 max 128"));
}

#[test]
fn bad_option_values_are_rejected_and_recoverable() {
    let (mut engine, _) = engine();
    let err = engine.set_option("threads", "0").unwrap_err();
    assert!(!err.is_fatal());
    let err = engine.set_option("no-such-option", "1").unwrap_err();
    assert!(!err.is_fatal());
    // The engine still works.
    engine.set_option("threads", "1").unwrap();
}

#[test]
fn startpos_moves_equals_the_transposed_fen() {
    let (mut engine, _) = quiet_engine();
    engine
        .set_position(None, &["g1f3".to_string(), "g8f6".to_string()])
        .unwrap();
    let from_moves = engine.position().last().hash();

    engine
        .set_position(
            Some("rnbqkb1r/pppppppp/5n2/8/8/5N2/PPPPPPPP/RNBQKB1R w KQkq - 2 2"),
            &[],
        )
        .unwrap();
    assert_eq!(engine.position().last().hash(), from_moves);
    assert_eq!(engine.position().last().game_ply(), 2);
}

#[test]
fn malformed_positions_and_moves_are_protocol_errors() {
    let (mut engine, _) = quiet_engine();
    assert!(engine.set_position(Some("not a fen"), &[]).is_err());
    assert!(engine
        .set_position(None, &["e2e5".to_string()])
        .is_err());
    // Prior state survives a rejected command.
    engine.set_position(None, &["e2e4".to_string()]).unwrap();
    assert!(engine.position().is_black_to_move());
}

#[test]
fn go_nodes_produces_a_best_move() {
    let (mut engine, out) = quiet_engine();
    engine.set_position(None, &[]).unwrap();
    engine
        .go(&GoParams {
            nodes: Some(64),
            ..GoParams::default()
        })
        .unwrap();
    engine.wait_search().unwrap();
    let bests = out.bestmoves();
    assert_eq!(bests.len(), 1, "got {bests:?}");
    assert!(bests[0].starts_with("bestmove "));
    assert_ne!(bests[0], "bestmove 0000");
}

#[test]
fn mate_in_one_through_the_whole_engine() {
    let (mut engine, out) = quiet_engine();
    engine
        .set_position(Some("7k/5Q2/6K1/8/8/8/8/8 w - - 0 1"), &[])
        .unwrap();
    engine
        .go(&GoParams {
            nodes: Some(400),
            ..GoParams::default()
        })
        .unwrap();
    engine.wait_search().unwrap();
    let bests = out.bestmoves();
    assert_eq!(bests.len(), 1);
    let mv = bests[0].trim_start_matches("bestmove ").to_string();
    assert!(
        ["f7f8", "f7g7", "f7h7"].contains(&mv.as_str()),
        "expected a mate, got {mv}"
    );
}

#[test]
fn stalemate_answers_with_the_null_move() {
    let (mut engine, out) = quiet_engine();
    engine
        .set_position(Some("7k/5Q2/7K/8/8/8/8/8 b - - 0 1"), &[])
        .unwrap();
    engine
        .go(&GoParams {
            nodes: Some(1),
            ..GoParams::default()
        })
        .unwrap();
    engine.wait_search().unwrap();
    assert_eq!(out.bestmoves(), vec!["bestmove 0000".to_string()]);
}

#[test]
fn searchmoves_forces_the_answer() {
    let (mut engine, out) = quiet_engine();
    engine.set_position(None, &[]).unwrap();
    engine
        .go(&GoParams {
            nodes: Some(200),
            searchmoves: vec!["e2e4".to_string()],
            ..GoParams::default()
        })
        .unwrap();
    engine.wait_search().unwrap();
    assert_eq!(out.bestmoves(), vec!["bestmove e2e4".to_string()]);

    let stats = engine.search().unwrap().stats();
    for child in stats.root_children {
        if child.mv != "e2e4" {
            assert_eq!(child.visits, 0);
        }
    }
}

#[test]
fn illegal_searchmoves_are_rejected_before_searching() {
    let (mut engine, out) = quiet_engine();
    engine.set_position(None, &[]).unwrap();
    let err = engine
        .go(&GoParams {
            nodes: Some(10),
            searchmoves: vec!["e2e5".to_string()],
            ..GoParams::default()
        })
        .unwrap_err();
    assert!(!err.is_fatal());
    assert!(out.bestmoves().is_empty());
}

#[test]
fn stop_ends_an_infinite_search_with_one_answer() {
    let (mut engine, out) = quiet_engine();
    engine.set_position(None, &[]).unwrap();
    engine
        .go(&GoParams {
            infinite: true,
            ..GoParams::default()
        })
        .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(out.bestmoves().is_empty());
    engine.stop().unwrap();
    assert_eq!(out.bestmoves().len(), 1);
}

#[test]
fn new_game_clears_the_cache() {
    let (mut engine, _) = quiet_engine();
    engine.set_position(None, &[]).unwrap();
    engine
        .go(&GoParams {
            nodes: Some(64),
            ..GoParams::default()
        })
        .unwrap();
    engine.wait_search().unwrap();
    assert!(engine.cache().len() > 0);
    engine.new_game().unwrap();
    assert_eq!(engine.cache().len(), 0);
}

#[test]
fn nncache_option_resizes_immediately() {
    let (mut engine, _) = quiet_engine();
    engine.set_position(None, &[]).unwrap();
    engine
        .go(&GoParams {
            nodes: Some(64),
            ..GoParams::default()
        })
        .unwrap();
    engine.wait_search().unwrap();
    let filled = engine.cache().len();
    assert!(filled > 0);
    engine.set_option("nncache", "16").unwrap();
    assert!(engine.cache().len() <= 16);
    assert_eq!(engine.cache().capacity(), 16);
}

#[test]
fn unknown_backend_weights_failure_is_fatal_at_isready() {
    let (mut engine, _) = engine();
    engine.set_option("backend", "dense").unwrap();
    engine
        .set_option("weights", "/nonexistent/net.safetensors")
        .unwrap();
    let err = engine.ensure_ready().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn debuglog_records_search_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("debug.ndjson");
    let (mut engine, _) = quiet_engine();
    engine
        .set_option("debuglog", path.to_str().unwrap())
        .unwrap();
    engine.set_position(None, &[]).unwrap();
    engine
        .go(&GoParams {
            nodes: Some(32),
            ..GoParams::default()
        })
        .unwrap();
    engine.wait_search().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.lines().any(|l| l.contains("\"bestmove\"")));
    for line in text.lines() {
        let _: serde_json::Value = serde_json::from_str(line).unwrap();
    }
}
