//! The engine controller: options, network lifecycle, position state and the
//! handoff to the search.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use sb_chess::{MoveError, PositionError, PositionHistory};
use sb_log::{ts_ms_now, BestMoveEventV1, NdjsonWriter, SearchTickEventV1};
use sb_net::{
    backend_names, create_network, discover_weights, NetError, Network, NetworkConfig, NnCache,
    AUTODISCOVER,
};
use sb_search::{BestMoveInfo, Search, SearchError, SearchParams, ThinkingInfo};

use crate::options::{OptionKind, Options, OptionsError};
use crate::time::{populate_search_limits, TimeConfig};
use crate::uci::GoParams;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("debug log: {0}")]
    DebugLog(String),
}

impl EngineError {
    /// Fatal errors mean a broken backend or corrupt weights; everything else
    /// the user can fix from the GUI.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Net(_) | Self::Backend(_))
    }
}

pub type InfoSink = Arc<dyn Fn(&ThinkingInfo) + Send + Sync>;
pub type BestMoveSink = Arc<dyn Fn(&BestMoveInfo) + Send + Sync>;

/// Everything behind the protocol loop.
pub struct Engine {
    options: Options,
    cache: Arc<NnCache>,
    network: Option<Arc<dyn Network>>,
    loaded: Option<NetworkConfig>,
    history: PositionHistory,
    search: Option<Search>,
    search_counter: u64,
    best_move_sink: BestMoveSink,
    info_sink: InfoSink,
    log: Arc<Mutex<Option<NdjsonWriter>>>,
}

impl Engine {
    pub fn new(best_move_sink: BestMoveSink, info_sink: InfoSink) -> Self {
        let options = default_options();
        let cache = Arc::new(NnCache::new(options.get_int("nncache") as usize));
        Self {
            options,
            cache,
            network: None,
            loaded: None,
            history: PositionHistory::starting(),
            search: None,
            search_counter: 0,
            best_move_sink,
            info_sink,
            log: Arc::new(Mutex::new(None)),
        }
    }

    /// `option ...` advertisement lines for the `uci` reply.
    pub fn option_lines(&self) -> Vec<String> {
        self.options.uci_lines()
    }

    /// Apply one `setoption`. Cache resizing is immediate; weights/backend
    /// changes take effect at the next readiness check.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.options.set(name, value)?;
        if name.eq_ignore_ascii_case("nncache") {
            self.cache
                .set_capacity(self.options.get_int("nncache") as usize);
        }
        if name.eq_ignore_ascii_case("debuglog") {
            let path = self.options.get_str("debuglog").to_string();
            let mut log = self.log.lock();
            *log = if path.is_empty() {
                None
            } else {
                Some(
                    NdjsonWriter::open_append(&path)
                        .map_err(|e| EngineError::DebugLog(e.to_string()))?,
                )
            };
        }
        Ok(())
    }

    /// Load (or reload) the network if the relevant options changed.
    pub fn ensure_ready(&mut self) -> Result<(), EngineError> {
        let cfg = self.network_config()?;
        if self.loaded.as_ref() != Some(&cfg) {
            self.network = Some(create_network(&cfg)?);
            self.loaded = Some(cfg);
        }
        Ok(())
    }

    fn network_config(&self) -> Result<NetworkConfig, EngineError> {
        let backend = self.options.get_str("backend").to_string();
        let weights_opt = self.options.get_str("weights");
        let weights = if weights_opt.is_empty() {
            None
        } else if weights_opt == AUTODISCOVER {
            if backend == "dense" {
                let cwd = std::env::current_dir()
                    .map_err(|e| EngineError::Backend(e.to_string()))?;
                Some(discover_weights(&cwd).ok_or_else(|| {
                    NetError::WeightsLoad(format!(
                        "no weights file found in {}",
                        cwd.display()
                    ))
                })?)
            } else {
                // Weightless backends ignore the sentinel.
                None
            }
        } else {
            Some(PathBuf::from(weights_opt))
        };
        Ok(NetworkConfig {
            backend,
            weights,
            options: self.options.get_str("backend-opts").to_string(),
        })
    }

    /// Reset for a new game: fresh cache and tree, network re-checked.
    pub fn new_game(&mut self) -> Result<(), EngineError> {
        self.search = None;
        self.cache.clear();
        self.history = PositionHistory::starting();
        self.ensure_ready()
    }

    /// `position [startpos|fen ...] moves ...`
    pub fn set_position(&mut self, fen: Option<&str>, moves: &[String]) -> Result<(), EngineError> {
        // A running search refers to the old position; tear it down quietly.
        self.search = None;
        let mut history = match fen {
            Some(fen) => PositionHistory::from_fen(fen)?,
            None => PositionHistory::starting(),
        };
        for mv in moves {
            let parsed = sb_chess::parse_uci_move(history.last().board(), mv)?;
            history.try_append(parsed)?;
        }
        self.history = history;
        Ok(())
    }

    pub fn position(&self) -> &PositionHistory {
        &self.history
    }

    /// Start searching; returns immediately. The best move arrives through
    /// the sink when a limit is hit or `stop` arrives.
    pub fn go(&mut self, params: &GoParams) -> Result<(), EngineError> {
        self.stop()?;
        self.ensure_ready()?;
        let network = self
            .network
            .clone()
            .ok_or_else(|| EngineError::Backend("network not loaded".to_string()))?;

        let mut limits = populate_search_limits(
            params,
            self.history.last().game_ply(),
            self.history.is_black_to_move(),
            &self.time_config(),
        );
        let board = self.history.last().board();
        for mv in &params.searchmoves {
            let parsed = sb_chess::parse_uci_move(board, mv)?;
            if !board.is_legal(parsed) {
                return Err(MoveError::Parse(mv.clone()).into());
            }
            limits.searchmoves.push(parsed);
        }

        self.search_counter += 1;
        let search_params = self.search_params();

        let log = self.log.clone();
        let sink = self.info_sink.clone();
        let info_cb = Box::new(move |info: &ThinkingInfo| {
            if info.comment.is_none() {
                if let Some(w) = log.lock().as_mut() {
                    let _ = w.write_event(&SearchTickEventV1 {
                        event: "search_tick",
                        ts_ms: ts_ms_now(),
                        depth: info.depth,
                        seldepth: info.seldepth,
                        time_ms: info.time_ms,
                        nodes: info.nodes,
                        nps: info.nps,
                        hashfull: info.hashfull,
                        score_cp: info.score_cp,
                        pv: info.pv.clone(),
                    });
                }
            }
            sink(info);
        });

        let log = self.log.clone();
        let sink = self.best_move_sink.clone();
        let best_cb = Box::new(move |bm: &BestMoveInfo| {
            if let Some(w) = log.lock().as_mut() {
                let _ = w.write_event(&BestMoveEventV1 {
                    event: "bestmove",
                    ts_ms: ts_ms_now(),
                    best: bm.best.clone().unwrap_or_else(|| "0000".to_string()),
                    ponder: bm.ponder.clone(),
                });
            }
            sink(bm);
        });

        let search = Search::new(
            network,
            self.cache.clone(),
            self.history.clone(),
            limits,
            search_params,
            best_cb,
            info_cb,
        )?;
        search.start(self.options.get_int("threads") as usize);
        self.search = Some(search);
        Ok(())
    }

    /// Stop the running search (if any) and wait for its final answer.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if let Some(search) = self.search.take() {
            search.stop();
            search.wait();
            if let Some(err) = search.fatal_error() {
                return Err(EngineError::Backend(err));
            }
        }
        Ok(())
    }

    /// Wait for the running search to finish on its own limits.
    pub fn wait_search(&mut self) -> Result<(), EngineError> {
        let fatal = match &self.search {
            Some(search) => {
                search.wait();
                search.fatal_error()
            }
            None => None,
        };
        if let Some(err) = fatal {
            self.search = None;
            return Err(EngineError::Backend(err));
        }
        Ok(())
    }

    pub fn search(&self) -> Option<&Search> {
        self.search.as_ref()
    }

    pub fn cache(&self) -> &Arc<NnCache> {
        &self.cache
    }

    fn time_config(&self) -> TimeConfig {
        TimeConfig {
            slowmover: self.options.get_float("slowmover"),
            move_overhead_ms: self.options.get_int("move-overhead"),
            peak: self.options.get_float("time-curve-peak"),
            left_width: self.options.get_float("time-curve-left-width"),
            right_width: self.options.get_float("time-curve-right-width"),
        }
    }

    fn search_params(&self) -> SearchParams {
        SearchParams {
            minibatch_size: self.options.get_int("minibatch-size") as usize,
            max_prefetch: self.options.get_int("max-prefetch") as usize,
            allowed_collisions: self.options.get_int("allowed-node-collisions") as usize,
            cpuct: self.options.get_float("cpuct"),
            fpu_reduction: self.options.get_float("fpu-reduction"),
            policy_softmax_temp: self.options.get_float("policy-softmax-temp"),
            temperature: self.options.get_float("temperature"),
            tempdecay_moves: self.options.get_int("tempdecay-moves") as u32,
            noise: self.options.get_bool("noise"),
            smart_pruning: self.options.get_bool("smart-pruning"),
            verbose_move_stats: self.options.get_bool("verbose-move-stats"),
            virtual_loss_bug: self.options.get_float("virtual-loss-bug"),
            backprop_gain: self.options.get_float("backpropagate-gain"),
            backprop_gamma: self.options.get_float("backpropagate-gamma"),
            cache_history_length: self.options.get_int("cache-history-length") as usize,
            seed: splitmix64(self.search_counter),
        }
    }
}

fn default_options() -> Options {
    let mut o = Options::new();
    o.add(
        "weights",
        OptionKind::Text {
            default: AUTODISCOVER.to_string(),
        },
    );
    o.add(
        "backend",
        OptionKind::Choice {
            choices: backend_names().iter().map(|s| s.to_string()).collect(),
            default: backend_names()[0].to_string(),
        },
    );
    o.add(
        "backend-opts",
        OptionKind::Text {
            default: String::new(),
        },
    );
    o.add(
        "threads",
        OptionKind::Int {
            min: 1,
            max: 128,
            default: 2,
        },
    );
    o.add(
        "nncache",
        OptionKind::Int {
            min: 0,
            max: 999_999_999,
            default: 200_000,
        },
    );
    o.add(
        "minibatch-size",
        OptionKind::Int {
            min: 1,
            max: 1024,
            default: 256,
        },
    );
    o.add(
        "max-prefetch",
        OptionKind::Int {
            min: 0,
            max: 1024,
            default: 32,
        },
    );
    o.add(
        "allowed-node-collisions",
        OptionKind::Int {
            min: 0,
            max: 1024,
            default: 32,
        },
    );
    o.add(
        "cpuct",
        OptionKind::Float {
            min: 0.0,
            max: 100.0,
            default: 3.4,
        },
    );
    o.add(
        "fpu-reduction",
        OptionKind::Float {
            min: -100.0,
            max: 100.0,
            default: 0.9,
        },
    );
    o.add(
        "policy-softmax-temp",
        OptionKind::Float {
            min: 0.1,
            max: 10.0,
            default: 2.2,
        },
    );
    o.add(
        "temperature",
        OptionKind::Float {
            min: 0.0,
            max: 100.0,
            default: 0.0,
        },
    );
    o.add(
        "tempdecay-moves",
        OptionKind::Int {
            min: 0,
            max: 100,
            default: 0,
        },
    );
    o.add("noise", OptionKind::Bool { default: false });
    o.add("smart-pruning", OptionKind::Bool { default: true });
    o.add("verbose-move-stats", OptionKind::Bool { default: false });
    o.add(
        "virtual-loss-bug",
        OptionKind::Float {
            min: -100.0,
            max: 100.0,
            default: 0.0,
        },
    );
    o.add(
        "backpropagate-gain",
        OptionKind::Float {
            min: 0.0,
            max: 100.0,
            default: 1.0,
        },
    );
    o.add(
        "backpropagate-gamma",
        OptionKind::Float {
            min: -100.0,
            max: 100.0,
            default: 1.0,
        },
    );
    o.add(
        "cache-history-length",
        OptionKind::Int {
            min: 0,
            max: 7,
            default: 7,
        },
    );
    o.add(
        "slowmover",
        OptionKind::Float {
            min: 0.0,
            max: 100.0,
            default: 1.93,
        },
    );
    o.add(
        "move-overhead",
        OptionKind::Int {
            min: 0,
            max: 10_000,
            default: 100,
        },
    );
    o.add(
        "time-curve-peak",
        OptionKind::Float {
            min: -1000.0,
            max: 1000.0,
            default: 26.0,
        },
    );
    o.add(
        "time-curve-left-width",
        OptionKind::Float {
            min: 0.0,
            max: 1000.0,
            default: 67.0,
        },
    );
    o.add(
        "time-curve-right-width",
        OptionKind::Float {
            min: 0.0,
            max: 1000.0,
            default: 76.0,
        },
    );
    o.add(
        "debuglog",
        OptionKind::Text {
            default: String::new(),
        },
    );
    o
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
