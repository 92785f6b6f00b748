//! The search proper: worker threads over a shared tree.
//!
//! Each worker iteration gathers a minibatch of leaves (claiming them through
//! the in-flight counters), extends them, runs one batched cache-aware NN
//! computation, distributes the results, and backs values up to the root.
//!
//! Two locks exist: the tree RwLock (exclusive for expansion and backup,
//! shared for scoring) and the counters mutex for scalar search state. They
//! are always taken in that order, and neither is held across an NN compute.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gamma};
use thiserror::Error;

use sb_chess::{format_uci_move, nn_index, PositionHistory};
use sb_net::{encode_history, CachingComputation, Network, NnCache};

use crate::info::{q_to_centipawns, BestMoveCallback, BestMoveInfo, InfoCallback, ThinkingInfo};
use crate::limits::SearchLimits;
use crate::node::{Node, NodeId, Terminal};
use crate::params::SearchParams;
use crate::tree::Tree;

const SMART_PRUNING_TOLERANCE_NODES: i64 = 100;
const SMART_PRUNING_TOLERANCE_MS: u64 = 200;
/// Maximum delay between `info` lines when nothing interesting happens.
const UCI_INFO_MINIMUM_FREQUENCY_MS: u64 = 5000;
/// Depth reported for subtrees proven to the end of the game.
const TERMINAL_FULL_DEPTH: u16 = 999;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search parameters: {0}")]
    InvalidParams(&'static str),
}

/// Per-root-child snapshot, for callers that want to inspect the result.
#[derive(Clone, Debug)]
pub struct RootChildStat {
    pub mv: String,
    pub visits: u32,
    pub n_in_flight: u32,
    pub q: f32,
    pub p: f32,
    pub terminal: Terminal,
}

/// Aggregate snapshot of a (possibly finished) search.
#[derive(Clone, Debug)]
pub struct SearchStats {
    pub total_playouts: u64,
    pub tree_nodes: usize,
    pub root_children: Vec<RootChildStat>,
}

#[derive(Default)]
struct Counters {
    stop: bool,
    responded_bestmove: bool,
    found_best_move: bool,
    fatal_error: Option<String>,
    total_playouts: u64,
    remaining_playouts: u64,
    best_move_node: Option<NodeId>,
    last_outputted_best: Option<NodeId>,
    last_info_depth: u16,
    last_info_seldepth: u16,
    last_info_time: u64,
    final_best: Option<BestMoveInfo>,
}

struct SearchCtx {
    tree: RwLock<Tree>,
    counters: Mutex<Counters>,
    rng: Mutex<ChaCha8Rng>,
    network: Arc<dyn Network>,
    cache: Arc<NnCache>,
    played_history: PositionHistory,
    limits: SearchLimits,
    params: SearchParams,
    start: Instant,
    initial_visits: u32,
    best_move_cb: BestMoveCallback,
    info_cb: InfoCallback,
}

/// One search from one position. Owns the tree and the worker pool.
pub struct Search {
    ctx: Arc<SearchCtx>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Search {
    pub fn new(
        network: Arc<dyn Network>,
        cache: Arc<NnCache>,
        played_history: PositionHistory,
        limits: SearchLimits,
        params: SearchParams,
        best_move_cb: BestMoveCallback,
        info_cb: InfoCallback,
    ) -> Result<Self, SearchError> {
        params.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(params.seed);
        let ctx = SearchCtx {
            tree: RwLock::new(Tree::new()),
            counters: Mutex::new(Counters {
                remaining_playouts: u64::MAX >> 1,
                ..Counters::default()
            }),
            rng: Mutex::new(rng),
            network,
            cache,
            played_history,
            limits,
            params,
            start: Instant::now(),
            initial_visits: 0,
            best_move_cb,
            info_cb,
        };
        Ok(Self {
            ctx: Arc::new(ctx),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Spawn workers until `thread_count` are running. Returns immediately.
    pub fn start(&self, thread_count: usize) {
        let mut threads = self.threads.lock();
        while threads.len() < thread_count {
            let ctx = self.ctx.clone();
            let worker_idx = threads.len() as u64;
            threads.push(thread::spawn(move || {
                SearchWorker::new(ctx, worker_idx).run_blocking();
            }));
        }
    }

    /// Run to completion on the calling thread (plus `thread_count - 1`
    /// spawned workers when more than one was asked for).
    pub fn run_blocking(&self, thread_count: usize) {
        if thread_count <= 1 {
            SearchWorker::new(self.ctx.clone(), 0).run_blocking();
        } else {
            self.start(thread_count);
            self.wait();
        }
    }

    /// Ask workers to finish the current iteration and exit. The final
    /// best-move callback still fires.
    pub fn stop(&self) {
        self.ctx.counters.lock().stop = true;
    }

    /// Stop without emitting a best move. Used on teardown.
    pub fn abort(&self) {
        let mut c = self.ctx.counters.lock();
        c.responded_bestmove = true;
        c.stop = true;
    }

    /// Join all workers.
    pub fn wait(&self) {
        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn total_playouts(&self) -> u64 {
        self.ctx.counters.lock().total_playouts
    }

    /// The emitted best move, once a worker has responded.
    pub fn best_move(&self) -> Option<BestMoveInfo> {
        self.ctx.counters.lock().final_best.clone()
    }

    /// A backend failure recorded by a worker; the search is already stopped.
    pub fn fatal_error(&self) -> Option<String> {
        self.ctx.counters.lock().fatal_error.clone()
    }

    pub fn stats(&self) -> SearchStats {
        let t = self.ctx.tree.read();
        let c = self.ctx.counters.lock();
        let board = self.ctx.played_history.last().board();
        let root_children = t
            .get(t.root())
            .children()
            .iter()
            .map(|&id| {
                let child = t.get(id);
                RootChildStat {
                    mv: child
                        .mv()
                        .map(|m| format_uci_move(board, m))
                        .unwrap_or_default(),
                    visits: child.visits(),
                    n_in_flight: child.n_in_flight(),
                    q: child.q(0.0),
                    p: child.p(),
                    terminal: child.terminal(),
                }
            })
            .collect();
        SearchStats {
            total_playouts: c.total_playouts,
            tree_nodes: t.len(),
            root_children,
        }
    }
}

impl Drop for Search {
    fn drop(&mut self) {
        self.abort();
        self.wait();
    }
}

impl SearchCtx {
    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn is_root_move_allowed(&self, node: &Node) -> bool {
        if self.limits.searchmoves.is_empty() {
            return true;
        }
        node.mv()
            .map(|m| self.limits.searchmoves.contains(&m))
            .unwrap_or(false)
    }

    /// Refresh the playouts-per-second estimate and derive how many playouts
    /// the tightest active limit still allows.
    fn update_remaining_moves(&self) {
        if !self.params.smart_pruning {
            return;
        }
        let mut c = self.counters.lock();
        let mut remaining = i64::MAX;
        if let Some(time_ms) = self.limits.time_ms {
            let elapsed = self.elapsed_ms();
            if elapsed > SMART_PRUNING_TOLERANCE_MS {
                let nps = (1000 * c.total_playouts as i64 + SMART_PRUNING_TOLERANCE_NODES)
                    / (elapsed - SMART_PRUNING_TOLERANCE_MS) as i64
                    + 1;
                let remaining_time = time_ms as i64 - elapsed as i64;
                remaining = remaining.min(remaining_time * nps / 1000);
            }
        }
        if let Some(visits) = self.limits.visits {
            // A batch may overshoot the limit by up to one minibatch.
            remaining = remaining.min(
                visits as i64 - c.total_playouts as i64 - i64::from(self.initial_visits)
                    + self.params.minibatch_size as i64
                    - 1,
            );
        }
        if let Some(playouts) = self.limits.playouts {
            remaining = remaining
                .min(playouts as i64 - c.total_playouts as i64 + self.params.minibatch_size as i64);
        }
        c.remaining_playouts = remaining.max(1) as u64;
    }

    /// Emit an `info` line when the best move, depth or seldepth changed, or
    /// the last line is getting stale.
    fn maybe_output_info(&self) {
        let t = self.tree.read();
        let mut c = self.counters.lock();
        if c.responded_bestmove {
            return;
        }
        let Some(best) = c.best_move_node else {
            return;
        };
        let root = t.get(t.root());
        if c.last_outputted_best != Some(best)
            || c.last_info_depth != root.full_depth
            || c.last_info_seldepth != root.max_depth
            || c.last_info_time + UCI_INFO_MINIMUM_FREQUENCY_MS < self.elapsed_ms()
        {
            self.send_uci_info(&t, &mut c);
        }
    }

    fn send_uci_info(&self, t: &Tree, c: &mut Counters) {
        let Some(best) = c.best_move_node else {
            return;
        };
        let root = t.get(t.root());
        let time_ms = self.elapsed_ms();
        let mut info = ThinkingInfo {
            depth: root.full_depth,
            seldepth: root.max_depth,
            time_ms,
            nodes: c.total_playouts + u64::from(self.initial_visits),
            nps: if time_ms > 0 {
                c.total_playouts * 1000 / time_ms
            } else {
                0
            },
            hashfull: (self.cache.len() * 1000 / self.cache.capacity().max(1)) as u32,
            score_cp: q_to_centipawns(t.get(best).q(0.0)),
            pv: Vec::new(),
            comment: None,
        };

        let mut board = self.played_history.last().board().clone();
        let mut cur = Some(best);
        while let Some(id) = cur {
            let mv = t.get(id).mv().expect("pv nodes carry moves");
            info.pv.push(format_uci_move(&board, mv));
            board.play(mv);
            cur = self.best_child_no_temperature(t, id);
        }

        c.last_outputted_best = Some(best);
        c.last_info_depth = info.depth;
        c.last_info_seldepth = info.seldepth;
        c.last_info_time = time_ms;
        (self.info_cb)(&info);
    }

    /// One `info string` line per root child, least visited first.
    fn send_move_stats(&self, t: &Tree) {
        let root = t.get(t.root());
        let board = self.played_history.last().board();
        let parent_q =
            -root.q(0.0) - self.params.fpu_reduction * root.visited_policy(t.nodes()).sqrt();
        let puct_mult = self.params.cpuct * (root.children_visits().max(1) as f32).sqrt();

        let mut children: Vec<&Node> = root.children().iter().map(|&id| t.get(id)).collect();
        children.sort_by_key(|c| c.visits());
        for child in children {
            let Some(mv) = child.mv() else { continue };
            let u = child.u() * puct_mult;
            let q = child.q(parent_q);
            let line = format!(
                "{:<5} ({:>4}) N: {:>7} (+{:>2}) (V: {:>6.2}%) (P: {:>5.2}%) (Q: {:>8.5}) (U: {:>6.5}) (Q+U: {:>8.5})",
                format_uci_move(board, mv),
                child.nn_index(),
                child.visits(),
                child.n_in_flight(),
                child.v() * 100.0,
                child.p() * 100.0,
                q,
                u,
                q + u,
            );
            (self.info_cb)(&ThinkingInfo {
                comment: Some(line),
                ..ThinkingInfo::default()
            });
        }
    }

    /// Check every stop condition; the first worker to see `stop` with no
    /// response yet emits the final best move.
    fn maybe_trigger_stop(&self) {
        let t = self.tree.read();
        let mut c = self.counters.lock();
        // Don't stop until the root has been expanded.
        if c.total_playouts == 0 {
            return;
        }
        if c.found_best_move {
            c.stop = true;
        }
        if let Some(playouts) = self.limits.playouts {
            if c.total_playouts >= playouts {
                c.stop = true;
            }
        }
        if let Some(visits) = self.limits.visits {
            if c.total_playouts + u64::from(self.initial_visits) >= visits {
                c.stop = true;
            }
        }
        if let Some(time_ms) = self.limits.time_ms {
            if self.elapsed_ms() >= time_ms {
                c.stop = true;
            }
        }
        if c.stop && !c.responded_bestmove {
            self.send_uci_info(&t, &mut c);
            if self.params.verbose_move_stats {
                self.send_move_stats(&t);
            }
            let best = self.best_move_internal(&t);
            (self.best_move_cb)(&best);
            c.final_best = Some(best);
            c.responded_bestmove = true;
            c.best_move_node = None;
        }
    }

    /// Best move under the temperature settings (if any).
    fn best_move_internal(&self, t: &Tree) -> BestMoveInfo {
        let root_id = t.root();
        if !t.get(root_id).has_children() {
            return BestMoveInfo::default();
        }

        let mut temperature = self.params.temperature;
        if temperature > 0.0 && self.params.tempdecay_moves > 0 {
            let moves = self.played_history.last().game_ply() / 2;
            if moves >= self.params.tempdecay_moves {
                temperature = 0.0;
            } else {
                temperature *= (self.params.tempdecay_moves - moves) as f32
                    / self.params.tempdecay_moves as f32;
            }
        }

        let best = if temperature > 0.0 && t.get(root_id).visits() > 1 {
            self.best_child_with_temperature(t, root_id, temperature)
        } else {
            self.best_child_no_temperature(t, root_id)
        };
        match best {
            Some(id) => {
                let mv = t.get(id).mv().expect("root children carry moves");
                BestMoveInfo {
                    best: Some(format_uci_move(self.played_history.last().board(), mv)),
                    ponder: None,
                }
            }
            None => BestMoveInfo::default(),
        }
    }

    /// Most visits; ties broken by eval, then prior.
    fn best_child_no_temperature(&self, t: &Tree, parent: NodeId) -> Option<NodeId> {
        let is_root = parent == t.root();
        let mut best: Option<(u32, f32, f32, NodeId)> = None;
        for &child_id in t.get(parent).children() {
            let child = t.get(child_id);
            if is_root && !self.is_root_move_allowed(child) {
                continue;
            }
            let cand = (child.visits(), child.q(-10.0), child.p());
            let better = match best {
                None => true,
                Some((n, q, p, _)) => cand > (n, q, p),
            };
            if better {
                best = Some((cand.0, cand.1, cand.2, child_id));
            }
        }
        best.map(|(_, _, _, id)| id)
    }

    /// Draw proportionally to `(n / n_parent)^(1/T)` over the allowed
    /// children. One filtered collection serves both the weights and the
    /// final pick.
    fn best_child_with_temperature(
        &self,
        t: &Tree,
        parent: NodeId,
        temperature: f32,
    ) -> Option<NodeId> {
        let is_root = parent == t.root();
        let n_parent = t.get(parent).visits() as f32;
        let mut allowed: Vec<NodeId> = Vec::new();
        let mut cumulative: Vec<f32> = Vec::new();
        let mut sum = 0.0f32;
        for &child_id in t.get(parent).children() {
            let child = t.get(child_id);
            if is_root && !self.is_root_move_allowed(child) {
                continue;
            }
            sum += (child.visits() as f32 / n_parent).powf(1.0 / temperature);
            cumulative.push(sum);
            allowed.push(child_id);
        }
        if allowed.is_empty() || !(sum.is_finite() && sum > 0.0) {
            return self.best_child_no_temperature(t, parent);
        }
        let toss: f32 = self.rng.lock().gen::<f32>() * sum;
        let idx = cumulative
            .partition_point(|&x| x <= toss)
            .min(allowed.len() - 1);
        Some(allowed[idx])
    }
}

struct NodeToProcess {
    node: NodeId,
    is_collision: bool,
    nn_queried: bool,
}

impl NodeToProcess {
    fn visit(node: NodeId) -> Self {
        Self {
            node,
            is_collision: false,
            nn_queried: false,
        }
    }

    fn collision(node: NodeId) -> Self {
        Self {
            node,
            is_collision: true,
            nn_queried: false,
        }
    }
}

struct SearchWorker {
    ctx: Arc<SearchCtx>,
    history: PositionHistory,
    computation: CachingComputation,
    nodes_to_process: Vec<NodeToProcess>,
    rng: ChaCha8Rng,
}

impl SearchWorker {
    fn new(ctx: Arc<SearchCtx>, worker_idx: u64) -> Self {
        let history = ctx.played_history.clone();
        let computation =
            CachingComputation::new(ctx.network.new_computation(), ctx.cache.clone());
        let rng = ChaCha8Rng::seed_from_u64(
            ctx.params
                .seed
                .wrapping_add(worker_idx.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        );
        Self {
            ctx,
            history,
            computation,
            nodes_to_process: Vec::new(),
            rng,
        }
    }

    fn run_blocking(&mut self) {
        while self.is_search_active() {
            self.execute_one_iteration();
        }
        // A stop that lands between iterations would otherwise leave the
        // final best move unsent.
        self.ctx.maybe_trigger_stop();
    }

    fn is_search_active(&self) -> bool {
        !self.ctx.counters.lock().stop
    }

    fn execute_one_iteration(&mut self) {
        // 1. Fresh computation for this batch.
        self.initialize_iteration();
        // 2. Gather minibatch.
        self.gather_minibatch();
        // 3. Prefetch into cache.
        self.maybe_prefetch_into_cache();
        // 4. Run NN computation.
        if let Err(err) = self.run_nn_computation() {
            let mut c = self.ctx.counters.lock();
            c.fatal_error = Some(err.to_string());
            c.responded_bestmove = true;
            c.stop = true;
            return;
        }
        // 5. Populate nodes with the results.
        self.fetch_nn_results();
        // 6. Back values up to the root.
        self.do_backup_update();
        // 7. Update status and counters.
        self.update_counters();
    }

    fn initialize_iteration(&mut self) {
        self.nodes_to_process.clear();
        self.computation =
            CachingComputation::new(self.ctx.network.new_computation(), self.ctx.cache.clone());
    }

    fn gather_minibatch(&mut self) {
        let ctx = self.ctx.clone();
        let mut nodes_found = 0usize;
        let mut collisions_found = 0usize;

        while nodes_found < ctx.params.minibatch_size {
            // If there is work that needs no NN call, run with it.
            if nodes_found > 0 && self.computation.cache_misses() == 0 {
                return;
            }
            let picked = self.pick_node_to_extend();
            let node = picked.node;
            let is_collision = picked.is_collision;
            self.nodes_to_process.push(picked);

            if is_collision {
                collisions_found += 1;
                if collisions_found > ctx.params.allowed_collisions {
                    return;
                }
                continue;
            }
            nodes_found += 1;

            // A terminal node is a repeat visit; its value backs up as is.
            if ctx.tree.read().get(node).is_terminal() {
                continue;
            }
            self.extend_node(node);

            let t = ctx.tree.read();
            if !t.get(node).is_terminal() {
                if let Some(last) = self.nodes_to_process.last_mut() {
                    last.nn_queried = true;
                }
                self.add_node_to_computation(&t, node, true);
            }
        }
    }

    /// Walk from the root by maximum PUCT score, claiming each node on the
    /// way, until an unexpanded leaf or a collision.
    fn pick_node_to_extend(&mut self) -> NodeToProcess {
        let ctx = self.ctx.clone();
        self.history.trim(ctx.played_history.len());

        // Snapshot of the pruning state the root-child filter uses.
        let (best_move_id, best_node_n, remaining_playouts) = {
            let t = ctx.tree.read();
            let c = ctx.counters.lock();
            let n = c.best_move_node.map(|id| t.get(id).visits()).unwrap_or(0);
            (
                c.best_move_node,
                i64::from(n),
                c.remaining_playouts.min(i64::MAX as u64) as i64,
            )
        };

        let mut node = {
            let t = ctx.tree.read();
            t.root()
        };
        let mut is_root_node = true;

        loop {
            {
                let t = ctx.tree.write();
                let nd = t.get(node);
                if !nd.try_start_score_update() {
                    return NodeToProcess::collision(node);
                }
                if !nd.has_children() {
                    // Unexamined leaf: the end of this playout.
                    return NodeToProcess::visit(node);
                }
            }

            let t = ctx.tree.read();
            let nd = t.get(node);
            let puct_mult = ctx.params.cpuct * (nd.children_visits().max(1) as f32).sqrt();
            let parent_q = if is_root_node && ctx.params.noise {
                -nd.q(0.0)
            } else {
                -nd.q(0.0)
                    - ctx.params.fpu_reduction * nd.visited_policy(t.nodes()).sqrt()
            };
            let parent_n = nd.visits();

            let mut best_score = f32::NEG_INFINITY;
            let mut best_child: Option<NodeId> = None;
            let mut possible_moves = 0usize;
            for &child_id in nd.children() {
                let child = t.get(child_id);
                if is_root_node {
                    // Skip children that cannot catch the current best within
                    // the remaining playouts; always keep the best itself.
                    if Some(child_id) != best_move_id
                        && remaining_playouts < best_node_n - i64::from(child.visits())
                    {
                        continue;
                    }
                    if !ctx.is_root_move_allowed(child) {
                        continue;
                    }
                    possible_moves += 1;
                }
                let mut q = child.q(parent_q);
                if ctx.params.virtual_loss_bug != 0.0 && child.visits() == 0 {
                    q = (q * parent_n as f32 - ctx.params.virtual_loss_bug)
                        / (parent_n as f32 + ctx.params.virtual_loss_bug.abs());
                }
                let score = puct_mult * child.u() + q;
                if score > best_score {
                    best_score = score;
                    best_child = Some(child_id);
                }
            }

            let Some(chosen) = best_child else {
                // Every child filtered out; cannot happen with a sane root
                // filter. Give the claim back and abandon the playout.
                debug_assert!(false, "no child selectable");
                nd.cancel_score_update();
                return NodeToProcess::collision(node);
            };

            self.history
                .append(t.get(chosen).mv().expect("non-root nodes carry moves"));
            if is_root_node && possible_moves <= 1 && !ctx.limits.infinite {
                // Only one move can be played: no point searching further.
                ctx.counters.lock().found_best_move = true;
            }
            is_root_node = false;
            node = chosen;
        }
    }

    /// Generate moves at the leaf; mark terminal or publish children.
    fn extend_node(&mut self, node: NodeId) {
        let ctx = self.ctx.clone();
        let pos = self.history.last();
        let legal = pos.legal_moves();

        if legal.is_empty() {
            let result = if pos.is_under_check() {
                Terminal::Loss
            } else {
                Terminal::Draw
            };
            ctx.tree.write().get_mut(node).make_terminal(result);
            return;
        }

        {
            let t = ctx.tree.read();
            let is_root = node == t.root();
            drop(t);
            // Draws by rule only short-circuit below the root; at the root
            // thinking about them is the point.
            if !is_root
                && (!pos.has_mating_material()
                    || pos.no_capture_ply() >= 100
                    || pos.repetitions() >= 2)
            {
                ctx.tree.write().get_mut(node).make_terminal(Terminal::Draw);
                return;
            }
        }

        let mut t = ctx.tree.write();
        for mv in legal {
            t.add_child(node, mv);
        }
    }

    /// Returns true when the position was already cached (no slot consumed).
    fn add_node_to_computation(&mut self, t: &Tree, node: NodeId, add_if_cached: bool) -> bool {
        let hash = self
            .history
            .hash_last(self.ctx.params.cache_history_length + 1);
        if add_if_cached {
            if self.computation.add_input_by_hash(hash) {
                return true;
            }
        } else if self.ctx.cache.contains(hash) {
            return true;
        }

        let planes = encode_history(&self.history);
        let nd = t.get(node);
        let moves: Vec<u16> = if nd.has_children() {
            nd.children().iter().map(|&c| t.get(c).nn_index()).collect()
        } else {
            // Not yet expanded (speculative prefetch); cache the legal moves.
            self.history
                .last()
                .legal_moves()
                .into_iter()
                .map(nn_index)
                .collect()
        };
        self.computation.add_input(hash, planes, moves);
        false
    }

    /// Spend leftover NN slots on positions likely to be visited soon.
    fn maybe_prefetch_into_cache(&mut self) {
        let ctx = self.ctx.clone();
        let misses = self.computation.cache_misses();
        if misses == 0 || misses >= ctx.params.max_prefetch {
            return;
        }
        self.history.trim(ctx.played_history.len());
        let t = ctx.tree.read();
        let root = t.root();
        let budget = ctx.params.max_prefetch - misses;
        self.prefetch_into_cache(&t, root, budget);
    }

    /// Recursive budgeted descent. The budget splits among children by how
    /// much of it each could absorb before its PUCT score drops to the next
    /// sibling's.
    fn prefetch_into_cache(&mut self, t: &Tree, node: NodeId, mut budget: usize) -> usize {
        if budget == 0 {
            return 0;
        }
        let nd = t.get(node);
        // A leaf nobody started on yet: cache it.
        if nd.n_started() == 0 {
            self.add_node_to_computation(t, node, false);
            return 1;
        }
        // Being extended right now, or proven terminal: nothing to do.
        if nd.visits() == 0 || nd.is_terminal() {
            return 0;
        }

        let puct_mult = self.ctx.params.cpuct * (nd.children_visits().max(1) as f32).sqrt();
        let parent_q = -nd.q(0.0);

        // Score flipped so ascending sort puts the best first.
        let mut scores: Vec<(f32, NodeId)> = nd
            .children()
            .iter()
            .map(|&id| (id, t.get(id)))
            .filter(|(_, child)| child.p() > 0.0)
            .map(|(id, child)| (-(puct_mult * child.u() + child.q(parent_q)), id))
            .collect();
        scores.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut total_spent = 0usize;
        let mut budget_to_spend = budget;
        for i in 0..scores.len() {
            if budget == 0 {
                break;
            }
            let (_, child_id) = scores[i];
            let child = t.get(child_id);
            if i != scores.len() - 1 {
                // Spend on this child only while it would stay ahead of the
                // next-best sibling; the last child inherits the leftovers.
                let next_score = -scores[i + 1].0;
                let q = child.q(-parent_q);
                if next_score > q {
                    let absorb =
                        (child.p() * puct_mult / (next_score - q)) - child.n_started() as f32;
                    budget_to_spend = budget.min((absorb as i64 + 1).max(0) as usize);
                } else {
                    budget_to_spend = budget;
                }
            }
            self.history
                .append(child.mv().expect("non-root nodes carry moves"));
            let spent = self.prefetch_into_cache(t, child_id, budget_to_spend);
            self.history.pop();
            budget -= spent;
            total_spent += spent;
        }
        total_spent
    }

    fn run_nn_computation(&mut self) -> Result<(), sb_net::NetError> {
        if self.computation.batch_size() != 0 {
            self.computation.compute()?;
        }
        Ok(())
    }

    /// Copy values and priors into the queued nodes; apply the policy softmax
    /// temperature and renormalize; mix root noise when enabled.
    fn fetch_nn_results(&mut self) {
        if self.computation.batch_size() == 0 {
            return;
        }
        let ctx = self.ctx.clone();
        let mut t = ctx.tree.write();
        let root = t.root();
        let mut idx = 0usize;
        for ntp in &self.nodes_to_process {
            if !ntp.nn_queried {
                continue;
            }
            let node = ntp.node;
            // The network scores the position for its side to move; this
            // node's stats are from the mover's point of view.
            t.get_mut(node).v = -self.computation.value(idx);

            let children: Vec<NodeId> = t.get(node).children().to_vec();
            let mut total = 0.0f32;
            for &child_id in &children {
                let nn_idx = t.get(child_id).nn_index();
                let mut p = self.computation.policy(idx, nn_idx);
                if ctx.params.policy_softmax_temp != 1.0 {
                    p = p.powf(1.0 / ctx.params.policy_softmax_temp);
                }
                total += p;
                t.get_mut(child_id).p = p;
            }
            if total > 0.0 {
                let scale = 1.0 / total;
                for &child_id in &children {
                    t.get_mut(child_id).p *= scale;
                }
            }
            if ctx.params.noise && node == root {
                apply_dirichlet_noise(&mut t, node, 0.25, 0.3, &mut self.rng);
            }
            idx += 1;
        }
    }

    /// Walk every finalized node up to the root; collisions only return
    /// their claimed visits.
    fn do_backup_update(&mut self) {
        let ctx = self.ctx.clone();
        let mut t = ctx.tree.write();
        let mut c = ctx.counters.lock();
        let root = t.root();

        for ntp in &self.nodes_to_process {
            if ntp.is_collision {
                let mut cur = t.get(ntp.node).parent();
                while let Some(id) = cur {
                    let nd = t.get(id);
                    nd.cancel_score_update();
                    cur = nd.parent();
                }
                continue;
            }

            let leaf = ntp.node;
            let mut v = t.get(leaf).v();
            let mut depth = 0u16;
            let mut cur_full = if t.get(leaf).is_terminal() {
                TERMINAL_FULL_DEPTH
            } else {
                0
            };
            let mut full_updated = true;
            let mut cur = Some(leaf);
            while let Some(id) = cur {
                depth += 1;
                t.get_mut(id).finalize_score_update(
                    v,
                    ctx.params.backprop_gain,
                    ctx.params.backprop_gamma,
                );
                // Sign flips each ply: zero-sum game.
                v = -v;
                t.get_mut(id).update_max_depth(depth);
                if full_updated {
                    full_updated = update_full_depth(&mut t, id, &mut cur_full);
                }

                let parent = t.get(id).parent();
                if parent == Some(root) {
                    let better = match c.best_move_node {
                        None => true,
                        Some(b) => t.get(b).visits() < t.get(id).visits(),
                    };
                    if better {
                        c.best_move_node = Some(id);
                    }
                }
                cur = parent;
            }
            c.total_playouts += 1;
        }
    }

    fn update_counters(&mut self) {
        self.ctx.update_remaining_moves();
        self.ctx.maybe_output_info();
        self.ctx.maybe_trigger_stop();
        // Nothing gathered but collisions: every interesting line is claimed
        // by other workers. Back off briefly.
        let gathered = self.nodes_to_process.iter().any(|n| !n.is_collision);
        if !gathered && self.is_search_active() {
            thread::sleep(Duration::from_millis(10));
        }
    }
}

/// Propagate the fully-explored depth: a node is explored to depth d+1 when
/// all its children are explored to depth d. Returns false once the chain
/// stops improving.
fn update_full_depth(t: &mut Tree, id: NodeId, cur: &mut u16) -> bool {
    let cand = {
        let nd = t.get(id);
        if nd.children().is_empty() {
            *cur
        } else {
            let shallowest = nd
                .children()
                .iter()
                .map(|&c| t.get(c).full_depth)
                .min()
                .unwrap_or(0);
            shallowest.saturating_add(1).min(TERMINAL_FULL_DEPTH)
        }
    };
    let nd = t.get_mut(id);
    if cand > nd.full_depth {
        nd.full_depth = cand;
        *cur = cand;
        true
    } else {
        false
    }
}

fn apply_dirichlet_noise(
    t: &mut Tree,
    node: NodeId,
    eps: f32,
    alpha: f64,
    rng: &mut ChaCha8Rng,
) {
    let children: Vec<NodeId> = t.get(node).children().to_vec();
    if children.is_empty() {
        return;
    }
    let Ok(gamma) = Gamma::new(alpha, 1.0) else {
        return;
    };
    let noise: Vec<f64> = children.iter().map(|_| gamma.sample(rng)).collect();
    let total: f64 = noise.iter().sum();
    if !(total.is_finite() && total > f64::MIN_POSITIVE) {
        return;
    }
    for (&child_id, eta) in children.iter().zip(noise) {
        let nd = t.get_mut(child_id);
        nd.p = nd.p * (1.0 - eps) + eps * (eta / total) as f32;
    }
}
