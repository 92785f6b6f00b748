//! Tree nodes and their statistics.

use std::sync::atomic::{AtomicU32, Ordering};

use cozy_chess::Move;

pub type NodeId = u32;

/// Game-theoretic state of a node, from the point of view of the side to move
/// at the node's position. Once set it never changes and the node stays
/// childless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    NonTerminal,
    /// Side to move wins (cannot arise from the rules alone, kept for
    /// completeness of the state space).
    Win,
    /// Side to move is checkmated.
    Loss,
    Draw,
}

/// One node of the search tree.
///
/// `q` and `v` are stored from the point of view of the player who made
/// `mv` (the network value is negated on fetch to match). Plain fields are
/// written only under the exclusive tree lock; `n_in_flight` is atomic so
/// selection can claim nodes while others hold the lock shared.
pub struct Node {
    pub(crate) mv: Option<Move>,
    pub(crate) nn_idx: u16,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) n: u32,
    pub(crate) n_in_flight: AtomicU32,
    pub(crate) q: f32,
    pub(crate) v: f32,
    pub(crate) p: f32,
    pub(crate) terminal: Terminal,
    pub(crate) max_depth: u16,
    pub(crate) full_depth: u16,
}

impl Node {
    pub(crate) fn new(mv: Option<Move>, nn_idx: u16, parent: Option<NodeId>) -> Self {
        Self {
            mv,
            nn_idx,
            parent,
            children: Vec::new(),
            n: 0,
            n_in_flight: AtomicU32::new(0),
            q: 0.0,
            v: 0.0,
            p: 0.0,
            terminal: Terminal::NonTerminal,
            max_depth: 0,
            full_depth: 0,
        }
    }

    pub fn mv(&self) -> Option<Move> {
        self.mv
    }

    pub fn nn_index(&self) -> u16 {
        self.nn_idx
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn visits(&self) -> u32 {
        self.n
    }

    pub fn n_in_flight(&self) -> u32 {
        self.n_in_flight.load(Ordering::Acquire)
    }

    /// Visits finished or claimed.
    pub fn n_started(&self) -> u32 {
        self.n + self.n_in_flight()
    }

    /// Mean backed-up value, or `default_q` while unvisited (first-play
    /// urgency baseline supplied by the caller).
    pub fn q(&self, default_q: f32) -> f32 {
        if self.n == 0 {
            default_q
        } else {
            self.q
        }
    }

    pub fn v(&self) -> f32 {
        self.v
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    /// Exploration factor `P / (1 + N_started)`; the caller multiplies by
    /// `c_puct * sqrt(parent children visits)`.
    pub fn u(&self) -> f32 {
        self.p / (1.0 + self.n_started() as f32)
    }

    pub fn terminal(&self) -> Terminal {
        self.terminal
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal != Terminal::NonTerminal
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Visits that went into the children: the node's own first visit paid
    /// for its expansion, every later one descended into some child.
    pub fn children_visits(&self) -> u32 {
        self.n.saturating_sub(1)
    }

    /// Sum of priors over visited children; feeds the FPU reduction.
    pub fn visited_policy(&self, nodes: &[Node]) -> f32 {
        self.children
            .iter()
            .map(|&c| &nodes[c as usize])
            .filter(|c| c.n > 0)
            .map(|c| c.p)
            .sum()
    }

    /// Claim this node for one playout. Fails (a collision) when the node is
    /// an unexpanded leaf some other worker is already extending.
    ///
    /// Must run under the exclusive tree lock; the check and the increment
    /// are only atomic together because writers are serialized there.
    pub fn try_start_score_update(&self) -> bool {
        if self.n == 0 && self.n_in_flight.load(Ordering::Acquire) > 0 {
            return false;
        }
        self.n_in_flight.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Give a claimed visit back without recording a result.
    pub fn cancel_score_update(&self) {
        self.n_in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Record one backed-up value. `gain` scales the running-mean step,
    /// `gamma` warps its 1/n schedule; (1, 1) is the plain mean.
    pub fn finalize_score_update(&mut self, v: f32, gain: f32, gamma: f32) {
        self.n += 1;
        let step = gain / (self.n as f32).powf(gamma);
        self.q += step * (v - self.q);
        self.n_in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Fix the node's game-theoretic result. Clears children; `v` and `q`
    /// become the exact value from the mover's point of view.
    pub fn make_terminal(&mut self, result: Terminal) {
        debug_assert_ne!(result, Terminal::NonTerminal);
        self.terminal = result;
        self.children.clear();
        let value = match result {
            // Side to move checkmated: the move into this node won.
            Terminal::Loss => 1.0,
            Terminal::Win => -1.0,
            _ => 0.0,
        };
        self.v = value;
        self.q = value;
    }

    pub(crate) fn update_max_depth(&mut self, depth: u16) {
        if depth > self.max_depth {
            self.max_depth = depth;
        }
    }
}
