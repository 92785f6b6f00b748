//! Ordered sequence of positions with repetition tracking and the cache
//! fingerprint over the last K positions.

use cozy_chess::Move;

use crate::moves::MoveError;
use crate::position::{Position, PositionError};

/// The game line from the setup position to the current one.
///
/// Appending recomputes the repetition counter of the new tail; truncation
/// restores a shorter prefix (workers rewind to the played history before
/// every playout).
#[derive(Clone, Debug)]
pub struct PositionHistory {
    positions: Vec<Position>,
}

impl PositionHistory {
    pub fn starting() -> Self {
        Self {
            positions: vec![Position::startpos()],
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        Ok(Self {
            positions: vec![Position::from_fen(fen)?],
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn last(&self) -> &Position {
        self.positions.last().expect("history is never empty")
    }

    pub fn is_black_to_move(&self) -> bool {
        self.last().board().side_to_move() == cozy_chess::Color::Black
    }

    /// Append `mv`, which must be legal in the current position.
    pub fn append(&mut self, mv: Move) {
        let mut next = self.last().child(mv);
        next.set_repetitions(self.count_repetitions(&next));
        self.positions.push(next);
    }

    /// Append a move after checking legality; the checked variant backs the
    /// `position ... moves` command, where input is untrusted.
    pub fn try_append(&mut self, mv: Move) -> Result<(), MoveError> {
        if !self.last().board().is_legal(mv) {
            return Err(MoveError::Parse(mv.to_string()));
        }
        self.append(mv);
        Ok(())
    }

    /// Drop the newest positions until `len` remain.
    pub fn trim(&mut self, len: usize) {
        self.positions.truncate(len);
    }

    /// Drop the newest position.
    pub fn pop(&mut self) {
        self.positions.pop();
        debug_assert!(!self.positions.is_empty());
    }

    /// Stable 64-bit fingerprint of the last `k` positions (board state plus
    /// side to move, both already folded into the zobrist key). Used as the
    /// evaluator cache key; independent of the process hasher.
    pub fn hash_last(&self, k: usize) -> u64 {
        let start = self.positions.len().saturating_sub(k.max(1));
        let mut h = 0x9E37_79B9_7F4A_7C15u64;
        for pos in &self.positions[start..] {
            h = splitmix64(h ^ pos.hash());
        }
        h
    }

    fn count_repetitions(&self, next: &Position) -> u32 {
        // A repetition can only come from within the reversible-move window.
        let window = next.no_capture_ply() as usize;
        for (back, prev) in self.positions.iter().rev().enumerate() {
            if back >= window {
                break;
            }
            if prev.hash() == next.hash() {
                return prev.repetitions() + 1;
            }
        }
        0
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
