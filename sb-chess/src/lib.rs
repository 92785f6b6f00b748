//! sb-chess: move/position model for Sable.
//!
//! Chess rules live in `cozy_chess`; this crate wraps them with the state the
//! search needs: game-ply and repetition counters, a position history with a
//! stable fingerprint over the last K positions, and the canonical policy
//! index every move maps to.

pub mod history;
pub mod moves;
pub mod position;

pub use history::PositionHistory;
pub use moves::{format_uci_move, nn_index, parse_uci_move, MoveError, POLICY_SIZE};
pub use position::{Position, PositionError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
