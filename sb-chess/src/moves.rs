//! Move helpers: UCI text round-trip and the dense policy index.

use cozy_chess::{Board, Move, Piece};
use thiserror::Error;

/// Size of the dense policy head every backend must produce.
///
/// Layout: non-promotions occupy `from * 64 + to` (0..4096); promotions occupy
/// `4096 + (from_file * 3 + (dx + 1)) * 4 + piece` where `dx` is the file
/// delta in {-1, 0, 1} and `piece` indexes N, B, R, Q.
pub const POLICY_SIZE: usize = 4096 + 8 * 3 * 4;

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("illegal or malformed move `{0}`")]
    Parse(String),
}

/// Canonical 16-bit policy index of a move.
pub fn nn_index(mv: Move) -> u16 {
    match mv.promotion {
        Some(piece) => {
            let from_file = mv.from.file() as u16;
            let dx = (mv.to.file() as i16 - mv.from.file() as i16 + 1) as u16;
            let piece = match piece {
                Piece::Knight => 0u16,
                Piece::Bishop => 1,
                Piece::Rook => 2,
                _ => 3,
            };
            4096 + (from_file * 3 + dx) * 4 + piece
        }
        None => (mv.from as u16) * 64 + (mv.to as u16),
    }
}

/// Parse a move in UCI notation in the context of `board`.
///
/// `cozy_chess` encodes castling as king-takes-rook internally; the util
/// helpers translate from/to the standard king-two-squares notation GUIs use.
pub fn parse_uci_move(board: &Board, s: &str) -> Result<Move, MoveError> {
    cozy_chess::util::parse_uci_move(board, s).map_err(|_| MoveError::Parse(s.to_string()))
}

/// Format a move as standard UCI text in the context of `board`.
pub fn format_uci_move(board: &Board, mv: Move) -> String {
    cozy_chess::util::display_uci_move(board, mv).to_string()
}
