//! Position-history → input-plane encoding.

use cozy_chess::{Color, Piece};
use sb_chess::PositionHistory;

/// Number of planes a backend receives per position.
///
/// 8 history slots × (12 piece planes + 1 repetition plane), then castling
/// rights ×4, side to move, no-capture counter, all-ones, all-zeros.
pub const INPUT_PLANES: usize = 112;

/// History slots encoded, newest first.
pub const HISTORY_SLOTS: usize = 8;

/// One bitboard-shaped input plane: `mask` selects squares, `value` is the
/// fill written to them (1.0 for piece planes, a scalar for counter planes).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Plane {
    pub mask: u64,
    pub value: f32,
}

impl Plane {
    fn filled(value: f32) -> Self {
        Self {
            mask: u64::MAX,
            value,
        }
    }
}

/// Encode the last 8 positions of `history` into the 112-plane stack.
///
/// Piece planes are ordered side-to-move first; the board is not mirrored for
/// black, the side-to-move plane disambiguates. Missing history slots (near
/// the start of a game) encode as empty planes.
pub fn encode_history(history: &PositionHistory) -> Vec<Plane> {
    let mut planes = Vec::with_capacity(INPUT_PLANES);
    let positions = history.positions();
    let n = positions.len();
    let stm = history.last().board().side_to_move();

    for slot in 0..HISTORY_SLOTS {
        if slot < n {
            let pos = &positions[n - 1 - slot];
            let board = pos.board();
            for color in [stm, !stm] {
                for piece in Piece::ALL {
                    planes.push(Plane {
                        mask: board.colored_pieces(color, piece).0,
                        value: 1.0,
                    });
                }
            }
            planes.push(Plane {
                mask: if pos.repetitions() > 0 { u64::MAX } else { 0 },
                value: 1.0,
            });
        } else {
            for _ in 0..13 {
                planes.push(Plane::default());
            }
        }
    }

    let last = history.last();
    let board = last.board();
    for color in [stm, !stm] {
        let rights = board.castle_rights(color);
        planes.push(Plane {
            mask: if rights.short.is_some() { u64::MAX } else { 0 },
            value: 1.0,
        });
        planes.push(Plane {
            mask: if rights.long.is_some() { u64::MAX } else { 0 },
            value: 1.0,
        });
    }
    planes.push(Plane {
        mask: if stm == Color::Black { u64::MAX } else { 0 },
        value: 1.0,
    });
    planes.push(Plane::filled(last.no_capture_ply() as f32));
    planes.push(Plane::filled(1.0));
    planes.push(Plane {
        mask: 0,
        value: 0.0,
    });

    debug_assert_eq!(planes.len(), INPUT_PLANES);
    planes
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_chess::parse_uci_move;

    #[test]
    fn startpos_encodes_112_planes() {
        let h = PositionHistory::starting();
        let planes = encode_history(&h);
        assert_eq!(planes.len(), INPUT_PLANES);
        // 16 white pieces in the side-to-move half of slot 0.
        let stm_pieces: u32 = planes[..6].iter().map(|p| p.mask.count_ones()).sum();
        assert_eq!(stm_pieces, 16);
        // Only one slot of history exists; slot 1 is empty.
        assert!(planes[13..26].iter().all(|p| p.mask == 0));
        // All four castling rights present.
        assert!(planes[104..108].iter().all(|p| p.mask == u64::MAX));
        // White to move.
        assert_eq!(planes[108].mask, 0);
    }

    #[test]
    fn side_to_move_flips_the_stm_plane_and_piece_order() {
        let mut h = PositionHistory::starting();
        let mv = parse_uci_move(h.last().board(), "e2e4").unwrap();
        h.append(mv);
        let planes = encode_history(&h);
        assert_eq!(planes[108].mask, u64::MAX);
        // Side to move (black) comes first: 8 pawns on rank 7.
        assert_eq!(planes[0].mask.count_ones(), 8);
        assert_eq!(planes[0].mask & 0x00FF_0000_0000_0000, planes[0].mask);
    }

    #[test]
    fn identical_positions_encode_identically() {
        let a = encode_history(&PositionHistory::starting());
        let b = encode_history(&PositionHistory::starting());
        assert_eq!(a, b);
    }
}
