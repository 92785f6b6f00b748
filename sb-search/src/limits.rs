//! Caps for one search.

use cozy_chess::Move;

/// All optional: an empty bundle means "search until told to stop".
#[derive(Clone, Debug, Default)]
pub struct SearchLimits {
    /// Cap on total visits (playouts plus visits the root already had).
    pub visits: Option<u64>,
    /// Cap on playouts made by this search alone.
    pub playouts: Option<u64>,
    /// Wall-clock budget.
    pub time_ms: Option<u64>,
    /// Only an external stop ends the search.
    pub infinite: bool,
    /// When non-empty, only these root moves are considered.
    pub searchmoves: Vec<Move>,
}
