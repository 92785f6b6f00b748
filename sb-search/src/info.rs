//! Progress and result snapshots handed to the front-end.

/// One `info` snapshot. `comment` carries free-form per-move statistics when
/// verbose move stats are on; everything else is the usual UCI payload.
#[derive(Clone, Debug, Default)]
pub struct ThinkingInfo {
    pub depth: u16,
    pub seldepth: u16,
    pub time_ms: u64,
    pub nodes: u64,
    pub nps: u64,
    /// Cache fill in per-mille.
    pub hashfull: u32,
    pub score_cp: i32,
    pub pv: Vec<String>,
    pub comment: Option<String>,
}

/// The final answer of a search. `best` is `None` when the root has no legal
/// moves (the front-end prints the null move).
#[derive(Clone, Debug, Default)]
pub struct BestMoveInfo {
    pub best: Option<String>,
    pub ponder: Option<String>,
}

pub type InfoCallback = Box<dyn Fn(&ThinkingInfo) + Send + Sync>;
pub type BestMoveCallback = Box<dyn Fn(&BestMoveInfo) + Send + Sync>;

/// Q in [-1, 1] → centipawns, on the curve GUIs expect.
pub fn q_to_centipawns(q: f32) -> i32 {
    (290.680_623_072 * (1.548_090_806 * f64::from(q)).tan()) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centipawn_curve_is_odd_and_monotone() {
        assert_eq!(q_to_centipawns(0.0), 0);
        assert_eq!(q_to_centipawns(0.5), -q_to_centipawns(-0.5));
        assert!(q_to_centipawns(0.2) < q_to_centipawns(0.4));
        // Near-certain win is worth thousands of centipawns.
        assert!(q_to_centipawns(0.99) > 5000);
    }
}
