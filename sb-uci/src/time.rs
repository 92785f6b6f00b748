//! Time budgeting: how long to think about this move.
//!
//! The per-move share of the remaining clock follows a sech²-shaped weight
//! curve over game plies, peaking in the early middlegame and flatter to the
//! right of the peak than to the left.

use sb_search::SearchLimits;

use crate::uci::GoParams;

/// Extensions below this are not worth spending: smart pruning would hand the
/// time back anyway.
const SMART_PRUNING_TOLERANCE_MS: f32 = 200.0;

/// 2 / ln(2 + √3): places the curve's inflection points at peak ± width.
const WIDTH_SCALER: f32 = 1.518_651_5;

#[derive(Clone, Debug)]
pub struct TimeConfig {
    pub slowmover: f32,
    pub move_overhead_ms: i64,
    pub peak: f32,
    pub left_width: f32,
    pub right_width: f32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            slowmover: 1.93,
            move_overhead_ms: 100,
            peak: 26.0,
            left_width: 67.0,
            right_width: 76.0,
        }
    }
}

fn move_weight(ply: f32, peak: f32, left_width: f32, right_width: f32) -> f32 {
    let width = if ply > peak { right_width } else { left_width };
    ((ply - peak) / width / WIDTH_SCALER).cosh().powi(-2)
}

/// Turn a `go` command into search limits for the side to move at `ply`.
pub fn populate_search_limits(
    params: &GoParams,
    ply: u32,
    black_to_move: bool,
    tc: &TimeConfig,
) -> SearchLimits {
    let mut limits = SearchLimits {
        visits: params.nodes,
        time_ms: params.movetime.and_then(|t| u64::try_from(t).ok()),
        infinite: params.infinite,
        ..SearchLimits::default()
    };
    if params.infinite {
        // An infinite search never stops on its own clock.
        limits.time_ms = None;
        return limits;
    }

    let time = if black_to_move {
        params.btime
    } else {
        params.wtime
    };
    let Some(time) = time.filter(|t| *t >= 0) else {
        return limits;
    };

    let increment = if black_to_move {
        params.binc
    } else {
        params.winc
    }
    .unwrap_or(0)
    .max(0);

    let mut movestogo = params.movestogo.unwrap_or(-1);
    if movestogo < 0 {
        movestogo = 50;
    }
    // A `movestogo 0` is nonstandard but seen in the wild; it means "this is
    // the last move before the control".
    if movestogo == 0 {
        movestogo = 1;
    }

    // Budget until the time control, increments included, overhead deducted.
    let total_moves_time =
        (time + increment * (movestogo - 1) - tc.move_overhead_ms * movestogo).max(0);

    let this_move_weight = move_weight(ply as f32, tc.peak, tc.left_width, tc.right_width);
    let mut other_move_weights = 0.0f32;
    for i in 1..movestogo {
        other_move_weights += move_weight(
            (ply + 2 * i as u32) as f32,
            tc.peak,
            tc.left_width,
            tc.right_width,
        );
    }
    let mut this_move_time =
        total_moves_time as f32 * this_move_weight / (this_move_weight + other_move_weights);

    // Extend with slowmover only where smart pruning could claw time back.
    if tc.slowmover < 1.0 || this_move_time * tc.slowmover > SMART_PRUNING_TOLERANCE_MS {
        this_move_time *= tc.slowmover;
    }

    let capped = (this_move_time as i64).min(time - tc.move_overhead_ms).max(0);
    limits.time_ms = Some(capped as u64);
    limits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn go() -> GoParams {
        GoParams::default()
    }

    #[test]
    fn infinite_passes_only_visits_through() {
        let params = GoParams {
            infinite: true,
            nodes: Some(1000),
            wtime: Some(60_000),
            ..go()
        };
        let limits = populate_search_limits(&params, 0, false, &TimeConfig::default());
        assert!(limits.infinite);
        assert_eq!(limits.visits, Some(1000));
        assert_eq!(limits.time_ms, None);
    }

    #[test]
    fn no_clock_means_no_time_limit() {
        let limits = populate_search_limits(&go(), 0, false, &TimeConfig::default());
        assert_eq!(limits.time_ms, None);
        let params = GoParams {
            wtime: Some(-1),
            ..go()
        };
        let limits = populate_search_limits(&params, 0, false, &TimeConfig::default());
        assert_eq!(limits.time_ms, None);
    }

    #[test]
    fn movetime_is_passed_verbatim_when_untimed() {
        let params = GoParams {
            movetime: Some(1500),
            ..go()
        };
        let limits = populate_search_limits(&params, 0, false, &TimeConfig::default());
        assert_eq!(limits.time_ms, Some(1500));
    }

    #[test]
    fn opening_budget_is_a_moderate_slice_of_the_clock() {
        // Ply 0 sits left of the curve peak; the slice of a 60 s clock at 30
        // moves to go lands around two seconds before slowmover.
        let params = GoParams {
            wtime: Some(60_000),
            btime: Some(60_000),
            winc: Some(0),
            binc: Some(0),
            movestogo: Some(30),
            ..go()
        };
        let tc = TimeConfig {
            slowmover: 1.0,
            ..TimeConfig::default()
        };
        let limits = populate_search_limits(&params, 0, false, &tc);
        let time = limits.time_ms.unwrap();
        assert!(
            (1500..=2500).contains(&time),
            "opening budget was {time} ms"
        );
    }

    #[test]
    fn black_uses_its_own_clock() {
        let params = GoParams {
            wtime: Some(60_000),
            btime: Some(10_000),
            movestogo: Some(10),
            ..go()
        };
        let tc = TimeConfig {
            slowmover: 1.0,
            ..TimeConfig::default()
        };
        let white = populate_search_limits(&params, 0, false, &tc);
        let black = populate_search_limits(&params, 1, true, &tc);
        assert!(white.time_ms.unwrap() > black.time_ms.unwrap());
    }

    #[test]
    fn movestogo_zero_is_treated_as_one() {
        let params = GoParams {
            wtime: Some(10_000),
            movestogo: Some(0),
            ..go()
        };
        let limits = populate_search_limits(&params, 0, false, &TimeConfig::default());
        // One move gets the whole budget, clamped to clock minus overhead.
        assert_eq!(limits.time_ms, Some(9_900));
    }

    #[test]
    fn small_slowmover_always_applies() {
        let params = GoParams {
            wtime: Some(60_000),
            movestogo: Some(30),
            ..go()
        };
        let base = populate_search_limits(
            &params,
            0,
            false,
            &TimeConfig {
                slowmover: 1.0,
                ..TimeConfig::default()
            },
        )
        .time_ms
        .unwrap();
        let halved = populate_search_limits(
            &params,
            0,
            false,
            &TimeConfig {
                slowmover: 0.5,
                ..TimeConfig::default()
            },
        )
        .time_ms
        .unwrap();
        assert!(halved < base);
        assert!((halved as f32 - base as f32 * 0.5).abs() <= 1.0);
    }

    #[test]
    fn large_slowmover_skips_tiny_extensions() {
        // Budget so small that the extension would stay under the pruning
        // tolerance: slowmover >= 1 must not apply.
        let params = GoParams {
            wtime: Some(3_100),
            movestogo: Some(30),
            ..go()
        };
        let limits = populate_search_limits(&params, 0, false, &TimeConfig::default());
        let time = limits.time_ms.unwrap();
        assert!(time <= 5, "expected a tiny unscaled budget, got {time} ms");
    }

    #[test]
    fn budget_never_exceeds_clock_minus_overhead() {
        let params = GoParams {
            wtime: Some(500),
            movestogo: Some(1),
            ..go()
        };
        let limits = populate_search_limits(&params, 0, false, &TimeConfig::default());
        assert!(limits.time_ms.unwrap() <= 400);
    }
}
