//! Tunable search parameters.

use crate::search::SearchError;

/// Everything the search reads from the option surface, in one bundle.
#[derive(Clone, Debug)]
pub struct SearchParams {
    /// Leaves gathered per NN batch.
    pub minibatch_size: usize,
    /// NN slots the speculative prefetch may fill, per call.
    pub max_prefetch: usize,
    /// Collisions tolerated per gather before the batch is cut short.
    pub allowed_collisions: usize,
    pub cpuct: f32,
    pub fpu_reduction: f32,
    /// Exponent 1/T applied to raw priors before renormalizing.
    pub policy_softmax_temp: f32,
    /// Best-move sampling temperature; 0 = always most visited.
    pub temperature: f32,
    /// Half-move horizon over which `temperature` decays linearly to 0.
    pub tempdecay_moves: u32,
    /// Mix Dirichlet noise into root priors.
    pub noise: bool,
    pub smart_pruning: bool,
    pub verbose_move_stats: bool,
    /// Perturbs the Q of unvisited children; 0 disables.
    pub virtual_loss_bug: f32,
    /// Step scale of the running-mean backup.
    pub backprop_gain: f32,
    /// Exponent warping the 1/n backup schedule.
    pub backprop_gamma: f32,
    /// Positions (beyond the current one) folded into the cache fingerprint.
    pub cache_history_length: usize,
    /// Seed for noise and temperature draws.
    pub seed: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            minibatch_size: 256,
            max_prefetch: 32,
            allowed_collisions: 32,
            cpuct: 3.4,
            fpu_reduction: 0.9,
            policy_softmax_temp: 2.2,
            temperature: 0.0,
            tempdecay_moves: 0,
            noise: false,
            smart_pruning: true,
            verbose_move_stats: false,
            virtual_loss_bug: 0.0,
            backprop_gain: 1.0,
            backprop_gamma: 1.0,
            cache_history_length: 7,
            seed: 0,
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.minibatch_size == 0 {
            return Err(SearchError::InvalidParams("minibatch_size must be > 0"));
        }
        if !(self.cpuct.is_finite() && self.cpuct >= 0.0) {
            return Err(SearchError::InvalidParams(
                "cpuct must be finite and >= 0",
            ));
        }
        if !(self.policy_softmax_temp.is_finite() && self.policy_softmax_temp > 0.0) {
            return Err(SearchError::InvalidParams(
                "policy_softmax_temp must be finite and > 0",
            ));
        }
        if !(self.temperature.is_finite() && self.temperature >= 0.0) {
            return Err(SearchError::InvalidParams(
                "temperature must be finite and >= 0",
            ));
        }
        Ok(())
    }
}
