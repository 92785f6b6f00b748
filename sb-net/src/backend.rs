//! The evaluator contract.

use std::path::PathBuf;

use thiserror::Error;

use crate::encoder::Plane;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("unknown backend `{0}`")]
    UnknownBackend(String),

    #[error("weights file not found: {0}")]
    WeightsNotFound(PathBuf),

    #[error("failed to load weights: {0}")]
    WeightsLoad(String),

    #[error("inference failed: {0}")]
    Compute(String),
}

/// A single-use batched evaluation.
///
/// Inputs are appended one by one, `compute` blocks until the whole batch is
/// evaluated, and the accessors read results by input index. The search
/// serializes calls on one computation; a network may serve any number of
/// concurrent computations.
pub trait NetworkComputation: Send {
    /// Append one encoded position to the batch.
    fn add_input(&mut self, planes: Vec<Plane>);

    /// Number of inputs appended so far.
    fn batch_size(&self) -> usize;

    /// Evaluate the whole batch. Blocking.
    fn compute(&mut self) -> Result<(), NetError>;

    /// Value head for input `idx`, in [-1, 1], from the point of view of the
    /// side to move in that input.
    fn value(&self, idx: usize) -> f32;

    /// Policy head for input `idx` at one move index. Backends may return
    /// either probabilities or positive unnormalized mass; the consumer
    /// applies its own softmax temperature and renormalizes.
    fn policy(&self, idx: usize, nn_index: u16) -> f32;
}

/// A loaded evaluator; a factory for computations.
pub trait Network: Send + Sync {
    fn new_computation(&self) -> Box<dyn NetworkComputation>;
}
