//! sb-search: parallel PUCT Monte-Carlo tree search.
//!
//! Worker threads share one tree; every iteration gathers a minibatch of
//! leaves under virtual loss, evaluates them through the cache-aware batched
//! computation, and backs values up to the root. Stop conditions cover time,
//! visit and playout limits plus smart pruning.

pub mod info;
pub mod limits;
pub mod node;
pub mod params;
pub mod search;
pub mod tree;

pub use info::{BestMoveInfo, ThinkingInfo};
pub use limits::SearchLimits;
pub use node::{Node, NodeId, Terminal};
pub use params::SearchParams;
pub use search::{RootChildStat, Search, SearchError, SearchStats};
pub use tree::Tree;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
