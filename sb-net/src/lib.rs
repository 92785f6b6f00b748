//! sb-net: the neural-evaluation side of Sable.
//!
//! Defines the narrow contract every backend implements (`Network` /
//! `NetworkComputation`), the plane encoder feeding it, a bounded LRU cache
//! of evaluations keyed by position fingerprint, and the cache-aware batching
//! wrapper the search drives. Heavy backends (BLAS, GPU) live behind the same
//! contract; the built-ins here are a deterministic `random` smoke backend, a
//! `uniform` one and a small `dense` MLP loaded from safetensors.

pub mod backend;
pub mod batching;
pub mod cache;
pub mod encoder;
pub mod factory;

mod dense;
mod random;

pub use backend::{NetError, Network, NetworkComputation};
pub use batching::CachingComputation;
pub use cache::{CachedEval, NnCache};
pub use encoder::{encode_history, Plane, INPUT_PLANES};
pub use factory::{backend_names, create_network, discover_weights, NetworkConfig, AUTODISCOVER};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
