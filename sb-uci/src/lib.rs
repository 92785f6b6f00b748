//! sb-uci: the engine shell.
//!
//! Typed option registry, time budgeting, the controller that glues position
//! setup to the search, and the line-oriented UCI protocol surface.

pub mod engine;
pub mod options;
pub mod time;
pub mod uci;

pub use engine::{Engine, EngineError};
pub use options::{OptionKind, Options, OptionsError};
pub use time::{populate_search_limits, TimeConfig};
pub use uci::{format_bestmove, format_info, parse_command, GoParams, UciCommand, UciError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
