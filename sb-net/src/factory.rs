//! Backend registry: name → constructor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{NetError, Network};
use crate::dense::DenseNetwork;
use crate::random::{RandomNetwork, UniformNetwork};

/// Sentinel weights path: pick the first weights file found next to us.
pub const AUTODISCOVER: &str = "<autodiscover>";

/// What to build: a backend name, an optional weights file and a free-form
/// option string whose meaning is backend specific.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub backend: String,
    pub weights: Option<PathBuf>,
    pub options: String,
}

/// Names of every available backend, first entry is the default.
pub fn backend_names() -> &'static [&'static str] {
    &["random", "uniform", "dense"]
}

/// Build a network from its configuration.
pub fn create_network(cfg: &NetworkConfig) -> Result<Arc<dyn Network>, NetError> {
    match cfg.backend.as_str() {
        "random" => {
            let seed = cfg.options.trim().parse::<u64>().unwrap_or(0);
            Ok(Arc::new(RandomNetwork::new(seed)))
        }
        "uniform" => Ok(Arc::new(UniformNetwork)),
        "dense" => {
            let path = cfg.weights.as_deref().ok_or_else(|| {
                NetError::WeightsLoad("dense backend requires a weights file".to_string())
            })?;
            Ok(Arc::new(DenseNetwork::load(path)?))
        }
        other => Err(NetError::UnknownBackend(other.to_string())),
    }
}

/// Find a weights file in `dir`: the lexicographically first `*.safetensors`.
pub fn discover_weights(dir: &Path) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file() && p.extension().map(|e| e == "safetensors").unwrap_or(false)
        })
        .collect();
    found.sort();
    found.into_iter().next()
}
