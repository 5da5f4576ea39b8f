//! Tracing configuration for the `cinder` binary.
//!
//! Supports three output formats controlled by `CINDER_LOG_FORMAT`:
//!
//! - `text` (default): Standard `tracing-subscriber` flat output
//! - `tree`: Hierarchical indented output via `tracing-tree`, one level per
//!   lowered method
//! - `json`: One JSON object per span/event
//!
//! ## Quick start
//!
//! ```bash
//! # Follow a single lowering as a tree
//! CINDER_LOG=debug CINDER_LOG_FORMAT=tree cinder lower demos/cleanup.json
//!
//! # State allocation and proxy labels only
//! CINDER_LOG="cinder_lowering::dispatcher=trace,cinder_lowering::finally_frame=trace" cinder lower m.json
//!
//! # JSON for tooling
//! CINDER_LOG=debug CINDER_LOG_FORMAT=json cinder run m.json
//! ```
//!
//! The subscriber is only installed when `CINDER_LOG` (or `RUST_LOG`) is
//! set, so there is no overhead otherwise. `CINDER_LOG` wins when both are.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};
use tracing_tree::HierarchicalLayer;

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Standard flat text lines (default).
    Text,
    /// Hierarchical indented tree via `tracing-tree`.
    Tree,
    /// Newline-delimited JSON objects.
    Json,
}

impl LogFormat {
    /// Parse a `CINDER_LOG_FORMAT` value. Unknown values mean `Text`.
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "tree" => Self::Tree,
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Logging settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// `EnvFilter` directives, e.g. `cinder_lowering=trace`.
    pub directives: String,
    pub format: LogFormat,
}

impl TracingConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Settings from an arbitrary variable lookup. `None` means logging is off.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let directives = lookup("CINDER_LOG").or_else(|| lookup("RUST_LOG"))?;
        let format = lookup("CINDER_LOG_FORMAT").map_or(LogFormat::Text, |v| LogFormat::parse(&v));
        Some(Self { directives, format })
    }

    pub fn filter(&self) -> EnvFilter {
        EnvFilter::builder().parse_lossy(&self.directives)
    }

    /// Install the global subscriber. Output goes to stderr so it never
    /// mixes with the lowered code on stdout. A second call is a no-op.
    pub fn install(&self) {
        let tree = (self.format == LogFormat::Tree).then(|| {
            HierarchicalLayer::new(2)
                .with_writer(std::io::stderr)
                .with_indent_lines(true)
                .with_deferred_spans(true)
                .with_bracketed_fields(true)
        });
        let json = (self.format == LogFormat::Json)
            .then(|| fmt::layer().json().with_writer(std::io::stderr));
        let text = (self.format == LogFormat::Text).then(|| fmt::layer().with_writer(std::io::stderr));

        let _ = Registry::default()
            .with(self.filter())
            .with(tree)
            .with(json)
            .with(text)
            .try_init();
    }
}

/// Install the subscriber when `CINDER_LOG` or `RUST_LOG` is set.
pub fn init_tracing() {
    if let Some(config) = TracingConfig::from_env() {
        config.install();
    }
}
