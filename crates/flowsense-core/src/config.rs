//! Analysis configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! context_sensitive = true
//! max_inline_depth = 3
//! max_block_visits = 64
//! max_solver_atoms = 12
//! ```

use crate::dataflow::TransferOptions;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analyze calls to functions with visible bodies by inlining them
    pub context_sensitive: bool,
    /// Maximum number of nested inlined calls
    pub max_inline_depth: usize,
    /// Visits per basic block before the fixpoint driver gives up
    pub max_block_visits: usize,
    /// Atoms the formula solver will enumerate before answering "unknown"
    pub max_solver_atoms: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            context_sensitive: false,
            max_inline_depth: 2,
            max_block_visits: 64,
            max_solver_atoms: 12,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Enable context-sensitive analysis with the given inlining depth
    pub fn with_context_sensitivity(mut self, max_inline_depth: usize) -> Self {
        self.context_sensitive = true;
        self.max_inline_depth = max_inline_depth;
        self
    }

    pub fn transfer_options(&self) -> TransferOptions {
        if self.context_sensitive {
            TransferOptions::context_sensitive(self.max_inline_depth)
        } else {
            TransferOptions::context_insensitive()
        }
    }

    pub fn limits(&self) -> AnalysisLimits {
        AnalysisLimits {
            max_block_visits: self.max_block_visits,
            max_solver_atoms: self.max_solver_atoms,
        }
    }
}

/// Resource bounds shared by every environment of one analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisLimits {
    pub max_block_visits: usize,
    pub max_solver_atoms: usize,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        AnalysisConfig::default().limits()
    }
}
