//! High-level API for flow-sensitive analysis of whole functions

use super::cfg::Cfg;
use super::context::TransferOptions;
use super::environment::Environment;
use super::solver::{FixpointResult, FixpointSolver};
use super::value::Value;
use crate::ast::{FuncId, NodeId, TranslationUnit, VarId};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use anyhow::Context;
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

/// Result of analyzing one function
#[derive(Debug)]
pub struct FunctionAnalysis {
    pub function: FuncId,
    pub name: String,
    pub cfg: Rc<Cfg>,
    result: FixpointResult,
    options: TransferOptions,
}

impl FunctionAnalysis {
    /// State on return, joined over every reachable `return`
    pub fn exit_environment(&self) -> Option<&Environment> {
        self.result.exit_state()
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.exit_environment().and_then(Environment::return_value)
    }

    /// Value of `var` on return
    pub fn value_of(&self, var: VarId) -> Option<&Value> {
        self.exit_environment().and_then(|env| env.decl_value(var))
    }

    /// Environment right after `stmt` executed
    pub fn environment_after(&self, stmt: NodeId) -> Option<Environment> {
        self.result.environment_after(&self.cfg, stmt, &self.options)
    }

    pub fn converged(&self) -> bool {
        self.result.converged
    }

    pub fn iterations(&self) -> usize {
        self.result.iterations
    }

    pub fn result(&self) -> &FixpointResult {
        &self.result
    }
}

/// Runs the fixpoint solver over functions of a translation unit
#[derive(Debug, Clone, Default)]
pub struct DataflowAnalyzer {
    config: AnalysisConfig,
}

impl DataflowAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Fresh analysis state for `func` with every parameter unknown
    pub fn entry_environment(&self, tu: &Rc<TranslationUnit>, func: FuncId) -> Environment {
        let mut env = Environment::with_limits(Rc::clone(tu), self.config.limits());
        let params = tu
            .get_function(func)
            .map(|decl| decl.params.clone())
            .unwrap_or_default();
        for param in params {
            let loc = env.stable_location_for_decl(param);
            env.set_decl_location(param, loc);
            env.initialize_location(loc);
        }
        env
    }

    pub fn analyze_function(&self, tu: &Rc<TranslationUnit>, func: FuncId) -> Result<FunctionAnalysis> {
        let entry = self.entry_environment(tu, func);
        self.analyze_from(func, entry)
    }

    pub fn analyze_by_name(&self, tu: &Rc<TranslationUnit>, name: &str) -> Result<FunctionAnalysis> {
        let func = tu
            .function_by_name(name)
            .ok_or_else(|| AnalysisError::UnknownFunction(name.to_string()))?;
        self.analyze_function(tu, func)
    }

    /// Analyze `func` starting from a caller-supplied entry state, e.g. one
    /// with some parameters pinned to known values.
    pub fn analyze_from(&self, func: FuncId, entry: Environment) -> Result<FunctionAnalysis> {
        let decl = entry
            .translation_unit()
            .get_function(func)
            .ok_or_else(|| AnalysisError::UnknownFunction(func.to_string()))?;
        let name = decl.name.clone();
        let cfg = entry
            .cfg_for(func)
            .ok_or_else(|| AnalysisError::MissingBody(name.clone()))?;

        let options = self.config.transfer_options().rooted_at(func);
        let result = FixpointSolver::solve(&cfg, entry, &options);
        debug!(
            function = %name,
            blocks = cfg.blocks.len(),
            iterations = result.iterations,
            converged = result.converged,
            "analysis finished"
        );

        Ok(FunctionAnalysis {
            function: func,
            name,
            cfg,
            result,
            options,
        })
    }

    /// Analyze every function with a body, keyed by name in declaration order
    pub fn analyze_translation_unit(&self, tu: &Rc<TranslationUnit>) -> anyhow::Result<IndexMap<String, FunctionAnalysis>> {
        let mut analyses = IndexMap::new();
        for (func, decl) in tu.functions() {
            if decl.body.is_none() {
                continue;
            }
            let analysis = self
                .analyze_function(tu, func)
                .with_context(|| format!("failed to analyze `{}`", decl.name))?;
            analyses.insert(decl.name.clone(), analysis);
        }
        Ok(analyses)
    }
}
