//! # Flowsense Core
//!
//! Flow-sensitive dataflow analysis over a C-like AST.
//!
//! ## Modules
//!
//! - **[`ast`]** - Translation units, statements and declarations
//! - **[`dataflow`]** - Environments, the transfer function and the fixpoint solver
//! - **[`config`]** - Analysis configuration loaded from TOML
//! - **[`error`]** - Errors returned by the outer analysis API
//!
//! ## Quick Start
//!
//! ```rust
//! use flowsense_core::prelude::*;
//! use std::rc::Rc;
//!
//! let mut tu = TranslationUnit::new();
//! let inc = tu.declare_function("inc", vec![("x", Type::Int)], Type::Int);
//! let x = tu.read(tu.param(inc, 0));
//! let one = tu.int_lit(1);
//! let sum = tu.binary(BinOp::Add, x, one);
//! let ret = tu.return_stmt(Some(sum));
//! let body = tu.compound(vec![ret]);
//! tu.define_function(inc, body);
//! let tu = Rc::new(tu);
//!
//! let analyzer = DataflowAnalyzer::new(AnalysisConfig::default());
//! let mut entry = analyzer.entry_environment(&tu, inc);
//! entry.bind_decl_value(tu.param(inc, 0), Value::known_int(3));
//! let analysis = analyzer.analyze_from(inc, entry).unwrap();
//! assert_eq!(analysis.return_value(), Some(&Value::known_int(4)));
//! ```

pub mod ast;
pub mod config;
pub mod dataflow;
pub mod error;

pub use config::{AnalysisConfig, AnalysisLimits};
pub use error::{AnalysisError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::ast::{BinOp, CastKind, FuncId, NodeId, StmtKind, TranslationUnit, Type, UnaryOp, VarId};
    pub use crate::config::{AnalysisConfig, AnalysisLimits};
    pub use crate::dataflow::{
        transfer, BlockStates, DataflowAnalyzer, Environment, Formula, FunctionAnalysis, NoBlockStates,
        StmtToEnvMap, TransferOptions, Value,
    };
    pub use crate::error::AnalysisError;
}
