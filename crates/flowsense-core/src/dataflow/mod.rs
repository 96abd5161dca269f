//! Flow-sensitive dataflow analysis
//!
//! This module implements the statement-level transfer function and the
//! machinery around it:
//! - Control Flow Graph (CFG) construction from the AST
//! - Environments mapping storage locations to symbolic values, guarded by
//!   a boolean flow condition
//! - Statement-to-environment lookup for short-circuit operators
//! - Context-sensitive analysis of calls with bounded inlining
//! - Worklist-based fixpoint solver

mod analysis;
mod cfg;
mod context;
mod environment;
mod formula;
mod locator;
mod solver;
mod transfer;
mod value;

pub use analysis::{DataflowAnalyzer, FunctionAnalysis};
pub use cfg::{BasicBlock, BlockId, Cfg, CfgBuilder, Terminator};
pub use context::{ContextSensitiveOptions, InlineRefusal, TransferOptions};
pub use environment::Environment;
pub use formula::{Atom, Formula, Satisfiability, Solver};
pub use locator::{BlockStates, NoBlockStates, StmtToEnvMap};
pub use solver::{FixpointResult, FixpointSolver};
pub use transfer::transfer;
pub use value::{IntValue, StorageLocation, Symbol, Value};
