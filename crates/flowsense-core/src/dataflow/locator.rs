//! Statement-to-environment lookup
//!
//! The transfer function for `&&` and `||` needs the state that held right
//! after each operand was evaluated, which in general lives in a different
//! basic block than the operator itself.

use super::cfg::{BlockId, Cfg};
use super::environment::Environment;
use crate::ast::NodeId;
use std::collections::HashMap;

/// Maps a statement to the environment at the end of the basic block that
/// contains it, if that block has been analyzed.
pub trait StmtToEnvMap {
    fn environment(&self, stmt: NodeId) -> Option<&Environment>;
}

/// Locator over the per-block output states of a (possibly in-progress)
/// fixpoint computation.
pub struct BlockStates<'a> {
    cfg: &'a Cfg,
    out_states: &'a HashMap<BlockId, Environment>,
}

impl<'a> BlockStates<'a> {
    pub fn new(cfg: &'a Cfg, out_states: &'a HashMap<BlockId, Environment>) -> Self {
        Self { cfg, out_states }
    }
}

impl StmtToEnvMap for BlockStates<'_> {
    fn environment(&self, stmt: NodeId) -> Option<&Environment> {
        let block = self.cfg.block_of(stmt)?;
        self.out_states.get(&block)
    }
}

/// Explicit statement-to-environment table, mostly useful in tests
impl StmtToEnvMap for HashMap<NodeId, Environment> {
    fn environment(&self, stmt: NodeId) -> Option<&Environment> {
        self.get(&stmt)
    }
}

/// Locator that knows no block states; operands resolve from the current
/// environment only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBlockStates;

impl StmtToEnvMap for NoBlockStates {
    fn environment(&self, _stmt: NodeId) -> Option<&Environment> {
        None
    }
}
