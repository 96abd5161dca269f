//! Worklist-based fixpoint solver over environments

use super::cfg::{BlockId, Cfg};
use super::context::TransferOptions;
use super::environment::Environment;
use super::formula::Satisfiability;
use super::locator::BlockStates;
use super::transfer::transfer;
use super::value::Value;
use crate::ast::NodeId;
use std::collections::{BTreeSet, HashMap};
use tracing::{trace, warn};

/// Result of fixpoint computation
#[derive(Debug)]
pub struct FixpointResult {
    /// Environments at entry of each reached block
    pub in_states: HashMap<BlockId, Environment>,
    /// Environments at exit of each reached block
    pub out_states: HashMap<BlockId, Environment>,
    /// Number of block transfers performed
    pub iterations: usize,
    /// `false` when some block hit the visit limit before stabilizing
    pub converged: bool,
    exit: BlockId,
}

impl FixpointResult {
    /// State on return from the function, `None` if no return is reachable
    pub fn exit_state(&self) -> Option<&Environment> {
        self.out_states.get(&self.exit)
    }

    pub fn block_state(&self, block: BlockId) -> Option<&Environment> {
        self.out_states.get(&block)
    }

    /// Locator over the final block states
    pub fn locator<'a>(&'a self, cfg: &'a Cfg) -> BlockStates<'a> {
        BlockStates::new(cfg, &self.out_states)
    }

    /// Environment right after `stmt` executed, obtained by replaying its
    /// block up to and including `stmt`.
    pub fn environment_after(&self, cfg: &Cfg, stmt: NodeId, options: &TransferOptions) -> Option<Environment> {
        let block_id = cfg.block_of(stmt)?;
        let block = cfg.block(block_id)?;
        let mut env = self.in_states.get(&block_id)?.fork();
        let locator = self.locator(cfg);
        for &element in &block.elements {
            transfer(&locator, element, &mut env, options);
            if element == stmt {
                break;
            }
        }
        Some(env)
    }
}

/// Worklist-based fixpoint solver
pub struct FixpointSolver;

impl FixpointSolver {
    /// Run the forward analysis of `cfg` from `entry` until block outputs stop
    /// changing (up to equivalence) or the visit limit is hit.
    pub fn solve(cfg: &Cfg, entry: Environment, options: &TransferOptions) -> FixpointResult {
        let limits = entry.limits();
        let rank: HashMap<BlockId, usize> = cfg
            .reverse_postorder()
            .into_iter()
            .enumerate()
            .map(|(index, block)| (block, index))
            .collect();
        let rank_of = |block: BlockId| rank.get(&block).copied().unwrap_or(usize::MAX);

        let mut in_states: HashMap<BlockId, Environment> = HashMap::new();
        let mut out_states: HashMap<BlockId, Environment> = HashMap::new();
        let mut visits: HashMap<BlockId, usize> = HashMap::new();

        // Ordered by reverse postorder so loop bodies settle before their exits
        let mut worklist: BTreeSet<(usize, BlockId)> = BTreeSet::new();
        worklist.insert((rank_of(cfg.entry), cfg.entry));

        let mut iterations = 0;
        let mut converged = true;

        while let Some((_, block_id)) = worklist.pop_first() {
            let Some(block) = cfg.block(block_id) else {
                continue;
            };

            // Compute input by joining predecessor outputs along feasible edges
            let mut input = (block_id == cfg.entry).then(|| entry.clone());
            for &pred in &block.predecessors {
                let Some(edge_state) = out_states
                    .get(&pred)
                    .and_then(|pred_out| Self::edge_state(cfg, pred, block_id, pred_out))
                else {
                    continue;
                };
                input = Some(match input {
                    Some(acc) => acc.join(&edge_state),
                    None => edge_state,
                });
            }
            let Some(input) = input else {
                continue;
            };

            let count = visits.entry(block_id).or_insert(0);
            *count += 1;
            if *count > limits.max_block_visits {
                if converged {
                    warn!(
                        function = %cfg.function,
                        block = block_id.0,
                        limit = limits.max_block_visits,
                        "block visit limit reached before fixpoint"
                    );
                }
                converged = false;
                continue;
            }
            iterations += 1;
            trace!(block = block_id.0, visit = *count, "transferring block");

            let mut env = input.clone();
            {
                let locator = BlockStates::new(cfg, &out_states);
                for &element in &block.elements {
                    transfer(&locator, element, &mut env, options);
                }
            }

            let changed = out_states
                .get(&block_id)
                .map_or(true, |old| !old.equivalent_to(&env));
            in_states.insert(block_id, input);
            out_states.insert(block_id, env);

            if changed {
                for &succ in &block.successors {
                    worklist.insert((rank_of(succ), succ));
                }
            }
        }

        FixpointResult {
            in_states,
            out_states,
            iterations,
            converged,
            exit: cfg.exit,
        }
    }

    /// State flowing along `from -> to`, with the branch condition assumed.
    /// `None` when the assumption contradicts the flow condition.
    fn edge_state(cfg: &Cfg, from: BlockId, to: BlockId, out: &Environment) -> Option<Environment> {
        let Some((condition, taken)) = cfg.edge_guard(from, to) else {
            return Some(out.clone());
        };
        let Some(Value::Bool(formula)) = out.expr_value(condition) else {
            return Some(out.clone());
        };
        let assumed = if taken { formula } else { formula.not() };

        let mut env = out.clone();
        env.add_to_flow_condition(&assumed);
        if env.satisfiability() == Satisfiability::Unsatisfiable {
            trace!(from = from.0, to = to.0, "infeasible edge pruned");
            return None;
        }
        Some(env)
    }
}
