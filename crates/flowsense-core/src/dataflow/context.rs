//! Context-sensitive call analysis
//!
//! A call to a function whose body is visible may be analyzed by running the
//! whole fixpoint on the callee, seeded with the caller's argument values.
//! Whether that happens is decided by [`TransferOptions`]: absent
//! context-sensitivity options mean every call is opaque. The options also
//! carry the active call stack, so recursion is refused without any state
//! outside the options value itself.

use super::environment::Environment;
use super::solver::FixpointSolver;
use super::value::Value;
use crate::ast::{FuncId, NodeId, Type};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, trace};

/// Per-invocation configuration of the transfer function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// `None` treats every call opaquely
    pub context_sensitive: Option<ContextSensitiveOptions>,
}

impl TransferOptions {
    pub fn context_insensitive() -> Self {
        Self::default()
    }

    pub fn context_sensitive(max_depth: usize) -> Self {
        Self {
            context_sensitive: Some(ContextSensitiveOptions::new(max_depth)),
        }
    }

    pub fn is_context_sensitive(&self) -> bool {
        self.context_sensitive.is_some()
    }

    /// Mark `func` as the function under analysis, so calls back into it are
    /// recognized as recursion.
    pub fn rooted_at(mut self, func: FuncId) -> Self {
        if let Some(options) = self.context_sensitive.as_mut() {
            if !options.call_stack.contains(&func) {
                options.call_stack.push(func);
            }
        }
        self
    }

    /// Options for analyzing the body of `callee`, or why it must stay opaque
    pub fn enter_call(&self, callee: FuncId) -> Result<TransferOptions, InlineRefusal> {
        let options = self.context_sensitive.as_ref().ok_or(InlineRefusal::Disabled)?;
        Ok(TransferOptions {
            context_sensitive: Some(options.enter(callee)?),
        })
    }
}

/// Bounds and call stack for inlining
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSensitiveOptions {
    max_depth: usize,
    depth: usize,
    call_stack: SmallVec<[FuncId; 4]>,
}

impl ContextSensitiveOptions {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            depth: 0,
            call_stack: SmallVec::new(),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of inlined calls currently being analyzed
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn call_stack(&self) -> &[FuncId] {
        &self.call_stack
    }

    pub fn enter(&self, callee: FuncId) -> Result<Self, InlineRefusal> {
        if self.call_stack.contains(&callee) {
            return Err(InlineRefusal::Recursive(callee));
        }
        if self.depth >= self.max_depth {
            return Err(InlineRefusal::DepthLimit {
                max_depth: self.max_depth,
            });
        }
        let mut nested = self.clone();
        nested.call_stack.push(callee);
        nested.depth += 1;
        Ok(nested)
    }
}

/// Why a call is analyzed opaquely instead of inlined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InlineRefusal {
    #[error("context-sensitive analysis is disabled")]
    Disabled,

    #[error("{0} is already on the call stack")]
    Recursive(FuncId),

    #[error("inlining depth limit of {max_depth} reached")]
    DepthLimit { max_depth: usize },
}

/// Transfer a call expression whose arguments have already been evaluated
pub(crate) fn transfer_call(
    env: &mut Environment,
    call: NodeId,
    callee: FuncId,
    args: &[NodeId],
    options: &TransferOptions,
) {
    let tu = env.translation_unit_handle();
    let Some(decl) = tu.get_function(callee) else {
        model_opaque_call(env, call, args);
        return;
    };
    if decl.body.is_none() {
        trace!(callee = %decl.name, "no body visible, call is opaque");
        model_opaque_call(env, call, args);
        return;
    }

    let nested = match options.enter_call(callee) {
        Ok(nested) => nested,
        Err(refusal) => {
            debug!(callee = %decl.name, %refusal, "call not inlined");
            model_opaque_call(env, call, args);
            return;
        }
    };
    let Some(cfg) = env.cfg_for(callee) else {
        model_opaque_call(env, call, args);
        return;
    };

    let depth = nested.context_sensitive.as_ref().map_or(0, |cs| cs.depth());
    debug!(callee = %decl.name, depth, "inlining call");
    let frame = env.push_call(callee, args);
    let result = FixpointSolver::solve(&cfg, frame, &nested);

    match result.exit_state() {
        Some(exit) => {
            trace!(callee = %decl.name, iterations = result.iterations, converged = result.converged, "callee analyzed");
            env.pop_call(call, exit);
            if decl.return_type.is_record() {
                bind_record_result(env, call);
            }
        }
        None => {
            debug!(callee = %decl.name, "callee exit unreachable, call is opaque");
            model_opaque_call(env, call, args);
        }
    }
}

/// A call whose body is not analyzed: unknown result, and anything a
/// pointer argument refers to may have been overwritten.
fn model_opaque_call(env: &mut Environment, call: NodeId, args: &[NodeId]) {
    for &arg in args {
        if let Some(Value::Pointer(pointee)) = env.expr_value(arg) {
            env.initialize_location(pointee);
        }
    }

    let ty = env
        .translation_unit()
        .get(call)
        .map(|node| node.ty.clone())
        .unwrap_or(Type::Void);
    if ty.is_record() {
        bind_record_result(env, call);
    } else if let Some(value) = env.create_value(&ty) {
        env.set_expr_value(call, value);
    }
}

/// Record results live at a per-call location holding unknown fields
fn bind_record_result(env: &mut Environment, call: NodeId) {
    let loc = env.stable_location_for_expr(call);
    env.initialize_location(loc);
    env.set_expr_location(call, loc);
}
