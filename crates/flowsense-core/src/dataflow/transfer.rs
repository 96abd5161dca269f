//! Statement-level transfer function
//!
//! [`transfer`] applies the effect of one CFG element to an environment. It
//! is total: forms it does not model, and operands it finds no state for,
//! degrade to fresh unknown values (or to no update at all), never to a
//! failure.
//!
//! Operands are normally visited before their parent, as separate CFG
//! elements, so handlers read operand state straight from the environment.
//! Two exceptions need more care. Operands of `&&`/`||` and the arms of `?:`
//! live in other blocks and are read through the [`StmtToEnvMap`] locator.
//! Assignment targets that were never visited on their own get a nested
//! transfer before being written.

use super::context::{transfer_call, TransferOptions};
use super::environment::Environment;
use super::formula::Formula;
use super::locator::StmtToEnvMap;
use super::value::{IntValue, StorageLocation, Value};
use crate::ast::{BinOp, CastKind, NodeId, StmtKind, TranslationUnit, Type, UnaryOp, VarId};
use tracing::trace;

/// Apply the effect of `stmt` to `env`.
///
/// `stmt` must not be a `Paren` or `ExprWithCleanups` wrapper; unwrap those
/// with [`TranslationUnit::skip_wrappers`] first. Debug builds assert this,
/// release builds leave the environment untouched.
pub fn transfer(locator: &dyn StmtToEnvMap, stmt: NodeId, env: &mut Environment, options: &TransferOptions) {
    let tu = env.translation_unit_handle();
    let Some(node) = tu.get(stmt) else {
        return;
    };
    debug_assert!(
        !node.kind.is_wrapper(),
        "{stmt} is a Paren/ExprWithCleanups wrapper; unwrap it before transfer"
    );
    if node.kind.is_wrapper() {
        return;
    }
    trace!(%stmt, "transfer");

    TransferVisitor {
        tu: &tu,
        locator,
        env,
        options,
    }
    .visit(stmt);
}

struct TransferVisitor<'a> {
    tu: &'a TranslationUnit,
    locator: &'a dyn StmtToEnvMap,
    env: &'a mut Environment,
    options: &'a TransferOptions,
}

impl TransferVisitor<'_> {
    fn visit(&mut self, stmt: NodeId) {
        let tu = self.tu;
        let Some(node) = tu.get(stmt) else {
            return;
        };
        match &node.kind {
            StmtKind::Decl(vars) => {
                for &var in vars {
                    self.visit_var_decl(var);
                }
            }
            StmtKind::IntLiteral(value) => self.env.set_expr_value(stmt, Value::known_int(*value)),
            StmtKind::BoolLiteral(value) => self.env.set_expr_value(stmt, Value::Bool(Formula::literal(*value))),
            StmtKind::NullPtr => {
                let pointee = node.ty.pointee().cloned().unwrap_or(Type::Void);
                let loc = self.env.null_location(&pointee);
                self.env.set_expr_value(stmt, Value::Pointer(loc));
            }
            StmtKind::DeclRef(var) => self.visit_decl_ref(stmt, *var),
            StmtKind::ImplicitCast { kind, sub } => self.visit_cast(stmt, *kind, *sub, &node.ty),
            StmtKind::Binary { op, lhs, rhs } => match op {
                BinOp::Assign => self.visit_assign(stmt, *lhs, *rhs),
                BinOp::LAnd | BinOp::LOr => self.visit_logical(stmt, *op, *lhs, *rhs),
                BinOp::Comma => self.propagate(stmt, *rhs),
                op if op.is_comparison() => self.visit_comparison(stmt, *op, *lhs, *rhs),
                op => self.visit_arithmetic(stmt, *op, *lhs, *rhs, &node.ty),
            },
            StmtKind::Unary { op, sub } => self.visit_unary(stmt, *op, *sub, &node.ty),
            StmtKind::Member { base, field, arrow } => self.visit_member(stmt, *base, field, *arrow),
            StmtKind::Call { callee, args } => transfer_call(self.env, stmt, *callee, args, self.options),
            StmtKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => self.visit_conditional(stmt, *cond, *then_expr, *else_expr, &node.ty),
            StmtKind::Return(value) => self.visit_return(*value),
            // Control flow is carried by the CFG, not by element effects
            StmtKind::Compound(_)
            | StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::Break
            | StmtKind::Continue => {}
            StmtKind::InlineAsm(_) => {}
            StmtKind::Paren(_) | StmtKind::ExprWithCleanups(_) => {}
        }
    }

    /// Transfer `expr` (and the glvalue operands it designates through) if no
    /// state has been recorded for it yet.
    fn ensure_visited(&mut self, expr: NodeId) {
        let expr = self.tu.skip_wrappers(expr);
        if self.env.has_expr(expr) {
            return;
        }
        let tu = self.tu;
        match tu.get(expr).map(|node| &node.kind) {
            Some(StmtKind::Member { base, .. }) => self.ensure_visited(*base),
            Some(StmtKind::Unary { sub, .. }) | Some(StmtKind::ImplicitCast { sub, .. }) => self.ensure_visited(*sub),
            _ => {}
        }
        self.visit(expr);
    }

    /// Record a fresh unknown result for `stmt`
    fn bind_unknown(&mut self, stmt: NodeId, ty: &Type) {
        if ty.is_record() {
            let loc = self.fresh_location_for(stmt);
            self.env.set_expr_location(stmt, loc);
        } else if let Some(value) = self.env.create_value(ty) {
            self.env.set_expr_value(stmt, value);
        }
    }

    /// The stable stand-in location for `stmt`, given unknown contents the
    /// first time it is used on a path.
    fn fresh_location_for(&mut self, stmt: NodeId) -> StorageLocation {
        let loc = self.env.stable_location_for_expr(stmt);
        if !self.env.is_initialized(loc) {
            self.env.initialize_location(loc);
        }
        loc
    }

    /// `stmt` evaluates to whatever `operand` evaluated to
    fn propagate(&mut self, stmt: NodeId, operand: NodeId) {
        if let Some(loc) = self.env.expr_location(operand) {
            self.env.set_expr_location(stmt, loc);
        } else if let Some(value) = self.env.expr_value(operand) {
            self.env.set_expr_value(stmt, value);
        }
    }

    // ------------------------------------------------------------------
    // Declarations and references
    // ------------------------------------------------------------------

    fn visit_var_decl(&mut self, var: VarId) {
        let decl = self.tu.var(var);
        let loc = self.env.stable_location_for_decl(var);
        self.env.set_decl_location(var, loc);

        match decl.init {
            Some(init) if decl.ty.is_record() => match self.env.expr_location(init) {
                Some(src) => self.env.copy_record(src, loc),
                None => self.env.initialize_location(loc),
            },
            Some(init) => match self.env.expr_value(init) {
                Some(value) if value.is_compatible_with(&decl.ty) => self.env.set_value(loc, value),
                _ => self.env.initialize_location(loc),
            },
            None => self.env.initialize_location(loc),
        }
    }

    fn visit_decl_ref(&mut self, stmt: NodeId, var: VarId) {
        let loc = match self.env.decl_location(var) {
            Some(loc) => loc,
            None => {
                // Globals and parameters nobody bound. Contents a caller
                // already tracks at the stable location are kept.
                let loc = self.env.stable_location_for_decl(var);
                self.env.set_decl_location(var, loc);
                if !self.env.is_initialized(loc) {
                    self.env.initialize_location(loc);
                }
                loc
            }
        };
        self.env.set_expr_location(stmt, loc);
    }

    fn visit_cast(&mut self, stmt: NodeId, kind: CastKind, sub: NodeId, ty: &Type) {
        match kind {
            CastKind::LValueToRValue => {
                let Some(loc) = self.env.expr_location(sub) else {
                    self.bind_unknown(stmt, ty);
                    return;
                };
                if ty.is_record() {
                    self.env.set_expr_location(stmt, loc);
                    return;
                }
                let value = match self.env.value_at(loc).cloned() {
                    Some(value) => value,
                    None => {
                        let Some(value) = self.env.create_value(ty) else {
                            return;
                        };
                        self.env.set_value(loc, value.clone());
                        value
                    }
                };
                self.env.set_expr_value(stmt, value);
            }
            CastKind::IntegralToBoolean => {
                let formula = match self.env.expr_value(sub) {
                    Some(Value::Int(IntValue::Known(n))) => Formula::literal(n != 0),
                    Some(Value::Bool(formula)) => formula,
                    _ => self.env.make_atom(),
                };
                self.env.set_expr_value(stmt, Value::Bool(formula));
            }
            CastKind::NoOp => self.propagate(stmt, sub),
        }
    }

    // ------------------------------------------------------------------
    // Binary operators
    // ------------------------------------------------------------------

    fn visit_assign(&mut self, stmt: NodeId, lhs: NodeId, rhs: NodeId) {
        self.ensure_visited(lhs);
        let Some(target) = self.env.expr_location(lhs) else {
            return;
        };
        let ty = self.env.location_type(target).unwrap_or(Type::Void);

        if ty.is_record() {
            match self.env.expr_location(rhs) {
                Some(src) => self.env.copy_record(src, target),
                None => self.env.initialize_location(target),
            }
        } else {
            let value = match self.env.expr_value(rhs) {
                Some(value) if value.is_compatible_with(&ty) => Some(value),
                _ => self.env.create_value(&ty),
            };
            if let Some(value) = value {
                self.env.set_value(target, value);
            }
        }
        // An assignment designates its target
        self.env.set_expr_location(stmt, target);
    }

    fn visit_logical(&mut self, stmt: NodeId, op: BinOp, lhs: NodeId, rhs: NodeId) {
        let lhs = self.operand_formula(lhs);
        let rhs = self.operand_formula(rhs);
        let result = match op {
            BinOp::LAnd => lhs.and(&rhs),
            _ => lhs.or(&rhs),
        };
        self.env.set_expr_value(stmt, Value::Bool(result));
    }

    /// Boolean value of a short-circuit operand: from the state after its own
    /// block when that block was analyzed, else from the current state. An
    /// operand with no state anywhere is unconstrained.
    fn operand_formula(&mut self, operand: NodeId) -> Formula {
        let operand = self.tu.skip_wrappers(operand);
        if let Some(Value::Bool(formula)) = self
            .locator
            .environment(operand)
            .and_then(|env| env.expr_value(operand))
        {
            return formula;
        }
        if let Some(Value::Bool(formula)) = self.env.expr_value(operand) {
            return formula;
        }

        let tu = self.tu;
        let is_logical = matches!(
            tu.get(operand).map(|node| &node.kind),
            Some(StmtKind::Binary { op, .. }) if op.is_logical()
        );
        if is_logical {
            self.visit(operand);
            if let Some(Value::Bool(formula)) = self.env.expr_value(operand) {
                return formula;
            }
        }
        self.env.make_atom()
    }

    fn visit_arithmetic(&mut self, stmt: NodeId, op: BinOp, lhs: NodeId, rhs: NodeId, ty: &Type) {
        if *ty != Type::Int {
            self.bind_unknown(stmt, ty);
            return;
        }
        let folded = match (self.env.expr_value(lhs), self.env.expr_value(rhs)) {
            (Some(Value::Int(IntValue::Known(a))), Some(Value::Int(IntValue::Known(b)))) => fold_arithmetic(op, a, b),
            _ => None,
        };
        let value = match folded {
            Some(n) => IntValue::Known(n),
            None => self.env.fresh_int(),
        };
        self.env.set_expr_value(stmt, Value::Int(value));
    }

    fn visit_comparison(&mut self, stmt: NodeId, op: BinOp, lhs: NodeId, rhs: NodeId) {
        let decided = match (self.env.expr_value(lhs), self.env.expr_value(rhs)) {
            (Some(Value::Bool(a)), Some(Value::Bool(b))) => match op {
                BinOp::Eq => Some(a.iff(&b)),
                BinOp::Ne => Some(a.iff(&b).not()),
                _ => None,
            },
            (Some(Value::Int(a)), Some(Value::Int(b))) => compare_ints(op, a, b).map(Formula::literal),
            (Some(Value::Pointer(a)), Some(Value::Pointer(b))) => self.compare_pointers(op, a, b).map(Formula::literal),
            _ => None,
        };
        let formula = match decided {
            Some(formula) => formula,
            None => self.env.make_atom(),
        };
        self.env.set_expr_value(stmt, Value::Bool(formula));
    }

    fn compare_pointers(&self, op: BinOp, a: StorageLocation, b: StorageLocation) -> Option<bool> {
        let equal = if a == b {
            true
        } else if !self.env.is_synthetic(a) && !self.env.is_synthetic(b) {
            // distinct known objects never alias
            false
        } else {
            return None;
        };
        match op {
            BinOp::Eq => Some(equal),
            BinOp::Ne => Some(!equal),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Unary operators, member access
    // ------------------------------------------------------------------

    fn visit_unary(&mut self, stmt: NodeId, op: UnaryOp, sub: NodeId, ty: &Type) {
        match op {
            UnaryOp::LNot => {
                let formula = match self.env.expr_value(sub) {
                    Some(Value::Bool(formula)) => formula.not(),
                    _ => self.env.make_atom(),
                };
                self.env.set_expr_value(stmt, Value::Bool(formula));
            }
            UnaryOp::Minus => {
                let value = match self.env.expr_value(sub) {
                    Some(Value::Int(IntValue::Known(n))) => n.checked_neg().map(IntValue::Known),
                    _ => None,
                };
                match value {
                    Some(value) => self.env.set_expr_value(stmt, Value::Int(value)),
                    None => self.bind_unknown(stmt, ty),
                }
            }
            UnaryOp::Deref => {
                let loc = match self.env.expr_value(sub) {
                    Some(Value::Pointer(loc)) => loc,
                    _ => self.fresh_location_for(stmt),
                };
                self.env.set_expr_location(stmt, loc);
            }
            UnaryOp::AddrOf => match self.env.expr_location(sub) {
                Some(loc) => self.env.set_expr_value(stmt, Value::Pointer(loc)),
                None => self.bind_unknown(stmt, ty),
            },
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                self.visit_increment(stmt, op, sub, ty)
            }
        }
    }

    fn visit_increment(&mut self, stmt: NodeId, op: UnaryOp, sub: NodeId, ty: &Type) {
        let Some(loc) = self.env.expr_location(sub) else {
            self.bind_unknown(stmt, ty);
            return;
        };
        let old = self.env.value_at(loc).cloned();
        let delta = match op {
            UnaryOp::PreInc | UnaryOp::PostInc => 1,
            _ => -1,
        };
        let new = match &old {
            Some(Value::Int(IntValue::Known(n))) => n.checked_add(delta).map(Value::known_int),
            _ => None,
        };
        let new = match new {
            Some(value) => Some(value),
            None => self.env.location_type(loc).and_then(|ty| self.env.create_value(&ty)),
        };
        if let Some(new) = new {
            self.env.set_value(loc, new);
        }

        match op {
            UnaryOp::PreInc | UnaryOp::PreDec => self.env.set_expr_location(stmt, loc),
            _ => match old {
                Some(old) => self.env.set_expr_value(stmt, old),
                None => self.bind_unknown(stmt, ty),
            },
        }
    }

    fn visit_member(&mut self, stmt: NodeId, base: NodeId, field: &str, arrow: bool) {
        let base_loc = if arrow {
            self.env.expr_value(base).and_then(|value| value.as_pointer())
        } else {
            self.env.expr_location(base)
        };
        let loc = match base_loc.and_then(|loc| self.env.child_location(loc, field)) {
            Some(loc) => loc,
            None => self.fresh_location_for(stmt),
        };
        self.env.set_expr_location(stmt, loc);
    }

    // ------------------------------------------------------------------
    // Conditional operator, return
    // ------------------------------------------------------------------

    fn visit_conditional(&mut self, stmt: NodeId, cond: NodeId, then_expr: NodeId, else_expr: NodeId, ty: &Type) {
        if ty.is_record() {
            let loc = self.fresh_location_for(stmt);
            self.env.set_expr_location(stmt, loc);
            return;
        }
        let value = match (self.arm_value(then_expr), self.arm_value(else_expr)) {
            (Some(a), Some(b)) if a == b => Some(a),
            // the other arm is infeasible
            (Some(value), None) | (None, Some(value)) => Some(value),
            (Some(Value::Bool(a)), Some(Value::Bool(b))) => {
                let c = self.operand_formula(cond);
                Some(Value::Bool(c.and(&a).or(&c.not().and(&b))))
            }
            _ => None,
        };
        match value {
            Some(value) if value.is_compatible_with(ty) => self.env.set_expr_value(stmt, value),
            _ => self.bind_unknown(stmt, ty),
        }
    }

    fn arm_value(&self, arm: NodeId) -> Option<Value> {
        let arm = self.tu.skip_wrappers(arm);
        self.locator
            .environment(arm)
            .and_then(|env| env.expr_value(arm))
            .or_else(|| self.env.expr_value(arm))
    }

    fn visit_return(&mut self, value: Option<NodeId>) {
        let Some(expr) = value else {
            return;
        };
        let ty = self.tu.get(expr).map(|node| node.ty.clone()).unwrap_or(Type::Void);
        // Record results are modeled at the call site
        if ty.is_void() || ty.is_record() {
            return;
        }
        let value = match self.env.expr_value(expr) {
            Some(value) if value.is_compatible_with(&ty) => Some(value),
            _ => self.env.create_value(&ty),
        };
        if let Some(value) = value {
            self.env.set_return_value(value);
        }
    }
}

fn fold_arithmetic(op: BinOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => a.checked_div(b),
        BinOp::Rem => a.checked_rem(b),
        _ => None,
    }
}

fn compare_ints(op: BinOp, a: IntValue, b: IntValue) -> Option<bool> {
    match (a, b) {
        (IntValue::Known(x), IntValue::Known(y)) => match op {
            BinOp::Eq => Some(x == y),
            BinOp::Ne => Some(x != y),
            BinOp::Lt => Some(x < y),
            BinOp::Le => Some(x <= y),
            BinOp::Gt => Some(x > y),
            BinOp::Ge => Some(x >= y),
            _ => None,
        },
        (IntValue::Symbolic(x), IntValue::Symbolic(y)) if x == y => match op {
            BinOp::Eq | BinOp::Le | BinOp::Ge => Some(true),
            BinOp::Ne | BinOp::Lt | BinOp::Gt => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::locator::NoBlockStates;
    use std::collections::HashMap;
    use std::rc::Rc;

    fn run(tu: &Rc<TranslationUnit>, env: &mut Environment, stmts: &[NodeId]) {
        let options = TransferOptions::default();
        for &stmt in stmts {
            transfer(&NoBlockStates, tu.skip_wrappers(stmt), env, &options);
        }
    }

    #[test]
    fn test_declaration_binds_initializer() {
        let mut tu = TranslationUnit::new();
        let five = tu.int_lit(5);
        let (x, decl) = tu.local("x", Type::Int, Some(five));
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        run(&tu, &mut env, &[five, decl]);

        assert_eq!(env.decl_value(x), Some(&Value::known_int(5)));
    }

    #[test]
    fn test_uninitialized_declaration_is_unknown() {
        let mut tu = TranslationUnit::new();
        let (b, decl) = tu.local("b", Type::Bool, None);
        let (p, decl_p) = tu.local("p", Type::pointer_to(Type::Int), None);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        run(&tu, &mut env, &[decl, decl_p]);

        let b_value = env.decl_value(b).and_then(Value::as_bool).cloned().unwrap();
        assert!(!env.proves(&b_value));
        assert!(!env.proves(&b_value.not()));
        let pointee = env.decl_value(p).and_then(Value::as_pointer).unwrap();
        assert!(matches!(env.value_at(pointee), Some(Value::Int(IntValue::Symbolic(_)))));
    }

    #[test]
    fn test_integral_to_boolean_folds_constants() {
        let mut tu = TranslationUnit::new();
        let zero = tu.int_lit(0);
        let cast = tu.to_bool(zero);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        run(&tu, &mut env, &[zero, cast]);

        assert_eq!(env.expr_value(cast), Some(Value::Bool(Formula::literal(false))));
    }

    #[test]
    fn test_arithmetic_folding_and_overflow() {
        let mut tu = TranslationUnit::new();
        let max = tu.int_lit(i64::MAX);
        let one = tu.int_lit(1);
        let overflow = tu.binary(BinOp::Add, max, one);
        let six = tu.int_lit(6);
        let product = tu.binary(BinOp::Mul, six, one);
        let zero = tu.int_lit(0);
        let div = tu.binary(BinOp::Div, six, zero);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        run(&tu, &mut env, &[max, one, overflow, six, product, zero, div]);

        assert_eq!(env.expr_value(product), Some(Value::known_int(6)));
        assert!(matches!(env.expr_value(overflow), Some(Value::Int(IntValue::Symbolic(_)))));
        assert!(matches!(env.expr_value(div), Some(Value::Int(IntValue::Symbolic(_)))));
    }

    #[test]
    fn test_comparison_of_same_unknown() {
        let mut tu = TranslationUnit::new();
        let x = tu.declare_var("x", Type::Int, None);
        let ref_lhs = tu.decl_ref(x);
        let lhs = tu.rvalue(ref_lhs);
        let ref_rhs = tu.decl_ref(x);
        let rhs = tu.rvalue(ref_rhs);
        let eq = tu.binary(BinOp::Eq, lhs, rhs);
        let lt = tu.binary(BinOp::Lt, lhs, rhs);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));
        let unknown = env.create_value(&Type::Int).unwrap();
        env.bind_decl_value(x, unknown);

        run(&tu, &mut env, &[ref_lhs, lhs, ref_rhs, rhs, eq, lt]);

        assert_eq!(env.expr_value(eq), Some(Value::Bool(Formula::literal(true))));
        assert_eq!(env.expr_value(lt), Some(Value::Bool(Formula::literal(false))));
    }

    #[test]
    fn test_pointer_comparison_of_distinct_variables() {
        let mut tu = TranslationUnit::new();
        let a = tu.declare_var("a", Type::Int, None);
        let b = tu.declare_var("b", Type::Int, None);
        let ref_a = tu.decl_ref(a);
        let ref_b = tu.decl_ref(b);
        let addr_a = tu.addr_of(ref_a);
        let addr_b = tu.addr_of(ref_b);
        let eq = tu.binary(BinOp::Eq, addr_a, addr_b);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        run(&tu, &mut env, &[ref_a, addr_a, ref_b, addr_b, eq]);

        assert_eq!(env.expr_value(eq), Some(Value::Bool(Formula::literal(false))));
    }

    #[test]
    fn test_logical_and_reads_operands_through_locator() {
        let mut tu = TranslationUnit::new();
        let a = tu.declare_var("a", Type::Bool, None);
        let b = tu.declare_var("b", Type::Bool, None);
        let read_a = tu.read(a);
        let read_b = tu.read(b);
        let and = tu.and(read_a, read_b);
        let tu = Rc::new(tu);
        let env = Environment::new(Rc::clone(&tu));

        let atom_a = env.make_atom();
        let atom_b = env.make_atom();
        let mut lhs_env = env.clone();
        lhs_env.set_expr_value(read_a, Value::Bool(atom_a.clone()));
        let mut rhs_env = env.clone();
        rhs_env.set_expr_value(read_b, Value::Bool(atom_b.clone()));

        let mut locator = HashMap::new();
        locator.insert(read_a, lhs_env);
        locator.insert(read_b, rhs_env);

        let mut current = env.clone();
        transfer(&locator, and, &mut current, &TransferOptions::default());

        assert_eq!(current.expr_value(and), Some(Value::Bool(atom_a.and(&atom_b))));
    }

    #[test]
    fn test_negation_complements_formula() {
        let mut tu = TranslationUnit::new();
        let b = tu.declare_var("b", Type::Bool, None);
        let read_b = tu.read(b);
        let not = tu.not(read_b);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));
        let atom = env.make_atom();
        env.set_expr_value(read_b, Value::Bool(atom.clone()));

        run(&tu, &mut env, &[not]);

        assert_eq!(env.expr_value(not), Some(Value::Bool(atom.not())));
    }

    #[test]
    fn test_assignment_through_pointer_updates_pointee() {
        let mut tu = TranslationUnit::new();
        let x = tu.declare_var("x", Type::Int, None);
        let p = tu.declare_var("p", Type::pointer_to(Type::Int), None);
        let ref_x = tu.decl_ref(x);
        let addr = tu.addr_of(ref_x);
        let ref_p = tu.decl_ref(p);
        let store_p = tu.assign(ref_p, addr);
        let read_p = tu.read(p);
        let deref = tu.deref(read_p);
        let seven = tu.int_lit(7);
        let store = tu.assign(deref, seven);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        // `*p` is deliberately not visited on its own before the store
        run(&tu, &mut env, &[ref_x, addr, ref_p, store_p, seven, store]);

        assert_eq!(env.decl_value(x), Some(&Value::known_int(7)));
        assert_eq!(env.expr_value(store), Some(Value::known_int(7)));
    }

    #[test]
    fn test_member_access_on_record_and_unknown_pointer() {
        let mut tu = TranslationUnit::new();
        let pair = Type::record("pair", vec![("first", Type::Int), ("second", Type::Int)]);
        let (s, decl) = tu.local("s", pair.clone(), None);
        let ref_s = tu.decl_ref(s);
        let first = tu.member(ref_s, "first", false);
        let nine = tu.int_lit(9);
        let store = tu.assign(first, nine);
        let q = tu.declare_var("q", Type::pointer_to(pair), None);
        let read_q = tu.read(q);
        let second = tu.member(read_q, "second", true);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        run(&tu, &mut env, &[decl, ref_s, first, nine, store, read_q, second]);

        let s_loc = env.decl_location(s).unwrap();
        let first_loc = env.child_location(s_loc, "first").unwrap();
        assert_eq!(env.value_at(first_loc), Some(&Value::known_int(9)));
        // `q` was never declared on this path: it points at unknown memory
        assert!(matches!(env.expr_value(second), Some(Value::Int(IntValue::Symbolic(_)))));
        assert!(env.well_formedness_violations().is_empty());
    }

    #[test]
    fn test_post_increment_yields_old_value() {
        let mut tu = TranslationUnit::new();
        let two = tu.int_lit(2);
        let (i, decl) = tu.local("i", Type::Int, Some(two));
        let ref_i = tu.decl_ref(i);
        let inc = tu.unary(UnaryOp::PostInc, ref_i);
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        run(&tu, &mut env, &[two, decl, ref_i, inc]);

        assert_eq!(env.expr_value(inc), Some(Value::known_int(2)));
        assert_eq!(env.decl_value(i), Some(&Value::known_int(3)));
    }

    #[test]
    fn test_return_records_value() {
        let mut tu = TranslationUnit::new();
        let one = tu.int_lit(1);
        let ret = tu.return_stmt(Some(one));
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));

        run(&tu, &mut env, &[one, ret]);

        assert_eq!(env.return_value(), Some(&Value::known_int(1)));
    }

    #[test]
    fn test_inline_asm_is_a_no_op() {
        let mut tu = TranslationUnit::new();
        let asm = tu.inline_asm("nop");
        let tu = Rc::new(tu);
        let mut env = Environment::new(Rc::clone(&tu));
        let before = env.clone();

        run(&tu, &mut env, &[asm]);

        assert_eq!(env, before);
    }
}
