//! Flow-sensitive program state
//!
//! An [`Environment`] records, for one program point, which storage location
//! each declaration and glvalue expression designates, which value each
//! location and prvalue expression holds, and the flow condition under which
//! the point is reached.
//!
//! Locations, atoms and symbols are allocated from an analysis context shared
//! by every environment derived from the same entry state. Sharing is what
//! makes locations *stable*: a declaration maps to the same location on both
//! sides of a join and inside inlined callees, so aliasing facts survive.

use super::cfg::{Cfg, CfgBuilder};
use super::formula::{Atom, Formula, Satisfiability, Solver};
use super::value::{IntValue, StorageLocation, Symbol, Value};
use crate::ast::{FuncId, NodeId, TranslationUnit, Type, VarId};
use crate::config::AnalysisLimits;
use fnv::{FnvHashMap, FnvHashSet};
use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

/// Pointer nesting eagerly given pointees by [`Environment::create_value`]
const MAX_POINTEE_DEPTH: usize = 3;

#[derive(Debug, Clone)]
struct LocationInfo {
    ty: Type,
    children: IndexMap<String, StorageLocation>,
    /// Created to stand for memory the analysis knows nothing about
    synthetic: bool,
}

#[derive(Debug, Clone)]
struct AnalysisContext {
    limits: AnalysisLimits,
    solver: Solver,
    locations: Vec<LocationInfo>,
    next_atom: u32,
    next_symbol: u32,
    decl_locations: FnvHashMap<VarId, StorageLocation>,
    expr_locations: FnvHashMap<NodeId, StorageLocation>,
    null_locations: FnvHashMap<Type, StorageLocation>,
    cfgs: FnvHashMap<FuncId, Rc<Cfg>>,
}

impl AnalysisContext {
    fn new(limits: AnalysisLimits) -> Self {
        Self {
            limits,
            solver: Solver::new(limits.max_solver_atoms),
            locations: Vec::new(),
            next_atom: 0,
            next_symbol: 0,
            decl_locations: FnvHashMap::default(),
            expr_locations: FnvHashMap::default(),
            null_locations: FnvHashMap::default(),
            cfgs: FnvHashMap::default(),
        }
    }

    fn new_location(&mut self, ty: &Type, synthetic: bool) -> StorageLocation {
        let children = match ty {
            Type::Record(record) => record
                .fields
                .iter()
                .map(|(name, field_ty)| (name.clone(), self.new_location(field_ty, synthetic)))
                .collect(),
            _ => IndexMap::new(),
        };
        let loc = StorageLocation(self.locations.len() as u32);
        self.locations.push(LocationInfo {
            ty: ty.clone(),
            children,
            synthetic,
        });
        loc
    }

    fn info(&self, loc: StorageLocation) -> Option<&LocationInfo> {
        self.locations.get(loc.0 as usize)
    }
}

#[derive(Clone)]
pub struct Environment {
    tu: Rc<TranslationUnit>,
    ctx: Rc<RefCell<AnalysisContext>>,
    decl_to_loc: IndexMap<VarId, StorageLocation>,
    expr_to_loc: IndexMap<NodeId, StorageLocation>,
    expr_to_val: IndexMap<NodeId, Value>,
    loc_to_val: IndexMap<StorageLocation, Value>,
    flow_condition: Formula,
    return_value: Option<Value>,
}

impl Environment {
    pub fn new(tu: Rc<TranslationUnit>) -> Self {
        Self::with_limits(tu, AnalysisLimits::default())
    }

    pub fn with_limits(tu: Rc<TranslationUnit>, limits: AnalysisLimits) -> Self {
        Self {
            tu,
            ctx: Rc::new(RefCell::new(AnalysisContext::new(limits))),
            decl_to_loc: IndexMap::new(),
            expr_to_loc: IndexMap::new(),
            expr_to_val: IndexMap::new(),
            loc_to_val: IndexMap::new(),
            flow_condition: Formula::literal(true),
            return_value: None,
        }
    }

    /// Copy this environment together with a private copy of its analysis
    /// context, so allocations made through the fork are invisible to (and
    /// identical to those of) any other fork.
    pub fn fork(&self) -> Self {
        let ctx = self.ctx.borrow().clone();
        Self {
            ctx: Rc::new(RefCell::new(ctx)),
            ..self.clone()
        }
    }

    pub fn translation_unit(&self) -> &TranslationUnit {
        &self.tu
    }

    pub(crate) fn translation_unit_handle(&self) -> Rc<TranslationUnit> {
        Rc::clone(&self.tu)
    }

    pub fn limits(&self) -> AnalysisLimits {
        self.ctx.borrow().limits
    }

    // ------------------------------------------------------------------
    // Storage locations
    // ------------------------------------------------------------------

    pub fn create_storage_location(&self, ty: &Type) -> StorageLocation {
        self.ctx.borrow_mut().new_location(ty, false)
    }

    fn create_synthetic_location(&self, ty: &Type) -> StorageLocation {
        self.ctx.borrow_mut().new_location(ty, true)
    }

    /// The location of `var`, identical in every environment of this analysis
    pub fn stable_location_for_decl(&self, var: VarId) -> StorageLocation {
        let ty = self.tu.var(var).ty.clone();
        let mut ctx = self.ctx.borrow_mut();
        if let Some(loc) = ctx.decl_locations.get(&var) {
            return *loc;
        }
        let loc = ctx.new_location(&ty, false);
        ctx.decl_locations.insert(var, loc);
        loc
    }

    /// A synthetic location standing for whatever `expr` designates when the
    /// analysis cannot tell; stable across visits of the same expression.
    pub fn stable_location_for_expr(&self, expr: NodeId) -> StorageLocation {
        let expr = self.tu.skip_wrappers(expr);
        let ty = self
            .tu
            .get(expr)
            .map(|node| node.ty.clone())
            .unwrap_or(Type::Void);
        let mut ctx = self.ctx.borrow_mut();
        if let Some(loc) = ctx.expr_locations.get(&expr) {
            return *loc;
        }
        let loc = ctx.new_location(&ty, true);
        ctx.expr_locations.insert(expr, loc);
        loc
    }

    /// The location null pointers to `pointee` refer to
    pub fn null_location(&self, pointee: &Type) -> StorageLocation {
        let mut ctx = self.ctx.borrow_mut();
        if let Some(loc) = ctx.null_locations.get(pointee) {
            return *loc;
        }
        let loc = ctx.new_location(pointee, false);
        ctx.null_locations.insert(pointee.clone(), loc);
        loc
    }

    pub fn location_type(&self, loc: StorageLocation) -> Option<Type> {
        self.ctx.borrow().info(loc).map(|info| info.ty.clone())
    }

    pub fn child_location(&self, loc: StorageLocation, field: &str) -> Option<StorageLocation> {
        self.ctx
            .borrow()
            .info(loc)
            .and_then(|info| info.children.get(field).copied())
    }

    fn children(&self, loc: StorageLocation) -> Vec<StorageLocation> {
        self.ctx
            .borrow()
            .info(loc)
            .map(|info| info.children.values().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `loc` holds a value (every scalar field does, for records)
    pub fn is_initialized(&self, loc: StorageLocation) -> bool {
        match self.location_type(loc) {
            Some(Type::Record(_)) => self.children(loc).into_iter().all(|child| self.is_initialized(child)),
            Some(_) => self.loc_to_val.contains_key(&loc),
            None => false,
        }
    }

    pub fn is_synthetic(&self, loc: StorageLocation) -> bool {
        self.ctx.borrow().info(loc).is_some_and(|info| info.synthetic)
    }

    pub fn decl_location(&self, var: VarId) -> Option<StorageLocation> {
        self.decl_to_loc.get(&var).copied()
    }

    pub fn set_decl_location(&mut self, var: VarId, loc: StorageLocation) {
        self.decl_to_loc.insert(var, loc);
    }

    pub fn expr_location(&self, expr: NodeId) -> Option<StorageLocation> {
        self.expr_to_loc.get(&self.tu.skip_wrappers(expr)).copied()
    }

    pub fn set_expr_location(&mut self, expr: NodeId, loc: StorageLocation) {
        let expr = self.tu.skip_wrappers(expr);
        self.expr_to_loc.insert(expr, loc);
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    pub fn value_at(&self, loc: StorageLocation) -> Option<&Value> {
        self.loc_to_val.get(&loc)
    }

    pub fn set_value(&mut self, loc: StorageLocation, value: Value) {
        self.loc_to_val.insert(loc, value);
    }

    /// Value of `expr`: its own prvalue, or the value at the location it designates
    pub fn expr_value(&self, expr: NodeId) -> Option<Value> {
        let expr = self.tu.skip_wrappers(expr);
        if let Some(value) = self.expr_to_val.get(&expr) {
            return Some(value.clone());
        }
        let loc = self.expr_to_loc.get(&expr)?;
        self.loc_to_val.get(loc).cloned()
    }

    pub fn set_expr_value(&mut self, expr: NodeId, value: Value) {
        let expr = self.tu.skip_wrappers(expr);
        self.expr_to_val.insert(expr, value);
    }

    /// Whether anything at all is recorded for `expr`
    pub fn has_expr(&self, expr: NodeId) -> bool {
        let expr = self.tu.skip_wrappers(expr);
        self.expr_to_val.contains_key(&expr) || self.expr_to_loc.contains_key(&expr)
    }

    pub fn decl_value(&self, var: VarId) -> Option<&Value> {
        self.decl_location(var).and_then(|loc| self.value_at(loc))
    }

    /// Bind `var` to its stable location and store `value` there
    pub fn bind_decl_value(&mut self, var: VarId, value: Value) {
        let loc = self
            .decl_location(var)
            .unwrap_or_else(|| self.stable_location_for_decl(var));
        self.set_decl_location(var, loc);
        self.set_value(loc, value);
    }

    pub fn make_atom(&self) -> Formula {
        let mut ctx = self.ctx.borrow_mut();
        let atom = Atom(ctx.next_atom);
        ctx.next_atom += 1;
        Formula::atom(atom)
    }

    pub fn fresh_int(&self) -> IntValue {
        let mut ctx = self.ctx.borrow_mut();
        let symbol = Symbol(ctx.next_symbol);
        ctx.next_symbol += 1;
        IntValue::Symbolic(symbol)
    }

    /// A fresh unknown value of type `ty`; `None` for records and `void`
    pub fn create_value(&mut self, ty: &Type) -> Option<Value> {
        self.create_value_at_depth(ty, 0)
    }

    fn create_value_at_depth(&mut self, ty: &Type, depth: usize) -> Option<Value> {
        match ty {
            Type::Bool => Some(Value::Bool(self.make_atom())),
            Type::Int => Some(Value::Int(self.fresh_int())),
            Type::Pointer(pointee) => {
                let loc = self.create_synthetic_location(pointee);
                if depth < MAX_POINTEE_DEPTH {
                    self.initialize_location_at_depth(loc, depth + 1);
                }
                Some(Value::Pointer(loc))
            }
            Type::Void | Type::Record(_) => None,
        }
    }

    /// Store fresh unknown values at `loc` (and every field below it)
    pub fn initialize_location(&mut self, loc: StorageLocation) {
        self.initialize_location_at_depth(loc, 0);
    }

    fn initialize_location_at_depth(&mut self, loc: StorageLocation, depth: usize) {
        let Some(ty) = self.location_type(loc) else {
            return;
        };
        if ty.is_record() {
            for child in self.children(loc) {
                self.initialize_location_at_depth(child, depth);
            }
            return;
        }
        match self.create_value_at_depth(&ty, depth) {
            Some(value) => self.set_value(loc, value),
            None => {
                self.loc_to_val.shift_remove(&loc);
            }
        }
    }

    /// Field-wise copy of the aggregate at `src` into `dst`
    pub fn copy_record(&mut self, src: StorageLocation, dst: StorageLocation) {
        if src == dst {
            return;
        }
        let pairs: Vec<(StorageLocation, StorageLocation)> = {
            let ctx = self.ctx.borrow();
            match (ctx.info(src), ctx.info(dst)) {
                (Some(from), Some(to)) => to
                    .children
                    .iter()
                    .filter_map(|(name, dst_child)| from.children.get(name).map(|src_child| (*src_child, *dst_child)))
                    .collect(),
                _ => Vec::new(),
            }
        };
        for (src_child, dst_child) in pairs {
            if self.location_type(dst_child).is_some_and(|ty| ty.is_record()) {
                self.copy_record(src_child, dst_child);
                continue;
            }
            match self.value_at(src_child).cloned() {
                Some(value) => self.set_value(dst_child, value),
                None => self.initialize_location(dst_child),
            }
        }
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = Some(value);
    }

    // ------------------------------------------------------------------
    // Flow condition
    // ------------------------------------------------------------------

    pub fn flow_condition(&self) -> &Formula {
        &self.flow_condition
    }

    pub fn add_to_flow_condition(&mut self, constraint: &Formula) {
        self.flow_condition = self.flow_condition.and(constraint);
    }

    pub fn satisfiability(&self) -> Satisfiability {
        let solver = self.ctx.borrow().solver;
        solver.check(&[&self.flow_condition])
    }

    /// Whether `formula` holds on every path reaching this point
    pub fn proves(&self, formula: &Formula) -> bool {
        let solver = self.ctx.borrow().solver;
        solver.proves(&self.flow_condition, formula)
    }

    /// Whether `formula` holds on at least one path reaching this point
    pub fn allows(&self, formula: &Formula) -> bool {
        let solver = self.ctx.borrow().solver;
        solver.check(&[&self.flow_condition, formula]) != Satisfiability::Unsatisfiable
    }

    // ------------------------------------------------------------------
    // Join and convergence
    // ------------------------------------------------------------------

    /// Least upper bound of two environments reaching the same point
    pub fn join(&self, other: &Environment) -> Environment {
        let mut joined = Environment {
            tu: Rc::clone(&self.tu),
            ctx: Rc::clone(&self.ctx),
            decl_to_loc: intersect(&self.decl_to_loc, &other.decl_to_loc),
            expr_to_loc: intersect(&self.expr_to_loc, &other.expr_to_loc),
            expr_to_val: intersect(&self.expr_to_val, &other.expr_to_val),
            loc_to_val: IndexMap::new(),
            flow_condition: Formula::literal(true),
            return_value: None,
        };
        let mut lhs_bindings = Vec::new();
        let mut rhs_bindings = Vec::new();

        for (loc, lhs) in &self.loc_to_val {
            let Some(rhs) = other.loc_to_val.get(loc) else {
                continue;
            };
            let value = if lhs == rhs {
                Some(lhs.clone())
            } else {
                joined.join_distinct(lhs, rhs, &mut lhs_bindings, &mut rhs_bindings)
            };
            if let Some(value) = value {
                joined.loc_to_val.insert(*loc, value);
            }
        }

        joined.return_value = match (&self.return_value, &other.return_value) {
            (Some(lhs), Some(rhs)) if lhs == rhs => Some(lhs.clone()),
            (Some(lhs), Some(rhs)) => joined.join_distinct(lhs, rhs, &mut lhs_bindings, &mut rhs_bindings),
            (Some(value), None) | (None, Some(value)) => Some(value.clone()),
            (None, None) => None,
        };

        let lhs_condition = self.flow_condition.and(&Formula::all(&lhs_bindings));
        let rhs_condition = other.flow_condition.and(&Formula::all(&rhs_bindings));
        joined.flow_condition = lhs_condition.disjoin_factored(&rhs_condition);
        joined
    }

    /// Merge two differing values. Booleans get a fresh atom tied to each
    /// side's value under that side's flow condition; everything else widens
    /// to a fresh unknown of the same kind.
    fn join_distinct(
        &mut self,
        lhs: &Value,
        rhs: &Value,
        lhs_bindings: &mut Vec<Formula>,
        rhs_bindings: &mut Vec<Formula>,
    ) -> Option<Value> {
        match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => {
                let joined = self.make_atom();
                lhs_bindings.push(joined.iff(a));
                rhs_bindings.push(joined.iff(b));
                Some(Value::Bool(joined))
            }
            (Value::Int(_), Value::Int(_)) => Some(Value::Int(self.fresh_int())),
            (Value::Pointer(a), Value::Pointer(_)) => {
                let pointee = self.location_type(*a)?;
                let loc = self.create_synthetic_location(&pointee);
                self.initialize_location_at_depth(loc, 1);
                Some(Value::Pointer(loc))
            }
            _ => None,
        }
    }

    /// Whether `new` (in `other`) carries every fact `old` (in `self`) does.
    /// Unknowns may be renamed, but one unknown of `self` must always become
    /// the same value of `other`, so equalities between entities survive.
    fn value_refined_by(&self, old: &Value, other: &Environment, new: &Value, renaming: &mut Renaming) -> bool {
        match (old, new) {
            (Value::Bool(Formula::Literal(a)), Value::Bool(Formula::Literal(b))) => a == b,
            (Value::Bool(Formula::Literal(_)), _) | (_, Value::Bool(Formula::Literal(_))) => false,
            (Value::Bool(a), Value::Bool(b)) => {
                renaming.maps(old, new)
                    && match self.decide(a) {
                        Some(holds) => other.decide(b) == Some(holds),
                        None => true,
                    }
            }
            (Value::Int(IntValue::Known(a)), Value::Int(IntValue::Known(b))) => a == b,
            (Value::Int(IntValue::Symbolic(_)), Value::Int(IntValue::Symbolic(_))) => renaming.maps(old, new),
            (Value::Pointer(a), Value::Pointer(b)) if self.is_synthetic(*a) => {
                other.is_synthetic(*b) && renaming.maps(old, new)
            }
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            _ => false,
        }
    }

    /// `Some(true)` if the flow condition proves `formula`, `Some(false)` if
    /// it refutes it
    fn decide(&self, formula: &Formula) -> Option<bool> {
        if self.proves(formula) {
            Some(true)
        } else if self.proves(&formula.not()) {
            Some(false)
        } else {
            None
        }
    }

    /// Convergence test for the fixpoint driver. `other` is the newer state
    /// of the same point; it is equivalent when it binds the same entities
    /// and loses none of the constants, equalities or decided booleans of
    /// `self`.
    pub fn equivalent_to(&self, other: &Environment) -> bool {
        if self.decl_to_loc != other.decl_to_loc || self.expr_to_loc != other.expr_to_loc {
            return false;
        }
        if self.expr_to_val.len() != other.expr_to_val.len() {
            return false;
        }
        let tracked = |env: &Environment| -> IndexSet<StorageLocation> {
            env.loc_to_val
                .keys()
                .copied()
                .filter(|loc| !self.is_synthetic(*loc))
                .collect()
        };
        let (lhs_locs, rhs_locs) = (tracked(self), tracked(other));
        if lhs_locs != rhs_locs {
            return false;
        }

        let mut renaming = Renaming::default();
        let exprs_match = self.expr_to_val.iter().all(|(expr, old)| {
            other
                .expr_to_val
                .get(expr)
                .is_some_and(|new| self.value_refined_by(old, other, new, &mut renaming))
        });
        if !exprs_match {
            return false;
        }
        let locs_match = lhs_locs.iter().all(|loc| {
            match (self.loc_to_val.get(loc), other.loc_to_val.get(loc)) {
                (Some(old), Some(new)) => self.value_refined_by(old, other, new, &mut renaming),
                _ => false,
            }
        });
        if !locs_match {
            return false;
        }

        match (&self.return_value, &other.return_value) {
            (Some(old), Some(new)) => self.value_refined_by(old, other, new, &mut renaming),
            (None, None) => true,
            _ => false,
        }
    }

    /// Type mismatches between recorded values and the entities holding them
    pub fn well_formedness_violations(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let ctx = self.ctx.borrow();

        for (loc, value) in &self.loc_to_val {
            match ctx.info(*loc) {
                Some(info) if value.is_compatible_with(&info.ty) => {}
                Some(info) => issues.push(format!("{loc} of type {:?} holds {value}", info.ty)),
                None => issues.push(format!("{loc} was never allocated")),
            }
        }
        for (expr, value) in &self.expr_to_val {
            if let Some(node) = self.tu.get(*expr) {
                if !value.is_compatible_with(&node.ty) {
                    issues.push(format!("{expr} of type {:?} evaluates to {value}", node.ty));
                }
            }
        }
        for (var, loc) in &self.decl_to_loc {
            let declared = &self.tu.var(*var).ty;
            if ctx.info(*loc).map(|info| &info.ty) != Some(declared) {
                issues.push(format!("`{}` bound to {loc} of the wrong type", self.tu.var(*var).name));
            }
        }
        issues
    }

    // ------------------------------------------------------------------
    // Call frames
    // ------------------------------------------------------------------

    /// The callee's control-flow graph, built once per analysis
    pub fn cfg_for(&self, func: FuncId) -> Option<Rc<Cfg>> {
        let cached = self.ctx.borrow().cfgs.get(&func).cloned();
        if cached.is_some() {
            return cached;
        }
        self.tu.get_function(func)?.body?;
        let cfg = Rc::new(CfgBuilder::new(&self.tu).build_function(func));
        self.ctx.borrow_mut().cfgs.insert(func, Rc::clone(&cfg));
        Some(cfg)
    }

    /// Entry environment for analyzing `callee` at a call with `args`.
    ///
    /// The frame shares this environment's analysis context and every
    /// location value, so memory reachable from the caller is visible to the
    /// callee under the same identity. Parameters are bound to the arguments'
    /// values (records are copied field by field).
    pub fn push_call(&self, callee: FuncId, args: &[NodeId]) -> Environment {
        let mut frame = Environment {
            tu: Rc::clone(&self.tu),
            ctx: Rc::clone(&self.ctx),
            decl_to_loc: IndexMap::new(),
            expr_to_loc: IndexMap::new(),
            expr_to_val: IndexMap::new(),
            loc_to_val: self.loc_to_val.clone(),
            flow_condition: self.flow_condition.clone(),
            return_value: None,
        };
        let params = self
            .tu
            .get_function(callee)
            .map(|decl| decl.params.clone())
            .unwrap_or_default();

        for (index, param) in params.into_iter().enumerate() {
            let param_ty = self.tu.var(param).ty.clone();
            let loc = frame.stable_location_for_decl(param);
            frame.set_decl_location(param, loc);

            let arg = args.get(index).copied();
            if param_ty.is_record() {
                match arg.and_then(|arg| self.expr_location(arg)) {
                    Some(src) => frame.copy_record(src, loc),
                    None => frame.initialize_location(loc),
                }
                continue;
            }
            match arg.and_then(|arg| self.expr_value(arg)) {
                Some(value) if value.is_compatible_with(&param_ty) => frame.set_value(loc, value),
                _ => frame.initialize_location(loc),
            }
        }
        frame
    }

    /// Fold the callee's exit state back into this (caller) environment.
    ///
    /// Only locations reachable from the caller are written back: everything
    /// the caller already tracks plus anything reachable from those through
    /// pointer values in the callee's exit state. The callee's own locals are
    /// discarded. The call expression receives the callee's return value.
    pub fn pop_call(&mut self, call: NodeId, callee_exit: &Environment) {
        let frame_locals: FnvHashSet<StorageLocation> = callee_exit
            .decl_to_loc
            .values()
            .copied()
            .filter(|loc| !self.decl_to_loc.values().any(|own| own == loc))
            .collect();

        for loc in self.reachable_locations(callee_exit, &frame_locals) {
            match callee_exit.loc_to_val.get(&loc) {
                Some(value) => self.set_value(loc, value.clone()),
                None if self.loc_to_val.contains_key(&loc) => match self.location_type(loc) {
                    Some(ty) if !ty.is_record() => match self.create_value(&ty) {
                        Some(value) => self.set_value(loc, value),
                        None => {
                            self.loc_to_val.shift_remove(&loc);
                        }
                    },
                    _ => {}
                },
                None => {}
            }
        }
        self.flow_condition = callee_exit.flow_condition.clone();

        let result_ty = self
            .tu
            .get(call)
            .map(|node| node.ty.clone())
            .unwrap_or(Type::Void);
        if result_ty.is_void() || result_ty.is_record() {
            return;
        }
        let result = callee_exit
            .return_value
            .clone()
            .filter(|value| value.is_compatible_with(&result_ty))
            .or_else(|| self.create_value(&result_ty));
        if let Some(result) = result {
            self.set_expr_value(call, result);
        }
    }

    fn reachable_locations(
        &self,
        callee_exit: &Environment,
        frame_locals: &FnvHashSet<StorageLocation>,
    ) -> IndexSet<StorageLocation> {
        let mut worklist: Vec<StorageLocation> = Vec::new();
        worklist.extend(self.decl_to_loc.values().copied());
        worklist.extend(self.expr_to_loc.values().copied());
        worklist.extend(self.loc_to_val.keys().copied());
        worklist.extend(
            self.expr_to_val
                .values()
                .chain(self.loc_to_val.values())
                .filter_map(Value::as_pointer),
        );
        worklist.extend(callee_exit.return_value.as_ref().and_then(Value::as_pointer));

        let mut seen = IndexSet::new();
        while let Some(loc) = worklist.pop() {
            if frame_locals.contains(&loc) || !seen.insert(loc) {
                continue;
            }
            worklist.extend(self.children(loc));
            if let Some(Value::Pointer(target)) = callee_exit.loc_to_val.get(&loc) {
                worklist.push(*target);
            }
        }
        seen
    }
}

fn intersect<K, V>(lhs: &IndexMap<K, V>, rhs: &IndexMap<K, V>) -> IndexMap<K, V>
where
    K: Copy + Eq + Hash,
    V: Clone + PartialEq,
{
    lhs.iter()
        .filter(|&(key, value)| rhs.get(key) == Some(value))
        .map(|(key, value)| (*key, value.clone()))
        .collect()
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.decl_to_loc == other.decl_to_loc
            && self.expr_to_loc == other.expr_to_loc
            && self.expr_to_val == other.expr_to_val
            && self.loc_to_val == other.loc_to_val
            && self.flow_condition == other.flow_condition
            && self.return_value == other.return_value
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("decl_to_loc", &self.decl_to_loc)
            .field("expr_to_loc", &self.expr_to_loc)
            .field("expr_to_val", &self.expr_to_val)
            .field("loc_to_val", &self.loc_to_val)
            .field("flow_condition", &self.flow_condition.to_string())
            .field("return_value", &self.return_value)
            .finish()
    }
}

/// Correspondence between the unknowns of two states of one program point
#[derive(Default)]
struct Renaming(FnvHashMap<Value, Value>);

impl Renaming {
    /// Record `old ↦ new`, failing if `old` was already mapped elsewhere
    fn maps(&mut self, old: &Value, new: &Value) -> bool {
        self.0.entry(old.clone()).or_insert_with(|| new.clone()) == new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_with_vars() -> (Rc<TranslationUnit>, VarId, VarId) {
        let mut tu = TranslationUnit::new();
        let x = tu.declare_var("x", Type::Int, None);
        let b = tu.declare_var("b", Type::Bool, None);
        (Rc::new(tu), x, b)
    }

    #[test]
    fn test_stable_decl_location_shared_across_clones() {
        let (tu, x, _) = unit_with_vars();
        let env = Environment::new(tu);
        let other = env.clone();

        assert_eq!(env.stable_location_for_decl(x), other.stable_location_for_decl(x));
    }

    #[test]
    fn test_record_location_has_field_children() {
        let mut tu = TranslationUnit::new();
        let pair = Type::record("pair", vec![("a", Type::Int), ("b", Type::Bool)]);
        let p = tu.declare_var("p", pair, None);
        let mut env = Environment::new(Rc::new(tu));

        let loc = env.stable_location_for_decl(p);
        env.initialize_location(loc);

        let a = env.child_location(loc, "a").unwrap();
        let b = env.child_location(loc, "b").unwrap();
        assert!(matches!(env.value_at(a), Some(Value::Int(_))));
        assert!(matches!(env.value_at(b), Some(Value::Bool(_))));
        assert!(env.value_at(loc).is_none());
        assert!(env.well_formedness_violations().is_empty());
    }

    #[test]
    fn test_join_keeps_equal_and_widens_distinct_ints() {
        let (tu, x, _) = unit_with_vars();
        let mut base = Environment::new(tu);
        base.bind_decl_value(x, Value::known_int(1));

        let mut lhs = base.clone();
        let mut rhs = base.clone();
        assert_eq!(lhs.join(&rhs).decl_value(x), Some(&Value::known_int(1)));

        lhs.bind_decl_value(x, Value::known_int(1));
        rhs.bind_decl_value(x, Value::known_int(2));
        let joined = lhs.join(&rhs);
        assert!(matches!(joined.decl_value(x), Some(Value::Int(IntValue::Symbolic(_)))));
    }

    #[test]
    fn test_join_bools_tracks_each_side() {
        let (tu, _, b) = unit_with_vars();
        let base = Environment::new(tu);
        let guard = base.make_atom();

        let mut then_env = base.clone();
        then_env.add_to_flow_condition(&guard);
        then_env.bind_decl_value(b, Value::Bool(Formula::literal(true)));

        let mut else_env = base.clone();
        else_env.add_to_flow_condition(&guard.not());
        else_env.bind_decl_value(b, Value::Bool(Formula::literal(false)));

        let joined = then_env.join(&else_env);
        let joined_b = joined.decl_value(b).and_then(Value::as_bool).cloned().unwrap();

        // b is exactly the branch guard after the merge
        assert!(joined.proves(&joined_b.iff(&guard)));
        assert!(!joined.proves(&joined_b));
    }

    #[test]
    fn test_equivalence_ignores_identity_of_unknowns() {
        let (tu, x, _) = unit_with_vars();
        let mut lhs = Environment::new(tu);
        let mut rhs = lhs.clone();
        let (s1, s2) = (lhs.fresh_int(), rhs.fresh_int());
        lhs.bind_decl_value(x, Value::Int(s1));
        rhs.bind_decl_value(x, Value::Int(s2));

        assert_ne!(lhs, rhs);
        assert!(lhs.equivalent_to(&rhs));

        rhs.bind_decl_value(x, Value::known_int(5));
        assert!(!lhs.equivalent_to(&rhs));
    }

    #[test]
    fn test_equivalence_requires_preserved_equalities() {
        let mut tu = TranslationUnit::new();
        let x = tu.declare_var("x", Type::Int, None);
        let n = tu.declare_var("n", Type::Int, None);
        let mut old = Environment::new(Rc::new(tu));
        let shared = Value::Int(old.fresh_int());
        old.bind_decl_value(x, shared.clone());
        old.bind_decl_value(n, shared.clone());

        // x widened away from n
        let mut new = old.clone();
        let widened = Value::Int(new.fresh_int());
        new.bind_decl_value(x, widened);
        assert!(!old.equivalent_to(&new));

        // both renamed together
        let renamed = Value::Int(new.fresh_int());
        new.bind_decl_value(x, renamed.clone());
        new.bind_decl_value(n, renamed);
        assert!(old.equivalent_to(&new));
    }

    #[test]
    fn test_equivalence_requires_decided_booleans_to_stay_decided() {
        let (tu, _, b) = unit_with_vars();
        let mut old = Environment::new(tu);
        let guard = old.make_atom();
        old.add_to_flow_condition(&guard);
        old.bind_decl_value(b, Value::Bool(guard.clone()));

        let mut new = Environment {
            flow_condition: Formula::literal(true),
            ..old.clone()
        };
        let other = new.make_atom();
        new.bind_decl_value(b, Value::Bool(other));

        assert!(!old.equivalent_to(&new));
        new.add_to_flow_condition(&guard);
        new.bind_decl_value(b, Value::Bool(guard));
        assert!(old.equivalent_to(&new));
    }

    #[test]
    fn test_fork_allocates_identically() {
        let (tu, x, _) = unit_with_vars();
        let env = Environment::new(tu);
        let mut first = env.fork();
        let mut second = env.fork();

        let v1 = first.create_value(&Type::Int).unwrap();
        let v2 = second.create_value(&Type::Int).unwrap();
        first.bind_decl_value(x, v1);
        second.bind_decl_value(x, v2);

        assert_eq!(first, second);
    }

    #[test]
    fn test_create_pointer_value_initializes_pointee() {
        let (tu, _, _) = unit_with_vars();
        let mut env = Environment::new(tu);
        let value = env.create_value(&Type::pointer_to(Type::Int)).unwrap();
        let pointee = value.as_pointer().unwrap();

        assert!(env.is_synthetic(pointee));
        assert!(matches!(env.value_at(pointee), Some(Value::Int(_))));
    }

    #[test]
    fn test_flow_condition_queries() {
        let (tu, _, _) = unit_with_vars();
        let mut env = Environment::new(tu);
        let a = env.make_atom();
        let b = env.make_atom();
        env.add_to_flow_condition(&a);

        assert!(env.proves(&a));
        assert!(env.proves(&a.or(&b)));
        assert!(!env.proves(&b));
        assert!(env.allows(&b));
        assert!(!env.allows(&a.not()));
    }
}
