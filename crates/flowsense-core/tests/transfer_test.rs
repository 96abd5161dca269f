//! Tests for the statement-level transfer function
//!
//! Most tests drive [`transfer`] directly over hand-ordered statements; the
//! short-circuit tests go through the solver so operand states come from
//! real basic blocks.

use flowsense_core::dataflow::{Cfg, CfgBuilder, FixpointSolver, IntValue};
use flowsense_core::prelude::*;
use proptest::prelude::*;
use std::collections::HashMap;
use std::rc::Rc;

/// Transfer each statement in order, unwrapping parens first
fn run(env: &mut Environment, stmts: &[NodeId]) {
    let options = TransferOptions::default();
    for &stmt in stmts {
        let stmt = env.translation_unit().skip_wrappers(stmt);
        transfer(&NoBlockStates, stmt, env, &options);
    }
}

/// The elements of every block, in block order, for replaying a function
/// without the solver.
fn elements(cfg: &Cfg) -> Vec<NodeId> {
    cfg.reverse_postorder()
        .into_iter()
        .filter_map(|id| cfg.block(id))
        .flat_map(|block| block.elements.clone())
        .collect()
}

// ============================================================================
// Short-circuit operators
// ============================================================================

/// `bool f(bool b) { return <lhs> <op> b; }`
fn short_circuit(lhs: bool, and: bool) -> (Rc<TranslationUnit>, FuncId, NodeId) {
    let mut tu = TranslationUnit::new();
    let f = tu.declare_function("f", vec![("b", Type::Bool)], Type::Bool);
    let lit = tu.bool_lit(lhs);
    let read_b = tu.read(tu.param(f, 0));
    let op = if and { tu.and(lit, read_b) } else { tu.or(lit, read_b) };
    let ret = tu.return_stmt(Some(op));
    let body = tu.compound(vec![ret]);
    tu.define_function(f, body);
    (Rc::new(tu), f, op)
}

#[test]
fn test_false_and_anything_is_false() {
    let (tu, f, _) = short_circuit(false, true);

    let analysis = DataflowAnalyzer::default().analyze_function(&tu, f).unwrap();
    let exit = analysis.exit_environment().unwrap();

    let Some(Value::Bool(result)) = exit.return_value() else {
        panic!("expected a boolean return value");
    };
    assert!(exit.proves(&result.not()));
}

#[test]
fn test_true_or_anything_is_true() {
    let (tu, f, _) = short_circuit(true, false);

    let analysis = DataflowAnalyzer::default().analyze_function(&tu, f).unwrap();
    let exit = analysis.exit_environment().unwrap();

    let Some(Value::Bool(result)) = exit.return_value() else {
        panic!("expected a boolean return value");
    };
    assert!(exit.proves(result));
}

#[test]
fn test_true_and_b_follows_b() {
    let (tu, f, op) = short_circuit(true, true);
    let b = tu.param(f, 0);

    let analysis = DataflowAnalyzer::default().analyze_function(&tu, f).unwrap();
    let after = analysis.environment_after(op).unwrap();

    let Some(Value::Bool(result)) = after.expr_value(op) else {
        panic!("expected a boolean value for `true && b`");
    };
    let Some(Value::Bool(b_value)) = after.decl_value(b).cloned() else {
        panic!("expected `b` to hold a boolean");
    };
    assert!(after.proves(&result.iff(&b_value)));
}

#[test]
fn test_unvisited_rhs_is_unconstrained() {
    let mut tu = TranslationUnit::new();
    let a = tu.declare_var("a", Type::Bool, None);
    let b = tu.declare_var("b", Type::Bool, None);
    let read_a = tu.read(a);
    let read_b = tu.read(b);
    let and = tu.and(read_a, read_b);
    let tu = Rc::new(tu);
    let env = Environment::new(Rc::clone(&tu));

    let lhs = env.make_atom();
    let mut lhs_env = env.clone();
    lhs_env.set_expr_value(read_a, Value::Bool(lhs.clone()));
    let mut locator = HashMap::new();
    locator.insert(read_a, lhs_env);

    let mut current = env.clone();
    transfer(&locator, and, &mut current, &TransferOptions::default());

    let Some(Value::Bool(result)) = current.expr_value(and) else {
        panic!("expected a boolean value");
    };
    assert_ne!(result, lhs);
    assert!(current.allows(&result));
    assert!(current.allows(&result.not()));
    // `a && b` still implies `a`
    assert!(current.proves(&result.implies(&lhs)));
}

// ============================================================================
// Assignment and declarations
// ============================================================================

#[test]
fn test_assignment_target_and_value_agree() {
    let mut tu = TranslationUnit::new();
    let x = tu.declare_var("x", Type::Int, None);
    let y = tu.declare_var("y", Type::Int, None);
    let ref_x = tu.decl_ref(x);
    let read_y = tu.read(y);
    let assign = tu.assign(ref_x, read_y);
    let tu = Rc::new(tu);
    let mut env = Environment::new(Rc::clone(&tu));
    let unknown = env.create_value(&Type::Int).unwrap();
    env.bind_decl_value(y, unknown.clone());

    run(&mut env, &[ref_x, read_y, assign]);

    assert_eq!(env.decl_value(x), Some(&unknown));
    assert_eq!(env.expr_location(assign), env.decl_location(x));
    assert_eq!(env.expr_value(assign), Some(unknown));
}

#[test]
fn test_declaration_sees_through_parens() {
    let mut tu = TranslationUnit::new();
    let eight = tu.int_lit(8);
    let paren = tu.paren(eight);
    let wrapped = tu.cleanups(paren);
    let (x, decl) = tu.local("x", Type::Int, Some(wrapped));
    let tu = Rc::new(tu);
    let mut env = Environment::new(Rc::clone(&tu));

    run(&mut env, &[eight, decl]);

    assert_eq!(env.decl_value(x), Some(&Value::known_int(8)));
}

#[test]
fn test_record_copy_on_declaration() {
    let mut tu = TranslationUnit::new();
    let point = Type::record("point", vec![("x", Type::Int), ("y", Type::Int)]);
    let (a, decl_a) = tu.local("a", point.clone(), None);
    let ref_a = tu.decl_ref(a);
    let a_x = tu.member(ref_a, "x", false);
    let one = tu.int_lit(1);
    let store = tu.assign(a_x, one);
    let ref_a2 = tu.decl_ref(a);
    let copy = tu.rvalue(ref_a2);
    let (b, decl_b) = tu.local("b", point, Some(copy));
    let tu = Rc::new(tu);
    let mut env = Environment::new(Rc::clone(&tu));

    run(&mut env, &[decl_a, ref_a, a_x, one, store, ref_a2, copy, decl_b]);

    let a_loc = env.decl_location(a).unwrap();
    let b_loc = env.decl_location(b).unwrap();
    assert_ne!(a_loc, b_loc);
    let b_x = env.child_location(b_loc, "x").unwrap();
    assert_eq!(env.value_at(b_x), Some(&Value::known_int(1)));
    assert!(env.well_formedness_violations().is_empty());
}

// ============================================================================
// Defaults and preconditions
// ============================================================================

#[test]
fn test_unmodeled_statement_leaves_environment_unchanged() {
    let mut tu = TranslationUnit::new();
    let x = tu.declare_var("x", Type::Int, None);
    let asm = tu.inline_asm("mfence");
    let tu = Rc::new(tu);
    let mut env = Environment::new(Rc::clone(&tu));
    env.bind_decl_value(x, Value::known_int(1));
    let before = env.clone();

    run(&mut env, &[asm]);

    assert_eq!(env, before);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "wrapper")]
fn test_wrapper_statement_is_rejected() {
    let mut tu = TranslationUnit::new();
    let one = tu.int_lit(1);
    let paren = tu.paren(one);
    let tu = Rc::new(tu);
    let mut env = Environment::new(tu);

    transfer(&NoBlockStates, paren, &mut env, &TransferOptions::default());
}

// ============================================================================
// Determinism
// ============================================================================

/// `int f(int n) { int acc = n; acc = acc <op> k; ... return acc; }`
fn accumulator(steps: &[(u8, i64)]) -> (Rc<TranslationUnit>, FuncId, VarId) {
    let mut tu = TranslationUnit::new();
    let f = tu.declare_function("f", vec![("n", Type::Int)], Type::Int);
    let read_n = tu.read(tu.param(f, 0));
    let (acc, decl) = tu.local("acc", Type::Int, Some(read_n));
    let mut stmts = vec![decl];
    for &(op, k) in steps {
        let op = match op % 3 {
            0 => BinOp::Add,
            1 => BinOp::Sub,
            _ => BinOp::Mul,
        };
        let target = tu.decl_ref(acc);
        let read_acc = tu.read(acc);
        let lit = tu.int_lit(k);
        let value = tu.binary(op, read_acc, lit);
        stmts.push(tu.assign(target, value));
    }
    let read_acc = tu.read(acc);
    stmts.push(tu.return_stmt(Some(read_acc)));
    let body = tu.compound(stmts);
    tu.define_function(f, body);
    (Rc::new(tu), f, acc)
}

proptest! {
    #[test]
    fn prop_forked_environments_transfer_identically(
        steps in prop::collection::vec((0u8..3, -50i64..50), 0..8),
        start in prop::option::of(-100i64..100),
    ) {
        let (tu, f, acc) = accumulator(&steps);
        let analyzer = DataflowAnalyzer::default();
        let mut entry = analyzer.entry_environment(&tu, f);
        if let Some(start) = start {
            entry.bind_decl_value(tu.param(f, 0), Value::known_int(start));
        }
        let cfg = CfgBuilder::new(&tu).build_function(f);
        let stmts = elements(&cfg);

        let mut first = entry.fork();
        let mut second = entry.fork();
        run(&mut first, &stmts);
        run(&mut second, &stmts);

        prop_assert_eq!(&first, &second);
        prop_assert!(first.well_formedness_violations().is_empty());

        let expected = start.map(|start| {
            steps.iter().fold(start, |acc, &(op, k)| match op % 3 {
                0 => acc + k,
                1 => acc - k,
                _ => acc * k,
            })
        });
        match expected {
            Some(n) => prop_assert_eq!(first.decl_value(acc).cloned(), Some(Value::known_int(n))),
            None => prop_assert!(matches!(first.decl_value(acc), Some(Value::Int(IntValue::Symbolic(_))))),
        }
    }

    #[test]
    fn prop_solver_is_deterministic(steps in prop::collection::vec((0u8..3, -50i64..50), 0..8)) {
        let (tu, f, _) = accumulator(&steps);
        let analyzer = DataflowAnalyzer::default();
        let entry = analyzer.entry_environment(&tu, f);
        let cfg = CfgBuilder::new(&tu).build_function(f);

        let first = FixpointSolver::solve(&cfg, entry.fork(), &TransferOptions::default());
        let second = FixpointSolver::solve(&cfg, entry.fork(), &TransferOptions::default());

        prop_assert_eq!(first.exit_state(), second.exit_state());
        prop_assert_eq!(first.iterations, second.iterations);
    }
}
