//! Boolean formulas over symbolic atoms
//!
//! Boolean values and flow conditions are formulas. The smart constructors
//! fold constants and trivial complements so that facts like
//! `false && anything` collapse to a literal without consulting the solver.
//!
//! The solver decides satisfiability by enumerating assignments of the atoms
//! that occur in a query. Queries mentioning more atoms than the configured
//! budget answer [`Satisfiability::Unknown`], which callers treat as "cannot
//! prove anything".

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// A symbolic boolean variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Formula {
    Literal(bool),
    Atom(Atom),
    Not(Rc<Formula>),
    And(Rc<Formula>, Rc<Formula>),
    Or(Rc<Formula>, Rc<Formula>),
    Iff(Rc<Formula>, Rc<Formula>),
}

impl Formula {
    pub fn literal(value: bool) -> Formula {
        Formula::Literal(value)
    }

    pub fn atom(atom: Atom) -> Formula {
        Formula::Atom(atom)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Formula::Literal(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Formula::Literal(false))
    }

    fn is_complement_of(&self, other: &Formula) -> bool {
        match (self, other) {
            (Formula::Not(inner), other) | (other, Formula::Not(inner)) => inner.as_ref() == other,
            (Formula::Literal(a), Formula::Literal(b)) => a != b,
            _ => false,
        }
    }

    pub fn not(&self) -> Formula {
        match self {
            Formula::Literal(value) => Formula::Literal(!value),
            Formula::Not(inner) => inner.as_ref().clone(),
            other => Formula::Not(Rc::new(other.clone())),
        }
    }

    pub fn and(&self, other: &Formula) -> Formula {
        match (self, other) {
            (Formula::Literal(false), _) | (_, Formula::Literal(false)) => Formula::Literal(false),
            (Formula::Literal(true), f) | (f, Formula::Literal(true)) => f.clone(),
            (a, b) if a == b => a.clone(),
            (a, b) if a.is_complement_of(b) => Formula::Literal(false),
            (a, b) => Formula::And(Rc::new(a.clone()), Rc::new(b.clone())),
        }
    }

    pub fn or(&self, other: &Formula) -> Formula {
        match (self, other) {
            (Formula::Literal(true), _) | (_, Formula::Literal(true)) => Formula::Literal(true),
            (Formula::Literal(false), f) | (f, Formula::Literal(false)) => f.clone(),
            (a, b) if a == b => a.clone(),
            (a, b) if a.is_complement_of(b) => Formula::Literal(true),
            (a, b) => Formula::Or(Rc::new(a.clone()), Rc::new(b.clone())),
        }
    }

    pub fn iff(&self, other: &Formula) -> Formula {
        match (self, other) {
            (Formula::Literal(true), f) | (f, Formula::Literal(true)) => f.clone(),
            (Formula::Literal(false), f) | (f, Formula::Literal(false)) => f.not(),
            (a, b) if a == b => Formula::Literal(true),
            (a, b) if a.is_complement_of(b) => Formula::Literal(false),
            (a, b) => Formula::Iff(Rc::new(a.clone()), Rc::new(b.clone())),
        }
    }

    pub fn implies(&self, other: &Formula) -> Formula {
        self.not().or(other)
    }

    /// Conjunction of all formulas, `true` when empty
    pub fn all<'a>(formulas: impl IntoIterator<Item = &'a Formula>) -> Formula {
        formulas
            .into_iter()
            .fold(Formula::Literal(true), |acc, f| acc.and(f))
    }

    /// Top-level conjuncts, `self` alone when it is not a conjunction
    pub fn conjuncts(&self) -> Vec<Formula> {
        let mut parts = Vec::new();
        let mut pending = vec![self];
        while let Some(formula) = pending.pop() {
            match formula {
                Formula::And(a, b) => {
                    pending.push(b);
                    pending.push(a);
                }
                Formula::Literal(true) => {}
                other => parts.push(other.clone()),
            }
        }
        parts
    }

    /// `self ∨ other`, with the conjuncts both sides share pulled out front
    pub fn disjoin_factored(&self, other: &Formula) -> Formula {
        let lhs = self.conjuncts();
        let rhs = other.conjuncts();
        let (common, lhs_rest): (Vec<&Formula>, Vec<&Formula>) = lhs.iter().partition(|part| rhs.contains(part));
        let rhs_rest = rhs.iter().filter(|part| !common.contains(part));

        Formula::all(common.iter().copied()).and(&Formula::all(lhs_rest).or(&Formula::all(rhs_rest)))
    }

    pub fn collect_atoms(&self, atoms: &mut BTreeSet<Atom>) {
        match self {
            Formula::Literal(_) => {}
            Formula::Atom(atom) => {
                atoms.insert(*atom);
            }
            Formula::Not(inner) => inner.collect_atoms(atoms),
            Formula::And(a, b) | Formula::Or(a, b) | Formula::Iff(a, b) => {
                a.collect_atoms(atoms);
                b.collect_atoms(atoms);
            }
        }
    }

    pub fn evaluate(&self, assignment: &dyn Fn(Atom) -> bool) -> bool {
        match self {
            Formula::Literal(value) => *value,
            Formula::Atom(atom) => assignment(*atom),
            Formula::Not(inner) => !inner.evaluate(assignment),
            Formula::And(a, b) => a.evaluate(assignment) && b.evaluate(assignment),
            Formula::Or(a, b) => a.evaluate(assignment) || b.evaluate(assignment),
            Formula::Iff(a, b) => a.evaluate(assignment) == b.evaluate(assignment),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Literal(value) => write!(f, "{value}"),
            Formula::Atom(atom) => write!(f, "a{}", atom.0),
            Formula::Not(inner) => write!(f, "!{inner}"),
            Formula::And(a, b) => write!(f, "({a} & {b})"),
            Formula::Or(a, b) => write!(f, "({a} | {b})"),
            Formula::Iff(a, b) => write!(f, "({a} <=> {b})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfiability {
    Satisfiable,
    Unsatisfiable,
    /// Too many atoms to enumerate within the budget
    Unknown,
}

/// Exhaustive-enumeration decision procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solver {
    max_atoms: usize,
}

/// Hard ceiling on the enumeration width regardless of configuration
const ABSOLUTE_MAX_ATOMS: usize = 20;

impl Solver {
    pub fn new(max_atoms: usize) -> Self {
        Self {
            max_atoms: max_atoms.min(ABSOLUTE_MAX_ATOMS),
        }
    }

    pub fn check(&self, constraints: &[&Formula]) -> Satisfiability {
        let conjunction = Formula::all(constraints.iter().copied());
        match conjunction {
            Formula::Literal(true) => return Satisfiability::Satisfiable,
            Formula::Literal(false) => return Satisfiability::Unsatisfiable,
            _ => {}
        }

        let mut atoms = BTreeSet::new();
        conjunction.collect_atoms(&mut atoms);
        if atoms.len() > self.max_atoms {
            return Satisfiability::Unknown;
        }

        let atoms: Vec<Atom> = atoms.into_iter().collect();
        let position = |atom: Atom| atoms.binary_search(&atom).ok();
        for mask in 0u64..(1u64 << atoms.len()) {
            let assignment = |atom: Atom| position(atom).is_some_and(|bit| mask & (1 << bit) != 0);
            if conjunction.evaluate(&assignment) {
                return Satisfiability::Satisfiable;
            }
        }
        Satisfiability::Unsatisfiable
    }

    /// Whether `assumptions` entail `goal`; `false` when undecided
    pub fn proves(&self, assumptions: &Formula, goal: &Formula) -> bool {
        self.check(&[assumptions, &goal.not()]) == Satisfiability::Unsatisfiable
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(12)
    }
}
