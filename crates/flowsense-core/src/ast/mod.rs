//! C-like abstract syntax tree consumed by the dataflow engine
//!
//! Nodes are stored contiguously in a [`TranslationUnit`] and referenced by
//! [`NodeId`]. As in C, expressions are statements, so a single [`StmtKind`]
//! covers both. Variable and function declarations live in side tables
//! addressed by [`VarId`] and [`FuncId`].

mod builder;

use indexmap::IndexMap;
use std::fmt;

/// Index of a statement or expression node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Index of a variable (or parameter) declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Index of a function declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

/// Static type of a declaration or expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int,
    Pointer(Box<Type>),
    Record(RecordType),
}

/// A struct type with named fields, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

impl Type {
    pub fn pointer_to(pointee: Type) -> Type {
        Type::Pointer(Box::new(pointee))
    }

    pub fn record(name: &str, fields: Vec<(&str, Type)>) -> Type {
        Type::Record(RecordType {
            name: name.to_string(),
            fields: fields
                .into_iter()
                .map(|(field, ty)| (field.to_string(), ty))
                .collect(),
        })
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Type::Record(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Pointee type for pointers, `None` otherwise
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Type of a named field for records, `None` otherwise
    pub fn field(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Record(record) => record
                .fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, ty)| ty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LAnd,
    LOr,
    Comma,
}

impl BinOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::LAnd | BinOp::LOr)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation (`!e`)
    LNot,
    /// Integer negation (`-e`)
    Minus,
    Deref,
    AddrOf,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    /// Load of the value stored at a glvalue's location
    LValueToRValue,
    IntegralToBoolean,
    NoOp,
}

/// Whether an expression designates a storage location or a plain value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    LValue,
    RValue,
}

/// Syntactic form of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Compound(Vec<NodeId>),
    Decl(Vec<VarId>),
    If {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    Return(Option<NodeId>),
    Break,
    Continue,
    /// Opaque assembly text, never modeled
    InlineAsm(String),
    IntLiteral(i64),
    BoolLiteral(bool),
    NullPtr,
    DeclRef(VarId),
    ImplicitCast {
        kind: CastKind,
        sub: NodeId,
    },
    Paren(NodeId),
    /// Full-expression wrapper introducing a temporary cleanup scope
    ExprWithCleanups(NodeId),
    Binary {
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnaryOp,
        sub: NodeId,
    },
    Member {
        base: NodeId,
        field: String,
        /// `base->field` rather than `base.field`
        arrow: bool,
    },
    Call {
        callee: FuncId,
        args: Vec<NodeId>,
    },
    Conditional {
        cond: NodeId,
        then_expr: NodeId,
        else_expr: NodeId,
    },
}

impl StmtKind {
    /// Pass-through wrappers carrying no semantics beyond their child
    pub fn is_wrapper(&self) -> bool {
        matches!(self, StmtKind::Paren(_) | StmtKind::ExprWithCleanups(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: StmtKind,
    pub ty: Type,
    pub category: ValueCategory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<VarId>,
    pub return_type: Type,
    /// `None` when only a prototype is visible in this translation unit
    pub body: Option<NodeId>,
}

/// Owner of every node and declaration of one program
#[derive(Debug, Default, Clone)]
pub struct TranslationUnit {
    nodes: Vec<Node>,
    vars: Vec<VarDecl>,
    functions: Vec<FunctionDecl>,
    function_names: IndexMap<String, FuncId>,
}

impl TranslationUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    /// Node lookup for ids produced by this unit.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not allocated by this translation unit.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.0 as usize]
    }

    pub fn function(&self, id: FuncId) -> &FunctionDecl {
        &self.functions[id.0 as usize]
    }

    pub fn get_function(&self, id: FuncId) -> Option<&FunctionDecl> {
        self.functions.get(id.0 as usize)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.function_names.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &FunctionDecl)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(index, decl)| (FuncId(index as u32), decl))
    }

    /// Strip any stack of `Paren` / `ExprWithCleanups` wrappers
    pub fn skip_wrappers(&self, mut id: NodeId) -> NodeId {
        while let Some(node) = self.get(id) {
            match node.kind {
                StmtKind::Paren(inner) | StmtKind::ExprWithCleanups(inner) => id = inner,
                _ => break,
            }
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_wrappers_nested() {
        let mut tu = TranslationUnit::new();
        let lit = tu.int_lit(7);
        let paren = tu.paren(lit);
        let wrapped = tu.cleanups(paren);

        assert_eq!(tu.skip_wrappers(wrapped), lit);
        assert_eq!(tu.skip_wrappers(lit), lit);
    }

    #[test]
    fn test_record_field_lookup() {
        let point = Type::record("point", vec![("x", Type::Int), ("valid", Type::Bool)]);

        assert_eq!(point.field("x"), Some(&Type::Int));
        assert_eq!(point.field("valid"), Some(&Type::Bool));
        assert_eq!(point.field("z"), None);
        assert_eq!(Type::Int.field("x"), None);
    }

    #[test]
    fn test_function_lookup_by_name() {
        let mut tu = TranslationUnit::new();
        let inc = tu.declare_function("inc", vec![("p", Type::Int)], Type::Int);

        assert_eq!(tu.function_by_name("inc"), Some(inc));
        assert_eq!(tu.function_by_name("dec"), None);
        assert_eq!(tu.function(inc).params.len(), 1);
    }
}
