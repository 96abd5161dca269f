//! Node constructors
//!
//! Each constructor computes the node's static type and value category the
//! way a C front end would, inserting nothing implicitly: callers that want a
//! load from a variable use [`TranslationUnit::read`] (or wrap an lvalue in
//! [`TranslationUnit::rvalue`]) explicitly.

use super::{
    BinOp, CastKind, FuncId, FunctionDecl, Node, NodeId, StmtKind, TranslationUnit, Type, UnaryOp,
    ValueCategory, VarDecl, VarId,
};

impl TranslationUnit {
    fn push(&mut self, kind: StmtKind, ty: Type, category: ValueCategory) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, ty, category });
        id
    }

    fn push_stmt(&mut self, kind: StmtKind) -> NodeId {
        self.push(kind, Type::Void, ValueCategory::RValue)
    }

    fn ty_of(&self, id: NodeId) -> Type {
        self.get(id).map(|node| node.ty.clone()).unwrap_or(Type::Void)
    }

    fn category_of(&self, id: NodeId) -> ValueCategory {
        self.get(id)
            .map(|node| node.category)
            .unwrap_or(ValueCategory::RValue)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    pub fn declare_var(&mut self, name: &str, ty: Type, init: Option<NodeId>) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarDecl {
            name: name.to_string(),
            ty,
            init,
        });
        id
    }

    /// Declare a function prototype; attach a body with [`Self::define_function`]
    pub fn declare_function(&mut self, name: &str, params: Vec<(&str, Type)>, return_type: Type) -> FuncId {
        let params = params
            .into_iter()
            .map(|(param, ty)| self.declare_var(param, ty, None))
            .collect();
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(FunctionDecl {
            name: name.to_string(),
            params,
            return_type,
            body: None,
        });
        self.function_names.insert(name.to_string(), id);
        id
    }

    pub fn define_function(&mut self, func: FuncId, body: NodeId) {
        if let Some(decl) = self.functions.get_mut(func.0 as usize) {
            decl.body = Some(body);
        }
    }

    /// The `index`-th parameter of `func`
    ///
    /// # Panics
    ///
    /// Panics if `func` has fewer than `index + 1` parameters.
    pub fn param(&self, func: FuncId, index: usize) -> VarId {
        self.function(func).params[index]
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn int_lit(&mut self, value: i64) -> NodeId {
        self.push(StmtKind::IntLiteral(value), Type::Int, ValueCategory::RValue)
    }

    pub fn bool_lit(&mut self, value: bool) -> NodeId {
        self.push(StmtKind::BoolLiteral(value), Type::Bool, ValueCategory::RValue)
    }

    pub fn null_ptr(&mut self, pointee: Type) -> NodeId {
        self.push(StmtKind::NullPtr, Type::pointer_to(pointee), ValueCategory::RValue)
    }

    pub fn decl_ref(&mut self, var: VarId) -> NodeId {
        let ty = self.var(var).ty.clone();
        self.push(StmtKind::DeclRef(var), ty, ValueCategory::LValue)
    }

    pub fn cast(&mut self, kind: CastKind, sub: NodeId) -> NodeId {
        let ty = match kind {
            CastKind::IntegralToBoolean => Type::Bool,
            CastKind::LValueToRValue | CastKind::NoOp => self.ty_of(sub),
        };
        let category = match kind {
            CastKind::NoOp => self.category_of(sub),
            _ => ValueCategory::RValue,
        };
        self.push(StmtKind::ImplicitCast { kind, sub }, ty, category)
    }

    pub fn rvalue(&mut self, lvalue: NodeId) -> NodeId {
        self.cast(CastKind::LValueToRValue, lvalue)
    }

    /// Load the current value of a variable
    pub fn read(&mut self, var: VarId) -> NodeId {
        let lvalue = self.decl_ref(var);
        self.rvalue(lvalue)
    }

    pub fn to_bool(&mut self, sub: NodeId) -> NodeId {
        self.cast(CastKind::IntegralToBoolean, sub)
    }

    pub fn paren(&mut self, sub: NodeId) -> NodeId {
        let (ty, category) = (self.ty_of(sub), self.category_of(sub));
        self.push(StmtKind::Paren(sub), ty, category)
    }

    pub fn cleanups(&mut self, sub: NodeId) -> NodeId {
        let (ty, category) = (self.ty_of(sub), self.category_of(sub));
        self.push(StmtKind::ExprWithCleanups(sub), ty, category)
    }

    pub fn binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let (ty, category) = match op {
            BinOp::Assign => (self.ty_of(lhs), ValueCategory::LValue),
            BinOp::Comma => (self.ty_of(rhs), self.category_of(rhs)),
            op if op.is_arithmetic() => (Type::Int, ValueCategory::RValue),
            _ => (Type::Bool, ValueCategory::RValue),
        };
        self.push(StmtKind::Binary { op, lhs, rhs }, ty, category)
    }

    pub fn assign(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinOp::Assign, lhs, rhs)
    }

    pub fn and(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinOp::LAnd, lhs, rhs)
    }

    pub fn or(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(BinOp::LOr, lhs, rhs)
    }

    pub fn unary(&mut self, op: UnaryOp, sub: NodeId) -> NodeId {
        let sub_ty = self.ty_of(sub);
        let (ty, category) = match op {
            UnaryOp::LNot => (Type::Bool, ValueCategory::RValue),
            UnaryOp::Minus => (Type::Int, ValueCategory::RValue),
            UnaryOp::Deref => (
                sub_ty.pointee().cloned().unwrap_or(Type::Void),
                ValueCategory::LValue,
            ),
            UnaryOp::AddrOf => (Type::pointer_to(sub_ty), ValueCategory::RValue),
            UnaryOp::PreInc | UnaryOp::PreDec => (sub_ty, ValueCategory::LValue),
            UnaryOp::PostInc | UnaryOp::PostDec => (sub_ty, ValueCategory::RValue),
        };
        self.push(StmtKind::Unary { op, sub }, ty, category)
    }

    pub fn not(&mut self, sub: NodeId) -> NodeId {
        self.unary(UnaryOp::LNot, sub)
    }

    pub fn deref(&mut self, sub: NodeId) -> NodeId {
        self.unary(UnaryOp::Deref, sub)
    }

    pub fn addr_of(&mut self, sub: NodeId) -> NodeId {
        self.unary(UnaryOp::AddrOf, sub)
    }

    /// `base.field`, or `base->field` when `arrow` is set
    pub fn member(&mut self, base: NodeId, field: &str, arrow: bool) -> NodeId {
        let base_ty = self.ty_of(base);
        let record_ty = if arrow {
            base_ty.pointee().cloned().unwrap_or(Type::Void)
        } else {
            base_ty
        };
        let ty = record_ty.field(field).cloned().unwrap_or(Type::Void);
        self.push(
            StmtKind::Member {
                base,
                field: field.to_string(),
                arrow,
            },
            ty,
            ValueCategory::LValue,
        )
    }

    pub fn call(&mut self, callee: FuncId, args: Vec<NodeId>) -> NodeId {
        let ty = self
            .get_function(callee)
            .map(|decl| decl.return_type.clone())
            .unwrap_or(Type::Void);
        self.push(StmtKind::Call { callee, args }, ty, ValueCategory::RValue)
    }

    pub fn conditional(&mut self, cond: NodeId, then_expr: NodeId, else_expr: NodeId) -> NodeId {
        let ty = self.ty_of(then_expr);
        self.push(
            StmtKind::Conditional {
                cond,
                then_expr,
                else_expr,
            },
            ty,
            ValueCategory::RValue,
        )
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub fn compound(&mut self, stmts: Vec<NodeId>) -> NodeId {
        self.push_stmt(StmtKind::Compound(stmts))
    }

    pub fn decl_stmt(&mut self, vars: Vec<VarId>) -> NodeId {
        self.push_stmt(StmtKind::Decl(vars))
    }

    /// Declare a single variable and return `(var, decl statement)`
    pub fn local(&mut self, name: &str, ty: Type, init: Option<NodeId>) -> (VarId, NodeId) {
        let var = self.declare_var(name, ty, init);
        (var, self.decl_stmt(vec![var]))
    }

    pub fn if_stmt(&mut self, cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId>) -> NodeId {
        self.push_stmt(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn while_stmt(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        self.push_stmt(StmtKind::While { cond, body })
    }

    pub fn return_stmt(&mut self, value: Option<NodeId>) -> NodeId {
        self.push_stmt(StmtKind::Return(value))
    }

    pub fn break_stmt(&mut self) -> NodeId {
        self.push_stmt(StmtKind::Break)
    }

    pub fn continue_stmt(&mut self) -> NodeId {
        self.push_stmt(StmtKind::Continue)
    }

    pub fn inline_asm(&mut self, text: &str) -> NodeId {
        self.push_stmt(StmtKind::InlineAsm(text.to_string()))
    }
}
