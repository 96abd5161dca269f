//! Control Flow Graph construction from the AST
//!
//! Blocks hold their elements in evaluation order: every subexpression is an
//! element of its own, listed before the expression that consumes it, so the
//! transfer function always finds operand state already computed. `&&`, `||`
//! and `?:` split their enclosing block; the operator element itself lands in
//! the block where the arms rejoin. Paren and cleanup wrappers are never
//! elements.

use crate::ast::{BinOp, FuncId, NodeId, StmtKind, TranslationUnit};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Unique identifier for a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// How a basic block terminates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump to another block
    Goto(BlockId),
    /// Two-way branch on an already evaluated boolean element
    Branch {
        condition: NodeId,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Return from function
    Return(Option<NodeId>),
    /// Loop header test
    Loop {
        condition: NodeId,
        body_block: BlockId,
        exit_block: BlockId,
    },
    /// Unreachable (after break/continue outside a loop)
    Unreachable,
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto(target) => write!(f, "goto {target}"),
            Terminator::Branch {
                condition,
                then_block,
                else_block,
            } => write!(f, "branch {condition} ? {then_block} : {else_block}"),
            Terminator::Return(Some(value)) => write!(f, "return {value}"),
            Terminator::Return(None) => write!(f, "return"),
            Terminator::Loop {
                condition,
                body_block,
                exit_block,
            } => write!(f, "loop {condition} ? {body_block} : {exit_block}"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// A basic block in the CFG
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub elements: Vec<NodeId>,
    pub terminator: Option<Terminator>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            elements: Vec::new(),
            terminator: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }
}

/// Control Flow Graph of one function body
#[derive(Debug)]
pub struct Cfg {
    pub function: FuncId,
    pub blocks: HashMap<BlockId, BasicBlock>,
    pub entry: BlockId,
    pub exit: BlockId,
    stmt_to_block: IndexMap<NodeId, BlockId>,
    next_block_id: usize,
}

impl Cfg {
    pub fn new(function: FuncId) -> Self {
        let mut cfg = Self {
            function,
            blocks: HashMap::new(),
            entry: BlockId(0),
            exit: BlockId(0),
            stmt_to_block: IndexMap::new(),
            next_block_id: 0,
        };
        cfg.entry = cfg.new_block();
        cfg.exit = cfg.new_block();
        cfg
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, BasicBlock::new(id));
        id
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if let Some(block) = self.blocks.get_mut(&from) {
            if !block.successors.contains(&to) {
                block.successors.push(to);
            }
        }
        if let Some(block) = self.blocks.get_mut(&to) {
            if !block.predecessors.contains(&from) {
                block.predecessors.push(from);
            }
        }
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        if let Some(b) = self.blocks.get_mut(&block) {
            b.terminator = Some(terminator);
        }
    }

    pub fn add_element(&mut self, block: BlockId, element: NodeId) {
        if let Some(b) = self.blocks.get_mut(&block) {
            b.elements.push(element);
            self.stmt_to_block.insert(element, block);
        }
    }

    /// The block whose elements include `stmt`
    pub fn block_of(&self, stmt: NodeId) -> Option<BlockId> {
        self.stmt_to_block.get(&stmt).copied()
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    /// Branch condition assumed when control flows along `from -> to`:
    /// `(condition, true)` into the then/body side, `(condition, false)` into
    /// the else/exit side, `None` for unconditional edges.
    pub fn edge_guard(&self, from: BlockId, to: BlockId) -> Option<(NodeId, bool)> {
        let terminator = self.blocks.get(&from)?.terminator.as_ref()?;
        let (condition, taken, not_taken) = match *terminator {
            Terminator::Branch {
                condition,
                then_block,
                else_block,
            } => (condition, then_block, else_block),
            Terminator::Loop {
                condition,
                body_block,
                exit_block,
            } => (condition, body_block, exit_block),
            _ => return None,
        };
        if taken == not_taken {
            None
        } else if to == taken {
            Some((condition, true))
        } else if to == not_taken {
            Some((condition, false))
        } else {
            None
        }
    }

    /// Get blocks in reverse postorder (useful for forward dataflow)
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        self.dfs_postorder(self.entry, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    fn dfs_postorder(&self, block: BlockId, visited: &mut HashSet<BlockId>, postorder: &mut Vec<BlockId>) {
        if !visited.insert(block) {
            return;
        }
        if let Some(b) = self.blocks.get(&block) {
            for &succ in &b.successors {
                self.dfs_postorder(succ, visited, postorder);
            }
        }
        postorder.push(block);
    }
}

/// One line per block in id order: `B0 (entry): n0 n1 -> branch n1 ? B2 : B3`
impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&BlockId> = self.blocks.keys().collect();
        ids.sort();
        for (index, id) in ids.into_iter().enumerate() {
            let block = &self.blocks[id];
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{id}")?;
            if *id == self.entry {
                write!(f, " (entry)")?;
            } else if *id == self.exit {
                write!(f, " (exit)")?;
            }
            write!(f, ":")?;
            for element in &block.elements {
                write!(f, " {element}")?;
            }
            if let Some(terminator) = &block.terminator {
                write!(f, " -> {terminator}")?;
            }
        }
        Ok(())
    }
}

/// Builder for constructing a CFG from a function body
pub struct CfgBuilder<'tu> {
    tu: &'tu TranslationUnit,
    cfg: Cfg,
    current_block: BlockId,
    loop_stack: Vec<LoopContext>,
}

struct LoopContext {
    continue_block: BlockId,
    break_block: BlockId,
}

impl<'tu> CfgBuilder<'tu> {
    pub fn new(tu: &'tu TranslationUnit) -> Self {
        let cfg = Cfg::new(FuncId(0));
        let entry = cfg.entry;
        Self {
            tu,
            cfg,
            current_block: entry,
            loop_stack: Vec::new(),
        }
    }

    pub fn build_function(mut self, func: FuncId) -> Cfg {
        self.cfg.function = func;
        if let Some(body) = self.tu.get_function(func).and_then(|decl| decl.body) {
            self.build_stmt(body);
        }

        // Falling off the end returns nothing
        if self.is_open(self.current_block) {
            self.cfg.set_terminator(self.current_block, Terminator::Return(None));
            self.cfg.add_edge(self.current_block, self.cfg.exit);
        }
        self.cfg
    }

    fn is_open(&self, block: BlockId) -> bool {
        self.cfg.blocks.get(&block).is_some_and(|b| b.terminator.is_none())
    }

    fn goto(&mut self, target: BlockId) {
        if self.is_open(self.current_block) {
            self.cfg.set_terminator(self.current_block, Terminator::Goto(target));
            self.cfg.add_edge(self.current_block, target);
        }
    }

    fn branch(&mut self, condition: NodeId, then_block: BlockId, else_block: BlockId) {
        self.cfg.set_terminator(
            self.current_block,
            Terminator::Branch {
                condition,
                then_block,
                else_block,
            },
        );
        self.cfg.add_edge(self.current_block, then_block);
        self.cfg.add_edge(self.current_block, else_block);
    }

    fn build_stmt(&mut self, stmt: NodeId) {
        let tu = self.tu;
        let stmt = tu.skip_wrappers(stmt);
        let Some(node) = tu.get(stmt) else {
            return;
        };
        match &node.kind {
            StmtKind::Compound(stmts) => {
                for &child in stmts {
                    self.build_stmt(child);
                }
            }
            StmtKind::Decl(vars) => {
                for &var in vars {
                    if let Some(init) = tu.var(var).init {
                        self.build_expr(init);
                    }
                }
                self.cfg.add_element(self.current_block, stmt);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.build_if(*cond, *then_branch, *else_branch),
            StmtKind::While { cond, body } => self.build_while(*cond, *body),
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.build_expr(*value);
                }
                self.cfg.add_element(self.current_block, stmt);
                let value = value.map(|v| tu.skip_wrappers(v));
                self.cfg.set_terminator(self.current_block, Terminator::Return(value));
                self.cfg.add_edge(self.current_block, self.cfg.exit);
                // Anything after a return starts an unreachable block
                self.current_block = self.cfg.new_block();
            }
            StmtKind::Break => {
                if let Some(target) = self.loop_stack.last().map(|ctx| ctx.break_block) {
                    self.goto(target);
                } else {
                    self.cfg.set_terminator(self.current_block, Terminator::Unreachable);
                }
                self.current_block = self.cfg.new_block();
            }
            StmtKind::Continue => {
                if let Some(target) = self.loop_stack.last().map(|ctx| ctx.continue_block) {
                    self.goto(target);
                } else {
                    self.cfg.set_terminator(self.current_block, Terminator::Unreachable);
                }
                self.current_block = self.cfg.new_block();
            }
            StmtKind::InlineAsm(_) => self.cfg.add_element(self.current_block, stmt),
            _ => self.build_expr(stmt),
        }
    }

    fn build_expr(&mut self, expr: NodeId) {
        let tu = self.tu;
        let expr = tu.skip_wrappers(expr);
        let Some(node) = tu.get(expr) else {
            return;
        };
        match &node.kind {
            StmtKind::Binary { op, lhs, rhs } if op.is_logical() => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                self.build_expr(lhs);
                let rhs_block = self.cfg.new_block();
                let join_block = self.cfg.new_block();
                let condition = tu.skip_wrappers(lhs);
                // `a && b` only evaluates `b` when `a` holds; `a || b` when it does not
                match op {
                    BinOp::LAnd => self.branch(condition, rhs_block, join_block),
                    _ => self.branch(condition, join_block, rhs_block),
                }

                self.current_block = rhs_block;
                self.build_expr(rhs);
                self.goto(join_block);

                self.current_block = join_block;
            }
            StmtKind::Binary { lhs, rhs, .. } => {
                let (lhs, rhs) = (*lhs, *rhs);
                self.build_expr(lhs);
                self.build_expr(rhs);
            }
            StmtKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let (cond, then_expr, else_expr) = (*cond, *then_expr, *else_expr);
                self.build_expr(cond);
                let then_block = self.cfg.new_block();
                let else_block = self.cfg.new_block();
                let join_block = self.cfg.new_block();
                self.branch(tu.skip_wrappers(cond), then_block, else_block);

                self.current_block = then_block;
                self.build_expr(then_expr);
                self.goto(join_block);

                self.current_block = else_block;
                self.build_expr(else_expr);
                self.goto(join_block);

                self.current_block = join_block;
            }
            StmtKind::Unary { sub, .. } | StmtKind::ImplicitCast { sub, .. } => self.build_expr(*sub),
            StmtKind::Member { base, .. } => self.build_expr(*base),
            StmtKind::Call { args, .. } => {
                for &arg in args {
                    self.build_expr(arg);
                }
            }
            _ => {}
        }
        self.cfg.add_element(self.current_block, expr);
    }

    fn build_if(&mut self, cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId>) {
        self.build_expr(cond);
        let then_block = self.cfg.new_block();
        let else_block = self.cfg.new_block();
        let merge_block = self.cfg.new_block();
        self.branch(self.tu.skip_wrappers(cond), then_block, else_block);

        self.current_block = then_block;
        self.build_stmt(then_branch);
        self.goto(merge_block);

        self.current_block = else_block;
        if let Some(else_branch) = else_branch {
            self.build_stmt(else_branch);
        }
        self.goto(merge_block);

        self.current_block = merge_block;
    }

    fn build_while(&mut self, cond: NodeId, body: NodeId) {
        let header_block = self.cfg.new_block();
        self.goto(header_block);

        // The condition may itself split blocks; the loop test sits at the end
        self.current_block = header_block;
        self.build_expr(cond);
        let body_block = self.cfg.new_block();
        let exit_block = self.cfg.new_block();
        self.cfg.set_terminator(
            self.current_block,
            Terminator::Loop {
                condition: self.tu.skip_wrappers(cond),
                body_block,
                exit_block,
            },
        );
        self.cfg.add_edge(self.current_block, body_block);
        self.cfg.add_edge(self.current_block, exit_block);

        self.loop_stack.push(LoopContext {
            continue_block: header_block,
            break_block: exit_block,
        });
        self.current_block = body_block;
        self.build_stmt(body);
        self.loop_stack.pop();

        // Back edge to header
        self.goto(header_block);
        self.current_block = exit_block;
    }
}
