//! Syntax tree produced by the parser.
//!
//! Nodes are immutable once built and shared through `Rc`, so the evaluator
//! can hold on to any subtree while a coroutine is suspended. Every
//! statement, expression, function and class carries a process-unique
//! [`NodeId`]. Scope analysis is computed on first use and cached on the
//! node that owns the scope, so it lives exactly as long as the tree.

use std::cell::OnceCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use num_bigint::BigInt;
use rustc_hash::FxHashSet;

pub use crate::lexer::SourceLocation;

pub type NodeId = u32;

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

pub fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

pub type StatementList = Rc<[Rc<Statement>]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceType {
    Script,
    Module,
}

#[derive(Debug)]
pub struct Program {
    pub id: NodeId,
    pub source_type: SourceType,
    pub strict: bool,
    pub body: StatementList,
    pub scope: OnceCell<ScopeInfo>,
}

impl Program {
    pub fn scope(&self) -> &ScopeInfo {
        self.scope.get_or_init(|| ScopeInfo::for_body(&self.body, self.strict))
    }
}

#[derive(Debug)]
pub struct Statement {
    pub id: NodeId,
    pub location: SourceLocation,
    pub kind: StatementKind,
    /// Declarations of a block or switch; unused by other statements.
    pub scope: OnceCell<ScopeInfo>,
}

impl Statement {
    /// Lexical declarations scoped to this block or switch statement.
    pub fn block_scope(&self) -> &ScopeInfo {
        self.scope.get_or_init(|| match &self.kind {
            StatementKind::Block(body) => ScopeInfo::for_block(body.iter()),
            StatementKind::Switch(switch) => ScopeInfo::for_block(switch.cases.iter().flat_map(|c| c.body.iter())),
            _ => ScopeInfo::default(),
        })
    }
}

#[derive(Debug)]
pub enum StatementKind {
    Empty,
    Expression(Rc<Expression>),
    Block(StatementList),
    Variable(VariableDeclaration),
    If {
        test: Rc<Expression>,
        consequent: Rc<Statement>,
        alternate: Option<Rc<Statement>>,
    },
    While {
        test: Rc<Expression>,
        body: Rc<Statement>,
    },
    DoWhile {
        body: Rc<Statement>,
        test: Rc<Expression>,
    },
    For(ForStatement),
    ForIn(ForInOfStatement),
    ForOf(ForInOfStatement),
    Return(Option<Rc<Expression>>),
    Break(Option<Rc<str>>),
    Continue(Option<Rc<str>>),
    Throw(Rc<Expression>),
    Try(TryStatement),
    Switch(SwitchStatement),
    Labeled(Rc<str>, Rc<Statement>),
    With(Rc<Expression>, Rc<Statement>),
    Debugger,
    FunctionDeclaration(Rc<FunctionNode>),
    ClassDeclaration(Rc<ClassNode>),
    Import(ImportDeclaration),
    Export(ExportDeclaration),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug)]
pub struct VariableDeclaration {
    pub kind: VarKind,
    pub declarations: Rc<[VariableDeclarator]>,
}

#[derive(Debug)]
pub struct VariableDeclarator {
    pub target: Rc<Pattern>,
    pub init: Option<Rc<Expression>>,
}

#[derive(Debug)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Rc<Expression>>,
    pub update: Option<Rc<Expression>>,
    pub body: Rc<Statement>,
}

#[derive(Debug)]
pub enum ForInit {
    Variable(VariableDeclaration),
    Expression(Rc<Expression>),
}

#[derive(Debug)]
pub struct ForInOfStatement {
    pub left: ForHead,
    pub right: Rc<Expression>,
    pub body: Rc<Statement>,
}

#[derive(Debug)]
pub enum ForHead {
    Declaration(VarKind, Rc<Pattern>),
    Target(Rc<Pattern>),
}

#[derive(Debug)]
pub struct TryStatement {
    pub block: Rc<Statement>,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Rc<Statement>>,
}

#[derive(Debug)]
pub struct CatchClause {
    pub param: Option<Rc<Pattern>>,
    pub body: Rc<Statement>,
}

#[derive(Debug)]
pub struct SwitchStatement {
    pub discriminant: Rc<Expression>,
    pub cases: Rc<[SwitchCase]>,
}

#[derive(Debug)]
pub struct SwitchCase {
    pub test: Option<Rc<Expression>>,
    pub body: StatementList,
}

#[derive(Debug)]
pub struct ImportDeclaration {
    pub specifiers: Rc<[ImportSpecifier]>,
    pub source: Rc<str>,
}

#[derive(Debug)]
pub enum ImportSpecifier {
    Named { imported: Rc<str>, local: Rc<str> },
    Default(Rc<str>),
    Namespace(Rc<str>),
}

#[derive(Debug)]
pub enum ExportDeclaration {
    Declaration(Rc<Statement>),
    Named {
        specifiers: Rc<[ExportSpecifier]>,
        source: Option<Rc<str>>,
    },
    DefaultExpression(Rc<Expression>),
    DefaultFunction(Rc<FunctionNode>),
    DefaultClass(Rc<ClassNode>),
    All {
        exported: Option<Rc<str>>,
        source: Rc<str>,
    },
}

#[derive(Debug)]
pub struct ExportSpecifier {
    pub local: Rc<str>,
    pub exported: Rc<str>,
}

/// Binding or assignment target.
#[derive(Debug)]
pub enum Pattern {
    Identifier(Rc<str>),
    /// Member expression target; only valid in destructuring assignment.
    Member(Rc<Expression>),
    Array {
        elements: Rc<[Option<PatternElement>]>,
        rest: Option<Rc<Pattern>>,
    },
    Object {
        properties: Rc<[(PropertyName, PatternElement)]>,
        rest: Option<Rc<Pattern>>,
    },
}

#[derive(Debug, Clone)]
pub struct PatternElement {
    pub target: Rc<Pattern>,
    pub default: Option<Rc<Expression>>,
}

#[derive(Debug, Clone)]
pub enum PropertyName {
    Static(Rc<str>),
    Computed(Rc<Expression>),
}

#[derive(Debug)]
pub struct Expression {
    pub id: NodeId,
    pub location: SourceLocation,
    pub kind: ExpressionKind,
}

#[derive(Debug)]
pub enum ExpressionKind {
    Literal(Literal),
    Identifier(Rc<str>),
    This,
    Array(Rc<[Option<Argument>]>),
    Object(Rc<[ObjectProperty]>),
    Function(Rc<FunctionNode>),
    Arrow(Rc<FunctionNode>),
    Class(Rc<ClassNode>),
    Unary(UnaryOperator, Rc<Expression>),
    Update {
        increment: bool,
        prefix: bool,
        target: Rc<Expression>,
    },
    Binary(BinaryOperator, Rc<Expression>, Rc<Expression>),
    Logical(LogicalOperator, Rc<Expression>, Rc<Expression>),
    Assign {
        operator: AssignOperator,
        target: Rc<Pattern>,
        value: Rc<Expression>,
    },
    Conditional(Rc<Expression>, Rc<Expression>, Rc<Expression>),
    Call(Rc<Expression>, Rc<[Argument]>),
    New(Rc<Expression>, Rc<[Argument]>),
    Member(Rc<Expression>, MemberProperty),
    SuperMember(MemberProperty),
    SuperCall(Rc<[Argument]>),
    NewTarget,
    Sequence(Rc<[Rc<Expression>]>),
    Yield(Option<Rc<Expression>>),
    Await(Rc<Expression>),
}

#[derive(Debug, Clone)]
pub enum Literal {
    Number(f64),
    String(Rc<str>),
    Boolean(bool),
    Null,
    BigInt(Rc<BigInt>),
}

#[derive(Debug, Clone)]
pub enum Argument {
    Expression(Rc<Expression>),
    Spread(Rc<Expression>),
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    Static(Rc<str>),
    Computed(Rc<Expression>),
}

#[derive(Debug, Clone)]
pub enum ObjectProperty {
    Init(PropertyName, Rc<Expression>),
    Method(PropertyName, MethodKind, Rc<FunctionNode>),
    Spread(Rc<Expression>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Getter,
    Setter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    LShift,
    RShift,
    URShift,
    BitAnd,
    BitOr,
    BitXor,
    In,
    Instanceof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Nullish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOperator {
    Assign,
    Compound(BinaryOperator),
    Logical(LogicalOperator),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Method,
    ClassConstructor { derived: bool },
}

#[derive(Debug)]
pub struct FunctionNode {
    pub id: NodeId,
    pub location: SourceLocation,
    pub name: Option<Rc<str>>,
    pub params: Rc<[PatternElement]>,
    pub rest: Option<Rc<Pattern>>,
    pub body: FunctionBody,
    pub kind: FunctionKind,
    pub is_async: bool,
    pub is_generator: bool,
    pub strict: bool,
    pub scope: OnceCell<ScopeInfo>,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Statements(StatementList),
    Expression(Rc<Expression>),
}

impl FunctionNode {
    pub fn scope(&self) -> &ScopeInfo {
        self.scope.get_or_init(|| match &self.body {
            FunctionBody::Statements(body) => ScopeInfo::for_body(body, self.strict),
            FunctionBody::Expression(_) => ScopeInfo::default(),
        })
    }

    /// Number of parameters before the first default or rest (the `length` property).
    pub fn expected_arguments(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| p.default.is_none())
            .count()
    }

    pub fn has_simple_parameters(&self) -> bool {
        self.rest.is_none()
            && self
                .params
                .iter()
                .all(|p| p.default.is_none() && matches!(*p.target, Pattern::Identifier(_)))
    }
}

#[derive(Debug)]
pub struct ClassNode {
    pub id: NodeId,
    pub location: SourceLocation,
    pub name: Option<Rc<str>>,
    pub heritage: Option<Rc<Expression>>,
    pub constructor: Option<Rc<FunctionNode>>,
    pub members: Rc<[ClassMember]>,
}

#[derive(Debug)]
pub struct ClassMember {
    pub is_static: bool,
    pub key: PropertyName,
    pub kind: MethodKind,
    pub function: Rc<FunctionNode>,
}

/// A declaration that creates a lexically scoped binding.
#[derive(Debug, Clone)]
pub enum LexicalDeclaration {
    Let(Rc<str>),
    Const(Rc<str>),
    Class(Rc<str>),
    Function(Rc<FunctionNode>),
}

impl LexicalDeclaration {
    pub fn name(&self) -> Rc<str> {
        match self {
            LexicalDeclaration::Let(n)
            | LexicalDeclaration::Const(n)
            | LexicalDeclaration::Class(n) => n.clone(),
            LexicalDeclaration::Function(f) => f.name.clone().unwrap_or_else(|| Rc::from("*default*")),
        }
    }
}

pub fn bound_names(pattern: &Pattern, names: &mut Vec<Rc<str>>) {
    match pattern {
        Pattern::Identifier(n) => names.push(n.clone()),
        Pattern::Member(_) => {}
        Pattern::Array { elements, rest } => {
            for element in elements.iter().flatten() {
                bound_names(&element.target, names);
            }
            if let Some(rest) = rest {
                bound_names(rest, names);
            }
        }
        Pattern::Object { properties, rest } => {
            for (_, element) in properties.iter() {
                bound_names(&element.target, names);
            }
            if let Some(rest) = rest {
                bound_names(rest, names);
            }
        }
    }
}

/// Declarations directly in a statement list that are lexically scoped to it.
///
/// With `functions_are_lexical` false (function and script top level) function
/// declarations are var-scoped instead and are not returned.
pub fn lexical_declarations(body: &[Rc<Statement>], functions_are_lexical: bool) -> Vec<LexicalDeclaration> {
    let mut out = Vec::new();
    for stmt in body {
        collect_lexical(stmt, functions_are_lexical, &mut out);
    }
    out
}

fn collect_lexical(stmt: &Statement, functions_are_lexical: bool, out: &mut Vec<LexicalDeclaration>) {
    match &stmt.kind {
        StatementKind::Variable(decl) if decl.kind != VarKind::Var => {
            let mut names = Vec::new();
            for d in decl.declarations.iter() {
                bound_names(&d.target, &mut names);
            }
            out.extend(names.into_iter().map(|n| match decl.kind {
                VarKind::Const => LexicalDeclaration::Const(n),
                _ => LexicalDeclaration::Let(n),
            }));
        }
        StatementKind::ClassDeclaration(class) => {
            if let Some(name) = &class.name {
                out.push(LexicalDeclaration::Class(name.clone()));
            }
        }
        StatementKind::FunctionDeclaration(f) if functions_are_lexical => {
            out.push(LexicalDeclaration::Function(f.clone()));
        }
        StatementKind::Export(export) => match export {
            ExportDeclaration::Declaration(inner) => collect_lexical(inner, functions_are_lexical, out),
            ExportDeclaration::DefaultClass(class) => out.push(LexicalDeclaration::Class(
                class.name.clone().unwrap_or_else(|| Rc::from("*default*")),
            )),
            ExportDeclaration::DefaultExpression(_) => {
                out.push(LexicalDeclaration::Let(Rc::from("*default*")));
            }
            ExportDeclaration::DefaultFunction(f) if functions_are_lexical => {
                out.push(LexicalDeclaration::Function(f.clone()));
            }
            _ => {}
        },
        _ => {}
    }
}

/// Function declarations hoisted to the var scope of a function or script body.
pub fn top_level_functions(body: &[Rc<Statement>]) -> Vec<Rc<FunctionNode>> {
    let mut out = Vec::new();
    for stmt in body {
        match &stmt.kind {
            StatementKind::FunctionDeclaration(f) => out.push(f.clone()),
            StatementKind::Labeled(_, inner) => {
                if let StatementKind::FunctionDeclaration(f) = &inner.kind {
                    out.push(f.clone());
                }
            }
            StatementKind::Export(ExportDeclaration::Declaration(inner)) => {
                if let StatementKind::FunctionDeclaration(f) = &inner.kind {
                    out.push(f.clone());
                }
            }
            StatementKind::Export(ExportDeclaration::DefaultFunction(f)) => out.push(f.clone()),
            _ => {}
        }
    }
    out
}

/// `var` names declared anywhere in a body, not crossing function boundaries.
pub fn var_declared_names(body: &[Rc<Statement>]) -> Vec<Rc<str>> {
    let mut names = Vec::new();
    for stmt in body {
        collect_var_names(stmt, &mut names);
    }
    names
}

fn collect_var_names(stmt: &Statement, names: &mut Vec<Rc<str>>) {
    match &stmt.kind {
        StatementKind::Variable(decl) if decl.kind == VarKind::Var => {
            for d in decl.declarations.iter() {
                bound_names(&d.target, names);
            }
        }
        StatementKind::Block(body) => {
            for s in body.iter() {
                collect_var_names(s, names);
            }
        }
        StatementKind::If {
            consequent,
            alternate,
            ..
        } => {
            collect_var_names(consequent, names);
            if let Some(alt) = alternate {
                collect_var_names(alt, names);
            }
        }
        StatementKind::While { body, .. }
        | StatementKind::DoWhile { body, .. }
        | StatementKind::Labeled(_, body)
        | StatementKind::With(_, body) => collect_var_names(body, names),
        StatementKind::For(f) => {
            if let Some(ForInit::Variable(decl)) = &f.init
                && decl.kind == VarKind::Var
            {
                for d in decl.declarations.iter() {
                    bound_names(&d.target, names);
                }
            }
            collect_var_names(&f.body, names);
        }
        StatementKind::ForIn(f) | StatementKind::ForOf(f) => {
            if let ForHead::Declaration(VarKind::Var, pattern) = &f.left {
                bound_names(pattern, names);
            }
            collect_var_names(&f.body, names);
        }
        StatementKind::Try(t) => {
            collect_var_names(&t.block, names);
            if let Some(handler) = &t.handler {
                collect_var_names(&handler.body, names);
            }
            if let Some(finalizer) = &t.finalizer {
                collect_var_names(finalizer, names);
            }
        }
        StatementKind::Switch(s) => {
            for case in s.cases.iter() {
                for st in case.body.iter() {
                    collect_var_names(st, names);
                }
            }
        }
        StatementKind::Export(ExportDeclaration::Declaration(inner)) => collect_var_names(inner, names),
        _ => {}
    }
}

/// Function declarations nested in blocks (not at the body's top level).
/// In sloppy code these also get a var binding in the enclosing function.
pub fn block_level_functions(body: &[Rc<Statement>]) -> Vec<Rc<FunctionNode>> {
    fn walk(stmt: &Statement, nested: bool, out: &mut Vec<Rc<FunctionNode>>) {
        match &stmt.kind {
            StatementKind::FunctionDeclaration(f) if nested => {
                if !f.is_async && !f.is_generator {
                    out.push(f.clone());
                }
            }
            StatementKind::Block(body) => {
                for s in body.iter() {
                    walk(s, true, out);
                }
            }
            StatementKind::If {
                consequent,
                alternate,
                ..
            } => {
                walk(consequent, true, out);
                if let Some(alt) = alternate {
                    walk(alt, true, out);
                }
            }
            StatementKind::While { body, .. }
            | StatementKind::DoWhile { body, .. }
            | StatementKind::With(_, body) => walk(body, true, out),
            StatementKind::Labeled(_, body) => walk(body, nested, out),
            StatementKind::For(f) => walk(&f.body, true, out),
            StatementKind::ForIn(f) | StatementKind::ForOf(f) => walk(&f.body, true, out),
            StatementKind::Try(t) => {
                walk(&t.block, true, out);
                if let Some(handler) = &t.handler {
                    walk(&handler.body, true, out);
                }
                if let Some(finalizer) = &t.finalizer {
                    walk(finalizer, true, out);
                }
            }
            StatementKind::Switch(s) => {
                for case in s.cases.iter() {
                    for st in case.body.iter() {
                        walk(st, true, out);
                    }
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    for stmt in body {
        walk(stmt, false, &mut out);
    }
    out
}

/// What one scope declares.
#[derive(Debug, Default)]
pub struct ScopeInfo {
    pub lexical: Vec<LexicalDeclaration>,
    pub var_names: Vec<Rc<str>>,
    /// Hoisted function declarations, one per name (the last one wins).
    pub functions: Vec<(Rc<str>, Rc<FunctionNode>)>,
    /// Names of sloppy-mode block functions that also get a var binding.
    pub block_functions: Vec<Rc<str>>,
}

impl ScopeInfo {
    /// A function, script or module body.
    pub fn for_body(body: &[Rc<Statement>], strict: bool) -> Self {
        let lexical = lexical_declarations(body, false);
        let lexical_names: FxHashSet<Rc<str>> = lexical.iter().map(LexicalDeclaration::name).collect();
        let mut functions: Vec<(Rc<str>, Rc<FunctionNode>)> = Vec::new();
        for f in top_level_functions(body).into_iter().rev() {
            let name = f.name.clone().unwrap_or_else(|| Rc::from("*default*"));
            if !functions.iter().any(|(n, _)| *n == name) {
                functions.push((name, f));
            }
        }
        functions.reverse();
        let mut var_names = Vec::new();
        let mut seen = FxHashSet::default();
        for name in var_declared_names(body) {
            if seen.insert(name.clone()) {
                var_names.push(name);
            }
        }
        let mut block_functions = Vec::new();
        if !strict {
            for f in block_level_functions(body) {
                if let Some(name) = &f.name
                    && !lexical_names.contains(name)
                    && seen.insert(name.clone())
                {
                    block_functions.push(name.clone());
                }
            }
        }
        Self {
            lexical,
            var_names,
            functions,
            block_functions,
        }
    }

    /// A block, or the case clauses of a switch.
    pub fn for_block<'a>(body: impl IntoIterator<Item = &'a Rc<Statement>>) -> Self {
        let statements: Vec<Rc<Statement>> = body.into_iter().cloned().collect();
        Self {
            lexical: lexical_declarations(&statements, true),
            ..Self::default()
        }
    }
}

/// Function, arrow or class expressions without their own name. Binding one
/// of these to an identifier gives the function that identifier's name.
pub fn is_anonymous_function_definition(expr: &Expression) -> bool {
    match &expr.kind {
        ExpressionKind::Function(f) => f.name.is_none(),
        ExpressionKind::Arrow(_) => true,
        ExpressionKind::Class(c) => c.name.is_none(),
        _ => false,
    }
}
