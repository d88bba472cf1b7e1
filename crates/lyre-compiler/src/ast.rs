//! Abstract syntax tree produced by the parser and consumed by the
//! compiler.

/// Binary operators on values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Three-way comparison, `<=>`.
    Compare,
}

/// Operators allowed in compound assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub line: u32,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(line: u32, kind: ExprKind) -> Self {
        Expr { line, kind }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Null,
    True,
    False,
    Nan,
    Integer(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    Table(Vec<(Expr, Expr)>),
    Set(Vec<Expr>),
    /// `@[a, b; c, d]`: row-major items with the declared shape.
    Array {
        items: Vec<Expr>,
        nrow: usize,
        ncol: usize,
    },
    Ident(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Or {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// A chain of `&` concatenations, flattened.
    Concat(Vec<Expr>),
    /// `value if cond else other`
    Conditional {
        cond: Box<Expr>,
        then_val: Box<Expr>,
        else_val: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `target[i]` or `target[i, j]`
    Index {
        target: Box<Expr>,
        indexes: Vec<Expr>,
    },
    /// `target.name`
    Field {
        target: Box<Expr>,
        name: String,
    },
    /// `ref expr`
    Ref(Box<Expr>),
    /// Anonymous `function (params) ... end`
    Closure {
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
}

/// A routine parameter: name, optional type annotation, by-reference flag.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    /// Evaluated at definition time; must yield a class.
    pub ty: Option<Expr>,
    pub by_ref: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub line: u32,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(line: u32, kind: StmtKind) -> Self {
        Stmt { line, kind }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Expression(Expr),
    Assign {
        lhs: Expr,
        rhs: Expr,
        op: Option<AssignOp>,
    },
    Print {
        args: Vec<Expr>,
        /// A trailing comma suppresses the newline.
        newline: bool,
    },
    Local {
        names: Vec<String>,
        values: Vec<Expr>,
    },
    If {
        /// Condition and block for `if` and each `elsif`.
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_block: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// `repeat ... until cond`; the condition is evaluated in the body's
    /// scope.
    Repeat {
        body: Vec<Stmt>,
        cond: Expr,
    },
    For {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        /// `downto` instead of `to`.
        down: bool,
        body: Vec<Stmt>,
    },
    Foreach {
        key: Option<String>,
        value: String,
        /// `foreach ref v in ...` aliases values into the container.
        by_ref: bool,
        coll: Expr,
        body: Vec<Stmt>,
    },
    Function {
        local: bool,
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,
    Assert {
        cond: Expr,
        msg: Option<Expr>,
    },
    Throw(Expr),
    /// `do ... end`, a bare scoped block.
    Do(Vec<Stmt>),
    /// `debug ... end`, compiled only when debug mode is on.
    Debug(Vec<Stmt>),
}
