use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    /// Arithmetic negation: -x
    Negation,
    /// Logical not: !x
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
    LogicalAnd,
    LogicalOr,
    /// `==`: like strict equality, except `null == undefined`.
    Equality,
    Inequality,
    /// `===`
    StrictEquality,
    StrictInequality,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,
}

/// An expression of the host language, compiled once from directive
/// argument text. Spans are byte offsets into that argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Variable(String, Range<usize>),
    /// `object.property`
    Member {
        object: Box<Expr>,
        property: String,
    },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// Built-in function call: `name(args...)`
    Call {
        function: String,
        arguments: Vec<Expr>,
        span: Range<usize>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `condition ? then_branch : else_branch`
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

impl Expr {
    /// Visit every built-in call in this expression, depth first.
    pub fn for_each_call<'a>(&'a self, f: &mut dyn FnMut(&'a str, &'a Range<usize>)) {
        match self {
            Expr::Literal(_) | Expr::Variable(..) => {}
            Expr::Array(items) => items.iter().for_each(|e| e.for_each_call(f)),
            Expr::Object(entries) => entries.iter().for_each(|(_, e)| e.for_each_call(f)),
            Expr::Member { object, .. } => object.for_each_call(f),
            Expr::Index { object, index } => {
                object.for_each_call(f);
                index.for_each_call(f);
            }
            Expr::Call {
                function,
                arguments,
                span,
            } => {
                f(function, span);
                arguments.iter().for_each(|e| e.for_each_call(f));
            }
            Expr::Unary { operand, .. } => operand.for_each_call(f),
            Expr::Binary { left, right, .. } => {
                left.for_each_call(f);
                right.for_each_call(f);
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.for_each_call(f);
                then_branch.for_each_call(f);
                else_branch.for_each_call(f);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOperator {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// A statement of the host language, used by `execute` and `for` clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = value` / `var name = value` / `let name`
    Declare { name: String, value: Option<Expr> },
    /// `name = value`, `name += value`, ...
    Assign {
        name: String,
        operator: AssignOperator,
        value: Expr,
    },
    /// `name++` (delta 1) or `name--` (delta -1)
    Increment { name: String, delta: f64 },
    /// Evaluated for side effects only.
    Expression(Expr),
}

impl Statement {
    pub fn for_each_call<'a>(&'a self, f: &mut dyn FnMut(&'a str, &'a Range<usize>)) {
        match self {
            Statement::Declare { value: Some(value), .. }
            | Statement::Assign { value, .. }
            | Statement::Expression(value) => value.for_each_call(f),
            Statement::Declare { value: None, .. } | Statement::Increment { .. } => {}
        }
    }
}

/// The argument of a `for` directive.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopClause {
    /// `init; condition; update`
    Counted {
        init: Vec<Statement>,
        condition: Option<Expr>,
        update: Vec<Statement>,
    },
    /// `binding in source`: iterate keys.
    Keys { binding: String, source: Expr },
    /// `binding of source`: iterate values.
    Values { binding: String, source: Expr },
}

impl LoopClause {
    pub fn for_each_call<'a>(&'a self, f: &mut dyn FnMut(&'a str, &'a Range<usize>)) {
        match self {
            LoopClause::Counted {
                init,
                condition,
                update,
            } => {
                init.iter().for_each(|s| s.for_each_call(f));
                if let Some(condition) = condition {
                    condition.for_each_call(f);
                }
                update.iter().for_each(|s| s.for_each_call(f));
            }
            LoopClause::Keys { source, .. } | LoopClause::Values { source, .. } => {
                source.for_each_call(f)
            }
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
