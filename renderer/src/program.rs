use std::ops::Range;

use emboss::expression::{Expr, LoopClause, Statement};
use emboss::{Block, Keyword, TemplateError};

use crate::error::RuntimeError;
use crate::executor;
use crate::runtime_value::Value;

/// Where an operation came from, for error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub template_id: Option<String>,
    pub keyword: Keyword,
    pub argument: String,
    pub span: Range<usize>,
}

impl Site {
    pub fn of(block: &Block) -> Self {
        Site {
            template_id: block.template_id.clone(),
            keyword: block.keyword,
            argument: block.argument.clone(),
            span: block.span.clone(),
        }
    }

    /// Wrap a runtime failure. Reserved-name bindings are source errors,
    /// everything else is a render error.
    pub fn fail(&self, error: RuntimeError) -> TemplateError {
        let located = match &error {
            RuntimeError::ReservedName(_) => TemplateError::source_error(error.to_string()),
            _ => TemplateError::render(error.to_string()),
        };
        located
            .with_template(self.template_id.as_deref())
            .with_directive(self.keyword.as_str(), self.argument.clone())
            .with_span(self.span.clone())
    }
}

/// Per-template index cell of one `each` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSlot(pub usize);

/// One `if`/`elseif` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Arm {
    pub condition: Expr,
    pub body: Vec<Op>,
    pub site: Site,
}

/// The executable form of a template. `scoped` marks operations that run
/// their body in an isolated scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Text(String),
    Print {
        expr: Expr,
        site: Site,
    },
    Execute {
        statements: Vec<Statement>,
        site: Site,
    },
    Branch {
        arms: Vec<Arm>,
        otherwise: Option<Vec<Op>>,
    },
    For {
        clause: LoopClause,
        body: Vec<Op>,
        scoped: bool,
        site: Site,
    },
    Each {
        item: String,
        source: Expr,
        count: Option<String>,
        key: Option<String>,
        slot: LoopSlot,
        body: Vec<Op>,
        scoped: bool,
        site: Site,
    },
    /// An import with a context expression. Imports without one are
    /// inlined into the surrounding sequence.
    Import {
        context: Expr,
        body: Vec<Op>,
        scoped: bool,
        site: Site,
    },
}

/// A compiled template: immutable, `Send + Sync`, renderable any number
/// of times.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    pub(crate) template_id: Option<String>,
    pub(crate) ops: Vec<Op>,
    pub(crate) loop_slots: usize,
}

impl CompiledTemplate {
    pub fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of `each` loops, each owning one index slot.
    pub fn loop_slots(&self) -> usize {
        self.loop_slots
    }

    /// Render with an optional data context. The context must be an
    /// object; `null` is the same as no context.
    pub fn render(&self, data: Option<&Value>) -> Result<String, TemplateError> {
        executor::execute(self, data)
    }
}
