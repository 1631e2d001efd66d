use std::ops::Range;

use emboss::expression::Expr;
use emboss::parser::arguments::{parse_each, parse_import};
use emboss::parser::{ExpressionError, parse_expression, parse_loop_clause, parse_statements};
use emboss::{Block, BlockForest, Keyword, Node, NodeId, TemplateError};

use crate::builtins;
use crate::program::{Arm, CompiledTemplate, LoopSlot, Op, Site};

/// Lower a block forest into a compiled template. Every directive argument
/// is parsed here, once.
pub fn generate(forest: &BlockForest, strict_scoping: bool) -> Result<CompiledTemplate, TemplateError> {
    let mut generator = Generator {
        forest,
        strict_scoping,
        loop_slots: 0,
    };
    let ops = generator.children(forest.roots())?;
    log::debug!(
        "generated {} ops with {} loop slots for {}",
        ops.len(),
        generator.loop_slots,
        forest.template_id.as_deref().unwrap_or("anonymous template")
    );
    Ok(CompiledTemplate {
        template_id: forest.template_id.clone(),
        ops,
        loop_slots: generator.loop_slots,
    })
}

struct Generator<'f> {
    forest: &'f BlockForest,
    strict_scoping: bool,
    loop_slots: usize,
}

/// An `if` chain being collected from consecutive siblings.
struct Chain {
    arms: Vec<Arm>,
    otherwise: Option<Vec<Op>>,
}

impl Chain {
    fn into_op(self) -> Op {
        Op::Branch {
            arms: self.arms,
            otherwise: self.otherwise,
        }
    }
}

impl<'f> Generator<'f> {
    fn children(&mut self, ids: &[NodeId]) -> Result<Vec<Op>, TemplateError> {
        let forest = self.forest;
        let mut ops = Vec::new();
        let mut chain: Option<Chain> = None;

        for &id in ids {
            let block = match forest.node(id) {
                Node::Block(block) if block.keyword.is_conditional() => block,
                _ => {
                    if let Some(done) = chain.take() {
                        ops.push(done.into_op());
                    }
                    self.node(id, &mut ops)?;
                    continue;
                }
            };

            match block.keyword {
                Keyword::If => {
                    if let Some(done) = chain.take() {
                        ops.push(done.into_op());
                    }
                    chain = Some(Chain {
                        arms: vec![self.arm(block)?],
                        otherwise: None,
                    });
                }
                keyword => {
                    let Some(open) = chain.as_mut() else {
                        return Err(TemplateError::structural("Must be preceded by if tag.").at_block(block));
                    };
                    if open.otherwise.is_some() {
                        return Err(TemplateError::generation(format!(
                            "\"{}\" cannot follow \"else\" in the same chain.",
                            keyword
                        ))
                        .at_block(block));
                    }
                    if keyword == Keyword::ElseIf {
                        open.arms.push(self.arm(block)?);
                    } else {
                        open.otherwise = Some(self.children(&block.children)?);
                    }
                }
            }
        }

        if let Some(done) = chain {
            ops.push(done.into_op());
        }
        Ok(ops)
    }

    fn arm(&mut self, block: &Block) -> Result<Arm, TemplateError> {
        Ok(Arm {
            condition: self.expression(block, &block.argument)?,
            body: self.children(&block.children)?,
            site: Site::of(block),
        })
    }

    /// Emit the ops of one non-conditional node into `ops`.
    fn node(&mut self, id: NodeId, ops: &mut Vec<Op>) -> Result<(), TemplateError> {
        let forest = self.forest;
        let block = match forest.node(id) {
            Node::Text(text) => {
                push_text(ops, text);
                return Ok(());
            }
            Node::Block(block) => block,
        };

        match block.keyword {
            Keyword::Print => ops.push(Op::Print {
                expr: self.expression(block, &block.argument)?,
                site: Site::of(block),
            }),
            Keyword::Execute => {
                let statements = parse_statements(&block.argument)
                    .map_err(|e| invalid_code(block, e))?;
                for statement in &statements {
                    if let Some(name) = unknown_call(|f| statement.for_each_call(f)) {
                        return Err(unknown_function(block, name));
                    }
                }
                ops.push(Op::Execute {
                    statements,
                    site: Site::of(block),
                });
            }
            Keyword::For => {
                let clause = parse_loop_clause(&block.argument).map_err(|e| invalid_code(block, e))?;
                if let Some(name) = unknown_call(|f| clause.for_each_call(f)) {
                    return Err(unknown_function(block, name));
                }
                ops.push(Op::For {
                    clause,
                    body: self.children(&block.children)?,
                    scoped: self.strict_scoping,
                    site: Site::of(block),
                });
            }
            Keyword::Each => {
                let arguments = parse_each(&block.argument).map_err(|e| e.at_block(block))?;
                let source = self.expression(block, &arguments.source)?;
                let slot = LoopSlot(self.loop_slots);
                self.loop_slots += 1;
                ops.push(Op::Each {
                    item: arguments.item,
                    source,
                    count: arguments.count,
                    key: arguments.key,
                    slot,
                    body: self.children(&block.children)?,
                    scoped: self.strict_scoping,
                    site: Site::of(block),
                });
            }
            Keyword::Import => {
                let arguments = parse_import(&block.argument).map_err(|e| e.at_block(block))?;
                let body = self.children(&block.children)?;
                match arguments.context {
                    Some(context) => ops.push(Op::Import {
                        context: self.expression(block, context)?,
                        body,
                        scoped: self.strict_scoping,
                        site: Site::of(block),
                    }),
                    None => body.into_iter().for_each(|op| push_op(ops, op)),
                }
            }
            Keyword::Neglect => {
                for op in self.children(&block.children)? {
                    push_op(ops, op);
                }
            }
            // `ignore` never reaches the tree; conditionals are handled by `children`.
            Keyword::Ignore | Keyword::If | Keyword::ElseIf | Keyword::Else => {
                return Err(TemplateError::structural("Unknown block type.").at_block(block));
            }
        }
        Ok(())
    }

    fn expression(&self, block: &Block, text: &str) -> Result<Expr, TemplateError> {
        if text.trim().is_empty() {
            return Err(TemplateError::generation(format!(
                "\"{}\" requires an expression.",
                block.keyword
            ))
            .at_block(block));
        }
        let expr = parse_expression(text).map_err(|e| invalid_code(block, e))?;
        match unknown_call(|f| expr.for_each_call(f)) {
            Some(name) => Err(unknown_function(block, name)),
            None => Ok(expr),
        }
    }
}

fn push_text(ops: &mut Vec<Op>, text: &str) {
    if let Some(Op::Text(last)) = ops.last_mut() {
        last.push_str(text);
    } else {
        ops.push(Op::Text(text.to_string()));
    }
}

fn push_op(ops: &mut Vec<Op>, op: Op) {
    match op {
        Op::Text(text) => push_text(ops, &text),
        other => ops.push(other),
    }
}

/// First call in a walk that does not name a built-in function.
fn unknown_call<'a>(walk: impl FnOnce(&mut dyn FnMut(&'a str, &'a Range<usize>))) -> Option<&'a str> {
    let mut unknown = None;
    walk(&mut |name, _| {
        if unknown.is_none() && !builtins::is_builtin(name) {
            unknown = Some(name);
        }
    });
    unknown
}

fn invalid_code(block: &Block, error: ExpressionError) -> TemplateError {
    TemplateError::generation(format!("Invalid expression: {}.", error.message))
        .at_block(block)
        .with_note(format!("at offset {} of the directive argument", error.span.start))
}

fn unknown_function(block: &Block, name: &str) -> TemplateError {
    TemplateError::generation(format!("Unknown function '{}'.", name))
        .at_block(block)
        .with_note(format!("available functions: {}", builtins::NAMES.join(", ")))
}
