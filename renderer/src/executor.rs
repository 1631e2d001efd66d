use emboss::expression::LoopClause;
use emboss::{RESERVED_NAME, TemplateError};

use crate::builtins::entries;
use crate::environment::{Environment, Scope};
use crate::error::RuntimeError;
use crate::evaluator::{evaluate, execute_statement};
use crate::program::{CompiledTemplate, Op, Site};
use crate::runtime_value::Value;

/// Upper bound on iterations of any single loop.
const MAX_ITERATIONS: usize = 10_000_000;

/// Render `template` against `data`.
pub(crate) fn execute(template: &CompiledTemplate, data: Option<&Value>) -> Result<String, TemplateError> {
    let root = seed_scope(data).map_err(|e| e.with_template(template.template_id()))?;
    let mut executor = Executor {
        env: Environment::new(root),
        slots: vec![0; template.loop_slots()],
        output: String::new(),
    };
    executor.run(template.ops())?;
    log::debug!(
        "rendered {} ({} bytes)",
        template.template_id().unwrap_or("anonymous template"),
        executor.output.len()
    );
    Ok(executor.output)
}

/// Bind each key of the data context in the root scope.
fn seed_scope(data: Option<&Value>) -> Result<Scope, TemplateError> {
    let mut scope = Scope::new();
    match data {
        None | Some(Value::Null) | Some(Value::Undefined) => {}
        Some(Value::Object(object)) => {
            for (key, value) in object.iter() {
                if key == RESERVED_NAME {
                    return Err(TemplateError::source_error(format!(
                        "Template data keys may not use '{}' name.",
                        RESERVED_NAME
                    )));
                }
                scope.set(key, value.clone());
            }
        }
        Some(other) => {
            return Err(TemplateError::source_error(format!(
                "Data must be a JSON-compatible object, got {}.",
                other.type_name()
            )));
        }
    }
    Ok(scope)
}

struct Executor {
    env: Environment,
    /// Current index of each `each` loop, by slot.
    slots: Vec<usize>,
    output: String,
}

impl Executor {
    fn run(&mut self, ops: &[Op]) -> Result<(), TemplateError> {
        for op in ops {
            self.op(op)?;
        }
        Ok(())
    }

    fn op(&mut self, op: &Op) -> Result<(), TemplateError> {
        match op {
            Op::Text(text) => self.output.push_str(text),

            Op::Print { expr, site } => {
                let value = evaluate(expr, &self.env).map_err(|e| site.fail(e))?;
                self.output.push_str(&value.to_string());
            }

            Op::Execute { statements, site } => {
                for statement in statements {
                    execute_statement(statement, &mut self.env).map_err(|e| site.fail(e))?;
                }
            }

            Op::Branch { arms, otherwise } => {
                for arm in arms {
                    let condition = evaluate(&arm.condition, &self.env).map_err(|e| arm.site.fail(e))?;
                    if condition.is_truthy() {
                        return self.run(&arm.body);
                    }
                }
                if let Some(body) = otherwise {
                    self.run(body)?;
                }
            }

            Op::For {
                clause,
                body,
                scoped,
                site,
            } => self.scoped(*scoped, |this| this.for_loop(clause, body, site))?,

            Op::Each {
                item,
                source,
                count,
                key,
                slot,
                body,
                scoped,
                site,
            } => {
                let collection = evaluate(source, &self.env).map_err(|e| site.fail(e))?;
                let pairs = entries(&collection).map_err(|e| site.fail(e))?;
                self.scoped(*scoped, |this| {
                    for (index, (k, v)) in pairs.into_iter().enumerate() {
                        this.slots[slot.0] = index;
                        this.env.declare(item, v);
                        if let Some(count) = count {
                            this.env.declare(count, Value::Number(this.slots[slot.0] as f64));
                        }
                        if let Some(key) = key {
                            this.env.declare(key, k);
                        }
                        this.run(body)?;
                    }
                    Ok(())
                })?;
            }

            Op::Import {
                context,
                body,
                scoped,
                site,
            } => {
                let context = evaluate(context, &self.env).map_err(|e| site.fail(e))?;
                let bindings = match context {
                    Value::Object(bindings) => bindings,
                    other => return Err(site.fail(RuntimeError::ContextNotObject(other.type_name()))),
                };
                self.scoped(*scoped, |this| {
                    for (name, value) in bindings.iter() {
                        if name == RESERVED_NAME {
                            return Err(site.fail(RuntimeError::ReservedName(name.to_string())));
                        }
                        this.env.declare(name, value.clone());
                    }
                    this.run(body)
                })?;
            }
        }
        Ok(())
    }

    /// Run `f` in a fresh scope when `scoped`, otherwise in the current one.
    fn scoped(
        &mut self,
        scoped: bool,
        f: impl FnOnce(&mut Self) -> Result<(), TemplateError>,
    ) -> Result<(), TemplateError> {
        if !scoped {
            return f(self);
        }
        self.env.push_scope();
        let result = f(self);
        self.env.pop_scope();
        result
    }

    fn for_loop(&mut self, clause: &LoopClause, body: &[Op], site: &Site) -> Result<(), TemplateError> {
        match clause {
            LoopClause::Counted {
                init,
                condition,
                update,
            } => {
                for statement in init {
                    execute_statement(statement, &mut self.env).map_err(|e| site.fail(e))?;
                }
                let mut iterations = 0;
                loop {
                    if let Some(condition) = condition {
                        let value = evaluate(condition, &self.env).map_err(|e| site.fail(e))?;
                        if !value.is_truthy() {
                            break;
                        }
                    }
                    iterations += 1;
                    if iterations > MAX_ITERATIONS {
                        return Err(site.fail(RuntimeError::IterationLimit(MAX_ITERATIONS)));
                    }
                    self.run(body)?;
                    for statement in update {
                        execute_statement(statement, &mut self.env).map_err(|e| site.fail(e))?;
                    }
                }
            }
            LoopClause::Keys { binding, source } => {
                let collection = evaluate(source, &self.env).map_err(|e| site.fail(e))?;
                // Enumerating the keys of nothing is an empty loop.
                if collection.is_nullish() {
                    return Ok(());
                }
                let pairs = entries(&collection).map_err(|e| site.fail(e))?;
                for (key, _) in pairs {
                    // Keys are strings, as in JavaScript `for ... in`.
                    self.env.declare(binding, Value::String(key.to_string()));
                    self.run(body)?;
                }
            }
            LoopClause::Values { binding, source } => {
                let collection = evaluate(source, &self.env).map_err(|e| site.fail(e))?;
                let pairs = entries(&collection).map_err(|e| site.fail(e))?;
                for (_, value) in pairs {
                    self.env.declare(binding, value);
                    self.run(body)?;
                }
            }
        }
        Ok(())
    }
}
