use std::ops::Range;

use crate::block::{Block, BlockForest, Keyword, Node, NodeId};
use crate::error::TemplateError;
use crate::parser::arguments::parse_import;
use crate::parser::directive::{Directive, classify};
use crate::parser::tokenizer::{Segment, tokenize};
use crate::source::{ImportResolver, normalize};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Bounds on how deep a forest may grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_import_depth: usize,
    /// Open blocks around any directive, counting the import blocks of
    /// every template it was inlined through.
    pub max_nesting_depth: usize,
}

/// Build the block forest of a normalized template, inlining its imports.
pub fn build_forest(
    source: &str,
    template_id: Option<&str>,
    resolver: &dyn ImportResolver,
    limits: Limits,
) -> Result<BlockForest, TemplateError> {
    let mut builder = TreeBuilder {
        forest: BlockForest::new(template_id),
        resolver,
        limits,
        chain: Vec::new(),
        outer_depth: 0,
    };
    builder.build(source, template_id, None)?;
    Ok(builder.forest)
}

// ---------------------------------------------------------------------------
// Builder state
// ---------------------------------------------------------------------------

struct TreeBuilder<'r> {
    forest: BlockForest,
    resolver: &'r dyn ImportResolver,
    limits: Limits,
    /// Ids of the templates currently being built, outermost first.
    chain: Vec<Option<String>>,
    /// Nesting of the import block the current template is inlined into.
    outer_depth: usize,
}

/// An open container. `node` is `None` for `ignore`, which never enters
/// the tree. `closer` is the keyword its closing directive must name.
struct OpenBlock {
    keyword: Keyword,
    node: Option<NodeId>,
    closer: Keyword,
}

/// One template's pass over its segments. Each imported template gets its
/// own stack; only the forest is shared.
struct TemplateState<'s> {
    template_id: Option<&'s str>,
    /// Insertion point when the stack is empty: the import block being
    /// inlined, or the forest root.
    base: Option<NodeId>,
    stack: Vec<OpenBlock>,
}

impl TemplateState<'_> {
    fn insertion_point(&self) -> Option<NodeId> {
        match self.stack.last() {
            Some(open) => open.node,
            None => self.base,
        }
    }

    fn suppression(&self) -> Option<Keyword> {
        self.stack
            .last()
            .map(|open| open.keyword)
            .filter(|k| matches!(k, Keyword::Ignore | Keyword::Neglect))
    }

    fn error(&self, error: TemplateError, span: Range<usize>) -> TemplateError {
        error.with_template(self.template_id).with_span(span)
    }
}

impl<'r> TreeBuilder<'r> {
    fn build(
        &mut self,
        source: &str,
        template_id: Option<&str>,
        base: Option<NodeId>,
    ) -> Result<(), TemplateError> {
        self.chain.push(template_id.map(str::to_string));
        let mut state = TemplateState {
            template_id,
            base,
            stack: Vec::new(),
        };

        for segment in tokenize(source) {
            match segment {
                Segment::Text { text, .. } => self.text(&state, text),
                Segment::Directive { raw, inner, span } => match classify(inner) {
                    Some(directive) => self.directive(&mut state, directive, raw, span)?,
                    None => self.text(&state, raw),
                },
            }
        }

        if let Some(open) = state.stack.last() {
            let span = open
                .node
                .and_then(|id| self.forest.block(id))
                .map(|b| b.span.clone())
                .unwrap_or(0..0);
            return Err(state.error(
                TemplateError::structural(format!(
                    "No closing tag: got \"{}\" without closer.",
                    open.keyword
                )),
                span,
            ));
        }

        self.chain.pop();
        Ok(())
    }

    fn text(&mut self, state: &TemplateState<'_>, text: &str) {
        if state.suppression() == Some(Keyword::Ignore) {
            return;
        }
        self.forest.append_text(state.insertion_point(), text);
    }

    fn directive(
        &mut self,
        state: &mut TemplateState<'_>,
        directive: Directive<'_>,
        raw: &str,
        span: Range<usize>,
    ) -> Result<(), TemplateError> {
        match state.suppression() {
            Some(Keyword::Ignore) => {
                if directive.closer && directive.keyword == Keyword::Ignore {
                    state.stack.pop();
                }
                return Ok(());
            }
            Some(Keyword::Neglect) => {
                if directive.closer && directive.keyword == Keyword::Neglect {
                    state.stack.pop();
                } else {
                    self.forest.append_text(state.insertion_point(), raw);
                }
                return Ok(());
            }
            _ => {}
        }

        if directive.closer {
            if self.ends_outer_chain(state, directive.keyword) {
                // `{{if a}}{{if b}}x{{/if}}{{else}}y{{/if}}`: the `else` was
                // taken as following the inner `if`, but this closer says it
                // continues the outer one.
                let arm = state.stack.pop().and_then(|open| open.node);
                let enclosing = state.stack.pop().and_then(|open| open.node);
                if let (Some(arm), Some(enclosing)) = (arm, enclosing) {
                    let parent = self.forest.parent(enclosing);
                    self.forest.move_block(arm, parent);
                }
                return Ok(());
            }
            return match state.stack.pop() {
                None => Err(state.error(
                    TemplateError::structural(format!(
                        "No opening tag: got closer \"{}\" without opener.",
                        directive.keyword
                    )),
                    span,
                )),
                Some(open) if open.closer != directive.keyword => Err(state.error(
                    TemplateError::structural(format!(
                        "Invalid closer: got \"{}\", expected \"{}\".",
                        directive.keyword, open.closer
                    )),
                    span,
                )),
                Some(_) => Ok(()),
            };
        }

        if let Some(open) = state.stack.last() {
            if open.keyword == Keyword::Else
                && open.closer != Keyword::Else
                && matches!(directive.keyword, Keyword::ElseIf | Keyword::Else)
                && !self.last_child_is_conditional(open)
            {
                return Err(state.error(
                    TemplateError::generation(format!(
                        "\"{}\" cannot follow \"else\" in the same chain.",
                        directive.keyword
                    )),
                    span,
                ));
            }
        }

        if directive.keyword == Keyword::Ignore {
            self.check_depth(state, &span)?;
            state.stack.push(OpenBlock {
                keyword: Keyword::Ignore,
                node: None,
                closer: Keyword::Ignore,
            });
            return Ok(());
        }

        let mut closer = directive.keyword;
        if self.continues_inline(state, directive.keyword) {
            // `{{if a}}x{{else}}y{{/if}}`: the open arm ends here and the
            // whole chain is closed by the closer of its `if`.
            if let Some(open) = state.stack.pop() {
                closer = open.closer;
            }
        }
        if !directive.keyword.is_childless() || directive.keyword == Keyword::Import {
            self.check_depth(state, &span)?;
        }

        let parent = state.insertion_point();
        let id = self.forest.append(
            parent,
            Node::Block(Block {
                keyword: directive.keyword,
                argument: directive.argument.to_string(),
                parent,
                children: Vec::new(),
                template_id: state.template_id.map(str::to_string),
                span,
            }),
        );

        match directive.keyword {
            Keyword::Import => self.inline_import(state, id),
            k if k.is_childless() => Ok(()),
            keyword => {
                state.stack.push(OpenBlock {
                    keyword,
                    node: Some(id),
                    closer,
                });
                Ok(())
            }
        }
    }

    /// Fail if one more open block would exceed the nesting limit.
    fn check_depth(&self, state: &TemplateState<'_>, span: &Range<usize>) -> Result<(), TemplateError> {
        if self.outer_depth + state.stack.len() < self.limits.max_nesting_depth {
            return Ok(());
        }
        Err(state.error(
            TemplateError::structural(format!(
                "Nesting depth exceeds the limit of {}.",
                self.limits.max_nesting_depth
            )),
            span.clone(),
        ))
    }

    /// An `elseif`/`else` continues the innermost open `if`/`elseif` arm
    /// unless that arm's last child is a conditional it can follow as a
    /// sibling.
    fn continues_inline(&self, state: &TemplateState<'_>, keyword: Keyword) -> bool {
        if !matches!(keyword, Keyword::ElseIf | Keyword::Else) {
            return false;
        }
        match state.stack.last() {
            Some(open) if matches!(open.keyword, Keyword::If | Keyword::ElseIf) => {
                !self.last_child_is_conditional(open)
            }
            _ => false,
        }
    }

    /// A closer naming the chain of the enclosing `if`/`elseif` while a
    /// sibling-form `elseif`/`else` is innermost.
    fn ends_outer_chain(&self, state: &TemplateState<'_>, closer: Keyword) -> bool {
        let [.., enclosing, arm] = state.stack.as_slice() else {
            return false;
        };
        matches!(arm.keyword, Keyword::ElseIf | Keyword::Else)
            && arm.closer == arm.keyword
            && arm.closer != closer
            && matches!(enclosing.keyword, Keyword::If | Keyword::ElseIf)
            && enclosing.closer == closer
    }

    fn last_child_is_conditional(&self, open: &OpenBlock) -> bool {
        let last_child = open
            .node
            .and_then(|id| self.forest.block(id))
            .and_then(|block| block.children.last().copied());
        matches!(
            last_child.and_then(|id| self.forest.block(id)),
            Some(block) if block.keyword.is_conditional()
        )
    }

    fn inline_import(&mut self, state: &TemplateState<'_>, id: NodeId) -> Result<(), TemplateError> {
        let Some(block) = self.forest.block(id) else {
            return Ok(());
        };
        let located = |e: TemplateError| e.at_block(block);

        let arguments = parse_import(&block.argument).map_err(located)?;
        let target = arguments.template_id.to_string();

        if self.chain.iter().any(|t| t.as_deref() == Some(target.as_str())) {
            let mut cycle: Vec<&str> = self
                .chain
                .iter()
                .map(|t| t.as_deref().unwrap_or("<anonymous>"))
                .collect();
            cycle.push(&target);
            return Err(located(TemplateError::structural(format!(
                "Recursive import of '{}': {}.",
                target,
                cycle.join(" -> ")
            ))));
        }
        if self.chain.len() > self.limits.max_import_depth {
            return Err(located(TemplateError::structural(format!(
                "Import depth exceeds the limit of {}.",
                self.limits.max_import_depth
            ))));
        }

        let Some(imported) = self.resolver.resolve(&target) else {
            return Err(located(TemplateError::resolution(format!(
                "Could not find template '{}' for import expression.",
                target
            ))));
        };

        log::trace!(
            "inlining '{}' into {}",
            target,
            state.template_id.unwrap_or("anonymous template")
        );
        let text = normalize(&imported.text);
        let outer_depth = self.outer_depth;
        self.outer_depth += state.stack.len() + 1;
        let built = self.build(&text, Some(&imported.id), Some(id));
        self.outer_depth = outer_depth;
        built
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ErrorKind;
    use crate::source::NoImports;
    use pretty_assertions::assert_eq;

    const LIMITS: Limits = Limits {
        max_import_depth: 32,
        max_nesting_depth: 64,
    };

    fn outline(source: &str) -> String {
        build_forest(source, Some("t"), &NoImports, LIMITS).unwrap().outline()
    }

    fn fails(source: &str, resolver: &dyn ImportResolver) -> TemplateError {
        build_forest(source, Some("t"), resolver, LIMITS).unwrap_err()
    }

    #[test]
    fn nests_containers() {
        assert_eq!(
            outline("a{{if x}}b{{each i in xs}}{{print i}}{{/each}}{{/if}}c"),
            "text \"a\"\nif x\n  text \"b\"\n  each i in xs\n    print i\ntext \"c\"\n"
        );
    }

    #[test]
    fn unknown_directives_are_text() {
        assert_eq!(outline("{{name}}!"), "text \"{{name}}\"\ntext \"!\"\n");
    }

    #[test]
    fn ignore_drops_everything_until_its_closer() {
        assert_eq!(
            outline("a{{ignore}}{{if}}{{print x}}b{{ignore}}{{/ignore}}c"),
            "text \"a\"\ntext \"c\"\n"
        );
    }

    #[test]
    fn neglect_keeps_directives_as_text() {
        assert_eq!(
            outline("{{neglect}}{{print x}}{{/if}}{{/neglect}}"),
            "neglect\n  text \"{{print x}}\"\n  text \"{{/if}}\"\n"
        );
    }

    #[test]
    fn inline_else_closes_with_the_if() {
        assert_eq!(
            outline("{{if a}}A{{elseif b}}B{{else}}C{{/if}}!"),
            "if a\n  text \"A\"\nelseif b\n  text \"B\"\nelse\n  text \"C\"\ntext \"!\"\n"
        );
        let err = fails("{{if a}}A{{else}}B{{/else}}", &NoImports);
        assert_eq!(err.message, "Invalid closer: got \"else\", expected \"if\".");
    }

    #[test]
    fn sibling_else_follows_a_closed_nested_if() {
        assert_eq!(
            outline("{{if a}}{{if b}}x{{/if}}{{else}}y{{/else}}{{/if}}"),
            "if a\n  if b\n    text \"x\"\n  else\n    text \"y\"\n"
        );
        assert_eq!(
            outline("{{if a}}1{{/if}}{{else}}2{{/else}}"),
            "if a\n  text \"1\"\nelse\n  text \"2\"\n"
        );
    }

    #[test]
    fn closer_of_the_outer_if_ends_a_trailing_else() {
        assert_eq!(
            outline("{{if a}}{{if b}}x{{/if}}{{else}}y{{/if}}z"),
            "if a\n  if b\n    text \"x\"\nelse\n  text \"y\"\ntext \"z\"\n"
        );
        assert_eq!(
            outline("{{each i in xs}}{{if a}}{{if b}}x{{/if}}{{else}}y{{/if}}{{/each}}"),
            "each i in xs\n  if a\n    if b\n      text \"x\"\n  else\n    text \"y\"\n"
        );
    }

    #[test]
    fn second_else_in_an_inline_chain() {
        let err = fails("{{if a}}1{{else}}2{{else}}3{{/if}}", &NoImports);
        assert_eq!(err.kind, ErrorKind::Generation);
        assert_eq!(err.message, "\"else\" cannot follow \"else\" in the same chain.");
        assert_eq!(err.span, Some(18..26));

        let err = fails("{{if a}}1{{else}}2{{elseif b}}3{{/if}}", &NoImports);
        assert_eq!(err.message, "\"elseif\" cannot follow \"else\" in the same chain.");
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let deep = |n: usize| format!("{}x{}", "{{if true}}".repeat(n), "{{/if}}".repeat(n));
        assert!(build_forest(&deep(64), None, &NoImports, LIMITS).is_ok());

        let err = build_forest(&deep(10_000), None, &NoImports, LIMITS).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Structural);
        assert_eq!(err.message, "Nesting depth exceeds the limit of 64.");
        assert_eq!(err.span, Some(64 * 11..65 * 11));

        let tight = Limits {
            max_nesting_depth: 1,
            ..LIMITS
        };
        assert!(build_forest("{{if a}}1{{elseif b}}2{{else}}3{{/if}}", None, &NoImports, tight).is_ok());
        assert!(build_forest("{{ignore}}{{if a}}{{if b}}{{/ignore}}", None, &NoImports, tight).is_ok());
        assert!(build_forest("{{if a}}{{neglect}}{{/neglect}}{{/if}}", None, &NoImports, tight).is_err());
    }

    #[test]
    fn imports_count_towards_nesting() {
        let limits = Limits {
            max_nesting_depth: 3,
            ..LIMITS
        };
        let mut sources = HashMap::new();
        sources.insert("shallow".to_string(), "{{if b}}y{{/if}}".to_string());
        sources.insert("deep".to_string(), "{{if b}}{{if c}}y{{/if}}{{/if}}".to_string());
        assert!(build_forest("{{if a}}{{import 'shallow'}}{{/if}}", None, &sources, limits).is_ok());
        let err = build_forest("{{if a}}{{import 'deep'}}{{/if}}", None, &sources, limits).unwrap_err();
        assert!(err.message.contains("limit of 3"), "{}", err.message);
        assert_eq!(err.template_id.as_deref(), Some("deep"));
    }

    #[test]
    fn unbalanced_directives() {
        let err = fails("{{/if}}", &NoImports);
        assert_eq!(err.kind, ErrorKind::Structural);
        assert!(err.message.contains("without opener"));
        assert_eq!(err.span, Some(0..7));

        let err = fails("{{if a}}{{/each}}", &NoImports);
        assert_eq!(err.message, "Invalid closer: got \"each\", expected \"if\".");

        let err = fails("{{if a}}x", &NoImports);
        assert_eq!(err.message, "No closing tag: got \"if\" without closer.");
        assert_eq!(err.span, Some(0..8));
    }

    #[test]
    fn imports_are_inlined_under_the_import_block() {
        let mut sources = HashMap::new();
        sources.insert("row".to_string(), "<td>\n{{print cell}}</td>".to_string());
        let forest = build_forest("{{import 'row'}}", Some("t"), &sources, LIMITS).unwrap();
        assert_eq!(
            forest.outline(),
            "import 'row'\n  text \"<td>\"\n  print cell\n  text \"</td>\"\n"
        );
        let import = forest.roots()[0];
        let Some(Node::Block(print)) = forest
            .block(import)
            .map(|b| forest.node(b.children[1]))
        else {
            panic!("expected print block");
        };
        assert_eq!(print.template_id.as_deref(), Some("row"));
        assert_eq!(print.parent, Some(import));
    }

    #[test]
    fn unresolved_import_is_a_resolution_error() {
        let err = fails("{{import 'missing'}}", &NoImports);
        assert_eq!(err.kind, ErrorKind::Resolution);
        assert_eq!(err.template_id.as_deref(), Some("t"));
    }

    #[test]
    fn recursive_imports_are_rejected() {
        let mut sources = HashMap::new();
        sources.insert("a".to_string(), "{{import 'b'}}".to_string());
        sources.insert("b".to_string(), "{{import 'a'}}".to_string());
        let err = build_forest("{{import 'a'}}", Some("root"), &sources, LIMITS).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Structural);
        assert_eq!(err.message, "Recursive import of 'a': root -> a -> b -> a.");
        assert_eq!(err.template_id.as_deref(), Some("b"));
    }

    #[test]
    fn import_depth_is_bounded() {
        let mut sources = HashMap::new();
        for i in 0..5 {
            sources.insert(format!("t{}", i), format!("{{{{import 't{}'}}}}", i + 1));
        }
        sources.insert("t5".to_string(), "end".to_string());
        assert!(build_forest("{{import 't0'}}", None, &sources, Limits { max_import_depth: 8, ..LIMITS }).is_ok());
        let err = build_forest("{{import 't0'}}", None, &sources, Limits { max_import_depth: 3, ..LIMITS }).unwrap_err();
        assert!(err.message.contains("limit of 3"));
    }
}
