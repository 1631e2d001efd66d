pub mod arguments;
pub mod directive;
pub mod expression;
mod structural;
pub mod tokenizer;

pub use expression::{
    ExpressionError, MAX_EXPRESSION_DEPTH, parse_expression, parse_loop_clause, parse_statements,
};
pub use structural::Limits;

use crate::block::BlockForest;
use crate::error::TemplateError;
use crate::source::{ImportResolver, normalize};

/// Parser entry point: template text in, block forest out.
pub struct Parser<'s> {
    source: &'s str,
    template_id: Option<&'s str>,
    limits: Limits,
}

impl<'s> Parser<'s> {
    pub const DEFAULT_MAX_IMPORT_DEPTH: usize = 32;
    /// Code generation and rendering recurse once per level, so this also
    /// bounds their stack use.
    pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;

    pub fn new(source: &'s str, template_id: Option<&'s str>) -> Self {
        Parser {
            source,
            template_id,
            limits: Limits {
                max_import_depth: Self::DEFAULT_MAX_IMPORT_DEPTH,
                max_nesting_depth: Self::DEFAULT_MAX_NESTING_DEPTH,
            },
        }
    }

    pub fn with_max_import_depth(mut self, depth: usize) -> Self {
        self.limits.max_import_depth = depth;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.limits.max_nesting_depth = depth;
        self
    }

    /// Normalize the source and build its block tree, inlining imports
    /// found through `resolver`.
    pub fn parse(&self, resolver: &dyn ImportResolver) -> Result<BlockForest, TemplateError> {
        if let Some(id) = self.template_id {
            if id.trim().is_empty() {
                return Err(TemplateError::source_error("Template id must not be empty."));
            }
        }
        let normalized = normalize(self.source);
        log::debug!(
            "parsing {} ({} bytes normalized)",
            self.template_id.unwrap_or("anonymous template"),
            normalized.len()
        );
        structural::build_forest(&normalized, self.template_id, resolver, self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::NoImports;

    #[test]
    fn normalizes_before_building() {
        let forest = Parser::new("{{if a}}\n\tyes\n{{/if}}", Some("page"))
            .parse(&NoImports)
            .unwrap();
        assert_eq!(forest.outline(), "if a\n  text \"yes\"\n");
        assert_eq!(forest.template_id.as_deref(), Some("page"));
    }

    #[test]
    fn empty_source_is_an_empty_forest() {
        let forest = Parser::new("", None).parse(&NoImports).unwrap();
        assert!(forest.roots().is_empty());
    }

    #[test]
    fn nesting_limit_is_configurable() {
        let source = "{{if a}}{{each x in xs}}{{print x}}{{/each}}{{/if}}";
        assert!(Parser::new(source, None).with_max_nesting_depth(2).parse(&NoImports).is_ok());
        let err = Parser::new(source, None)
            .with_max_nesting_depth(1)
            .parse(&NoImports)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Structural);
    }

    #[test]
    fn blank_template_id_is_a_source_error() {
        let err = Parser::new("x", Some(" ")).parse(&NoImports).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Source);
    }
}
