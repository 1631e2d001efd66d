use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use thiserror::Error;

use crate::block::Block;

/// Which stage of the pipeline rejected the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid source text or data context.
    Source,
    /// Unbalanced directives, malformed `each`/`import` arguments,
    /// `elseif`/`else` without `if`, import cycles.
    Structural,
    /// An imported template could not be found.
    Resolution,
    /// A directive argument is not valid host-language code.
    Generation,
    /// An embedded expression or statement failed while rendering.
    Render,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Source => "source",
            ErrorKind::Structural => "structural",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Generation => "generation",
            ErrorKind::Render => "render",
        };
        f.write_str(name)
    }
}

/// The directive an error points at, as it was written in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveText {
    pub keyword: String,
    pub argument: String,
}

impl fmt::Display for DirectiveText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.argument.is_empty() {
            write!(f, "{}", self.keyword)
        } else {
            write!(f, "{} {}", self.keyword, self.argument)
        }
    }
}

/// Every failure reported by `compile` and `render`.
#[derive(Debug, Clone, Error)]
#[error(
    "{kind} error ({template}): {directive}{message}",
    template = template_label(.template_id),
    directive = directive_label(.directive)
)]
pub struct TemplateError {
    pub kind: ErrorKind,
    pub message: String,
    pub template_id: Option<String>,
    pub directive: Option<DirectiveText>,
    /// Byte span in the normalized source of `template_id`.
    pub span: Option<Range<usize>>,
    pub notes: Vec<String>,
}

fn template_label(template_id: &Option<String>) -> String {
    match template_id {
        Some(id) => format!("template '{}'", id),
        None => "anonymous template".to_string(),
    }
}

fn directive_label(directive: &Option<DirectiveText>) -> String {
    match directive {
        Some(directive) => format!("in block \"{}\": ", directive),
        None => String::new(),
    }
}

impl TemplateError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        TemplateError {
            kind,
            message: message.into(),
            template_id: None,
            directive: None,
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn source_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Source, message)
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Structural, message)
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution, message)
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generation, message)
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Render, message)
    }

    pub fn with_template(mut self, template_id: Option<&str>) -> Self {
        self.template_id = template_id.map(str::to_string);
        self
    }

    pub fn with_directive(mut self, keyword: impl Into<String>, argument: impl Into<String>) -> Self {
        self.directive = Some(DirectiveText {
            keyword: keyword.into(),
            argument: argument.into(),
        });
        self
    }

    pub fn with_span(mut self, span: Range<usize>) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Attach the template id, directive text and span of `block`.
    pub fn at_block(self, block: &Block) -> Self {
        self.with_template(block.template_id.as_deref())
            .with_directive(block.keyword.as_str(), block.argument.clone())
            .with_span(block.span.clone())
    }

    /// Convert to a codespan-reporting Diagnostic for display. `file_id`
    /// must refer to the normalized source of `self.template_id`.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        let mut diagnostic = Diagnostic::new(Severity::Error)
            .with_message(self.to_string())
            .with_notes(self.notes.clone());
        if let Some(span) = &self.span {
            diagnostic = diagnostic.with_labels(vec![Label::primary(file_id, span.clone())]);
        }
        diagnostic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_template_and_directive() {
        let err = TemplateError::structural("Item identifier not found.")
            .with_template(Some("list"))
            .with_directive("each", "1 in items");
        assert_eq!(
            err.to_string(),
            "structural error (template 'list'): in block \"each 1 in items\": Item identifier not found."
        );
    }

    #[test]
    fn display_anonymous_template_without_directive() {
        let err = TemplateError::render("boom");
        assert_eq!(err.to_string(), "render error (anonymous template): boom");
    }
}
