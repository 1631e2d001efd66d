//! Micro-grammars of the `each` and `import` arguments.
//!
//! Errors are structural and carry no location; callers attach the block.

use crate::block::Modifier;
use crate::error::TemplateError;
use crate::expression::is_identifier;
use crate::parser::expression::{Token, tokenize};

/// `<item> in <source> [count <c>] [key <k>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EachArguments {
    pub item: String,
    /// Raw text of the collection expression.
    pub source: String,
    pub count: Option<String>,
    pub key: Option<String>,
}

/// `'<id>' [context <expr>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportArguments<'a> {
    pub template_id: &'a str,
    pub context: Option<&'a str>,
}

pub fn parse_each(argument: &str) -> Result<EachArguments, TemplateError> {
    let argument = argument.trim();
    let Some((item, rest)) = split_word(argument) else {
        return Err(TemplateError::structural("Each arguments not found."));
    };
    if !is_identifier(item) {
        return Err(TemplateError::structural("Item identifier not found."));
    }
    let tail = match split_word(rest) {
        Some((word, tail)) if word == Modifier::In.as_str() => tail,
        _ => return Err(TemplateError::structural("Expected 'in' after the item identifier.")),
    };

    let tokens = tokenize(tail).map_err(|e| {
        TemplateError::structural(format!("Invalid collection expression: {}.", e.message))
    })?;

    let mut count = None;
    let mut key = None;
    let mut end = tokens.len();
    while end >= 2 {
        let Some(modifier) = modifier_at(&tokens[end - 2].0) else {
            if modifier_at(&tokens[end - 1].0).is_some() && ends_operand(&tokens[end - 2].0) {
                return Err(TemplateError::structural(format!(
                    "Missing identifier after '{}'.",
                    token_text(tail, &tokens[end - 1].1)
                )));
            }
            break;
        };
        // The collection expression must keep at least one operand.
        if end < 3 || !ends_operand(&tokens[end - 3].0) {
            break;
        }
        let name = match &tokens[end - 1].0 {
            Token::Ident(name) if is_identifier(name) => name.clone(),
            _ => {
                return Err(TemplateError::structural(format!(
                    "'{}' must be followed by an identifier.",
                    modifier.as_str()
                )));
            }
        };
        let slot = match modifier {
            Modifier::Count => &mut count,
            _ => &mut key,
        };
        if slot.is_some() {
            return Err(TemplateError::structural(format!(
                "Duplicate '{}' modifier.",
                modifier.as_str()
            )));
        }
        *slot = Some(name);
        end -= 2;
    }

    let source_end = tokens.get(end).map(|(_, span)| span.start).unwrap_or(tail.len());
    let source = tail[..source_end].trim();
    if source.is_empty() {
        return Err(TemplateError::structural("Collection expression not found."));
    }

    Ok(EachArguments {
        item: item.to_string(),
        source: source.to_string(),
        count,
        key,
    })
}

pub fn parse_import(argument: &str) -> Result<ImportArguments<'_>, TemplateError> {
    let argument = argument.trim();
    let quote = match argument.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return Err(TemplateError::structural("Missing template id in import expression.")),
    };
    let body = &argument[1..];
    let Some(close) = body.find(quote) else {
        return Err(TemplateError::structural("Unterminated template id in import expression."));
    };
    let template_id = &body[..close];
    if template_id.is_empty() {
        return Err(TemplateError::structural("Missing template id in import expression."));
    }

    let rest = body[close + 1..].trim();
    if rest.is_empty() {
        return Ok(ImportArguments {
            template_id,
            context: None,
        });
    }
    let keyword = Modifier::Context.as_str();
    match rest.strip_prefix(keyword) {
        Some(expr) if expr.is_empty() || expr.starts_with(char::is_whitespace) => {
            let expr = expr.trim();
            if expr.is_empty() {
                return Err(TemplateError::structural("Context argument missing."));
            }
            Ok(ImportArguments {
                template_id,
                context: Some(expr),
            })
        }
        _ => Err(TemplateError::structural(format!(
            "Unexpected text after template id: '{}'.",
            rest
        ))),
    }
}

fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    let index = text.find(char::is_whitespace)?;
    Some((&text[..index], text[index..].trim_start()))
}

fn modifier_at(token: &Token) -> Option<Modifier> {
    match token {
        Token::Ident(word) if word == Modifier::Count.as_str() => Some(Modifier::Count),
        Token::Ident(word) if word == Modifier::Key.as_str() => Some(Modifier::Key),
        _ => None,
    }
}

/// Tokens that can end an operand, so a following word starts a modifier.
fn ends_operand(token: &Token) -> bool {
    matches!(
        token,
        Token::Ident(_)
            | Token::Number(_)
            | Token::StringLit(_)
            | Token::True
            | Token::False
            | Token::Null
            | Token::Undefined
            | Token::RParen
            | Token::RBracket
            | Token::RBrace
    )
}

fn token_text<'a>(text: &'a str, span: &std::ops::Range<usize>) -> &'a str {
    &text[span.clone()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn each(item: &str, source: &str, count: Option<&str>, key: Option<&str>) -> EachArguments {
        EachArguments {
            item: item.to_string(),
            source: source.to_string(),
            count: count.map(str::to_string),
            key: key.map(str::to_string),
        }
    }

    #[rstest]
    #[case("item in items", each("item", "items", None, None))]
    #[case("row in data.rows count i", each("row", "data.rows", Some("i"), None))]
    #[case("v in obj key k count n", each("v", "obj", Some("n"), Some("k")))]
    #[case("x in counts", each("x", "counts", None, None))]
    #[case("x in [1, 2].concat count i", each("x", "[1, 2].concat", Some("i"), None))]
    #[case("x in count", each("x", "count", None, None))]
    #[case("x in keys(obj) key k", each("x", "keys(obj)", None, Some("k")))]
    fn parses_each_arguments(#[case] argument: &str, #[case] expected: EachArguments) {
        assert_eq!(parse_each(argument).unwrap(), expected);
    }

    #[rstest]
    #[case("", "Each arguments not found.")]
    #[case("1 in items", "Item identifier not found.")]
    #[case("item of items", "Expected 'in' after the item identifier.")]
    #[case("item in", "Expected 'in' after the item identifier.")]
    #[case("item in items count", "Missing identifier after 'count'.")]
    #[case("item in items count 3", "'count' must be followed by an identifier.")]
    #[case("item in items count i count j", "Duplicate 'count' modifier.")]
    fn rejects_malformed_each(#[case] argument: &str, #[case] message: &str) {
        assert_eq!(parse_each(argument).unwrap_err().message, message);
    }

    #[test]
    fn parses_import_arguments() {
        assert_eq!(
            parse_import("'row'").unwrap(),
            ImportArguments {
                template_id: "row",
                context: None
            }
        );
        assert_eq!(
            parse_import("\"row\" context {name: user.name}").unwrap(),
            ImportArguments {
                template_id: "row",
                context: Some("{name: user.name}")
            }
        );
    }

    #[rstest]
    #[case("row", "Missing template id in import expression.")]
    #[case("''", "Missing template id in import expression.")]
    #[case("'row", "Unterminated template id in import expression.")]
    #[case("'row' context ", "Context argument missing.")]
    #[case("'row' contextual x", "Unexpected text after template id: 'contextual x'.")]
    fn rejects_malformed_import(#[case] argument: &str, #[case] message: &str) {
        assert_eq!(parse_import(argument).unwrap_err().message, message);
    }
}
