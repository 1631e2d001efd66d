use std::ops::Range;

pub const OPEN: &str = "{{";
pub const CLOSE: &str = "}}";

/// A piece of normalized template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text {
        text: &'a str,
        span: Range<usize>,
    },
    /// `raw` includes the delimiters, `inner` is the text between them.
    Directive {
        raw: &'a str,
        inner: &'a str,
        span: Range<usize>,
    },
}

impl Segment<'_> {
    pub fn span(&self) -> Range<usize> {
        match self {
            Segment::Text { span, .. } | Segment::Directive { span, .. } => span.clone(),
        }
    }
}

/// Split `source` into literal text and `{{ ... }}` directives. Empty text
/// between adjacent directives is not emitted.
pub fn tokenize(source: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    while cursor < source.len() {
        let Some(offset) = source[cursor..].find(OPEN) else {
            break;
        };
        let open = cursor + offset;
        let body_start = open + OPEN.len();
        let Some(body_end) = directive_end(source, body_start) else {
            break;
        };

        if open > cursor {
            segments.push(Segment::Text {
                text: &source[cursor..open],
                span: cursor..open,
            });
        }
        let end = body_end + CLOSE.len();
        segments.push(Segment::Directive {
            raw: &source[open..end],
            inner: &source[body_start..body_end],
            span: open..end,
        });
        cursor = end;
    }

    if cursor < source.len() {
        segments.push(Segment::Text {
            text: &source[cursor..],
            span: cursor..source.len(),
        });
    }

    segments
}

/// Byte offset of the `}}` closing a directive whose body starts at `start`.
///
/// Quoted strings and `{ }` pairs opened inside the body are skipped over.
/// When that scan runs off the end, the first plain `}}` is used instead.
fn directive_end(source: &str, start: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth == 0 && bytes.get(i + 1) == Some(&b'}') => return Some(i),
                b'}' => depth = depth.saturating_sub(1),
                _ => {}
            },
        }
        i += 1;
    }

    source[start..].find(CLOSE).map(|offset| start + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inners(source: &str) -> Vec<String> {
        tokenize(source)
            .into_iter()
            .map(|segment| match segment {
                Segment::Text { text, .. } => format!("text:{}", text),
                Segment::Directive { inner, .. } => format!("dir:{}", inner),
            })
            .collect()
    }

    #[test]
    fn splits_text_and_directives() {
        assert_eq!(
            inners("Hello, {{print name}}!"),
            vec!["text:Hello, ", "dir:print name", "text:!"]
        );
    }

    #[test]
    fn adjacent_directives_emit_no_empty_text() {
        assert_eq!(
            inners("{{if a}}{{/if}}"),
            vec!["dir:if a", "dir:/if"]
        );
    }

    #[test]
    fn braces_and_quotes_inside_directive() {
        assert_eq!(
            inners("{{import 'row' context {x: 1}}}tail"),
            vec!["dir:import 'row' context {x: 1}", "text:tail"]
        );
        assert_eq!(
            inners("{{print '}}'}}"),
            vec!["dir:print '}}'"]
        );
    }

    #[test]
    fn unbalanced_directive_falls_back_to_plain_close() {
        assert_eq!(
            inners("{{print 'open}} rest"),
            vec!["dir:print 'open", "text: rest"]
        );
    }

    #[test]
    fn unterminated_directive_is_text() {
        assert_eq!(inners("a {{print b"), vec!["text:a {{print b"]);
    }

    #[test]
    fn spans_cover_source() {
        let segments = tokenize("ab{{print x}}cd");
        let spans: Vec<_> = segments.iter().map(Segment::span).collect();
        assert_eq!(spans, vec![0..2, 2..13, 13..15]);
    }
}
