use crate::block::Keyword;

/// A classified directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<'a> {
    pub keyword: Keyword,
    pub argument: &'a str,
    pub closer: bool,
}

/// Classify the text between `{{` and `}}`. Returns `None` when the leading
/// word is not a keyword, in which case the directive is literal text.
pub fn classify(inner: &str) -> Option<Directive<'_>> {
    let trimmed = inner.trim();
    let (closer, body) = match trimmed.strip_prefix('/') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };
    let (name, argument) = match body.find(char::is_whitespace) {
        Some(index) => (&body[..index], body[index..].trim()),
        None => (body, ""),
    };
    let keyword = Keyword::from_name(name)?;
    Some(Directive {
        keyword,
        argument,
        closer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("print name", Keyword::Print, "name", false)]
    #[case(" print  a + b ", Keyword::Print, "a + b", false)]
    #[case("/if", Keyword::If, "", true)]
    #[case("/ each ", Keyword::Each, "", true)]
    #[case("else", Keyword::Else, "", false)]
    #[case("each item in items count i", Keyword::Each, "item in items count i", false)]
    fn classifies_keywords(
        #[case] inner: &str,
        #[case] keyword: Keyword,
        #[case] argument: &str,
        #[case] closer: bool,
    ) {
        assert_eq!(
            classify(inner),
            Some(Directive {
                keyword,
                argument,
                closer
            })
        );
    }

    #[rstest]
    #[case("")]
    #[case("name")]
    #[case("printx")]
    #[case("/unknown")]
    #[case("Print x")]
    fn unknown_keywords_are_not_directives(#[case] inner: &str) {
        assert_eq!(classify(inner), None);
    }
}
