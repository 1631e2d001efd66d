use std::fmt;

/// Directive keywords: the first word inside `{{ }}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Print,
    If,
    ElseIf,
    Else,
    For,
    Each,
    Import,
    Execute,
    Ignore,
    Neglect,
}

impl Keyword {
    pub const ALL: [Keyword; 10] = [
        Keyword::Print,
        Keyword::If,
        Keyword::ElseIf,
        Keyword::Else,
        Keyword::For,
        Keyword::Each,
        Keyword::Import,
        Keyword::Execute,
        Keyword::Ignore,
        Keyword::Neglect,
    ];

    pub fn from_name(name: &str) -> Option<Keyword> {
        Keyword::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Print => "print",
            Keyword::If => "if",
            Keyword::ElseIf => "elseif",
            Keyword::Else => "else",
            Keyword::For => "for",
            Keyword::Each => "each",
            Keyword::Import => "import",
            Keyword::Execute => "execute",
            Keyword::Ignore => "ignore",
            Keyword::Neglect => "neglect",
        }
    }

    /// Childless directives are never pushed on the open-block stack and
    /// never expect a closer.
    pub fn is_childless(self) -> bool {
        matches!(self, Keyword::Print | Keyword::Import | Keyword::Execute)
    }

    pub fn is_conditional(self) -> bool {
        matches!(self, Keyword::If | Keyword::ElseIf | Keyword::Else)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Second-order keywords, only meaningful inside `each` and `import` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    In,
    Count,
    Key,
    Context,
}

impl Modifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::In => "in",
            Modifier::Count => "count",
            Modifier::Key => "key",
            Modifier::Context => "context",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for keyword in Keyword::ALL {
            assert_eq!(Keyword::from_name(keyword.as_str()), Some(keyword));
        }
        assert_eq!(Keyword::from_name("Print"), None);
        assert_eq!(Keyword::from_name("count"), None);
    }

    #[test]
    fn childless_set() {
        let childless: Vec<_> = Keyword::ALL.into_iter().filter(|k| k.is_childless()).collect();
        assert_eq!(childless, vec![Keyword::Print, Keyword::Import, Keyword::Execute]);
    }
}
