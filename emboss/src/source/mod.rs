use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

/// Raw template text plus the identifier it is known by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub id: String,
    pub text: String,
}

impl TemplateSource {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        TemplateSource {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Locates the source of a template named by an `import` directive.
pub trait ImportResolver {
    fn resolve(&self, id: &str) -> Option<TemplateSource>;
}

/// Resolver for hosts without sub-templates: every import is unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl ImportResolver for NoImports {
    fn resolve(&self, _id: &str) -> Option<TemplateSource> {
        None
    }
}

impl ImportResolver for HashMap<String, String> {
    fn resolve(&self, id: &str) -> Option<TemplateSource> {
        self.get(id).map(|text| TemplateSource::new(id, text.clone()))
    }
}

impl ImportResolver for BTreeMap<String, String> {
    fn resolve(&self, id: &str) -> Option<TemplateSource> {
        self.get(id).map(|text| TemplateSource::new(id, text.clone()))
    }
}

impl<R: ImportResolver + ?Sized> ImportResolver for &R {
    fn resolve(&self, id: &str) -> Option<TemplateSource> {
        (**self).resolve(id)
    }
}

impl<R: ImportResolver + ?Sized> ImportResolver for Box<R> {
    fn resolve(&self, id: &str) -> Option<TemplateSource> {
        (**self).resolve(id)
    }
}

/// Resolves `id` to `<root>/<id>.<extension>`.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
    extension: String,
}

impl DirectoryResolver {
    pub const DEFAULT_EXTENSION: &'static str = "emboss";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryResolver {
            root: root.into(),
            extension: Self::DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{}", id, self.extension))
    }
}

impl ImportResolver for DirectoryResolver {
    fn resolve(&self, id: &str) -> Option<TemplateSource> {
        // Ids are names, not paths.
        if id.contains(['/', '\\']) || id.starts_with('.') {
            log::warn!("refusing to resolve import id '{}' outside {}", id, self.root.display());
            return None;
        }
        let path = self.path_for(id);
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(TemplateSource::new(id, text)),
            Err(e) if e.kind() == IoErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("cannot read template '{}' at {}: {}", id, path.display(), e);
                None
            }
        }
    }
}

/// Characters stripped from the whole source before tokenizing: control
/// spacing, the Unicode space separators, and zero-width characters.
pub fn is_bloatspace(c: char) -> bool {
    matches!(
        c,
        '\u{000C}'
            | '\n'
            | '\r'
            | '\t'
            | '\u{000B}'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{180E}'
            | '\u{2000}'..='\u{200D}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{2060}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

/// Strip bloatspace from template text. Plain spaces are kept.
pub fn normalize(text: &str) -> String {
    text.chars().filter(|&c| !is_bloatspace(c)).collect()
}
