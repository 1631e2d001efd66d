use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use emboss::{BlockForest, ImportResolver, NoImports, Parser, TemplateError, TemplateSource};

use crate::codegen;
use crate::config::Config;
use crate::program::CompiledTemplate;
use crate::registry::TemplateRegistry;
use crate::runtime_value::Value;

/// Something `Emboss::render` accepts: a compiled template, or source text
/// to compile first.
#[derive(Debug, Clone, Copy)]
pub enum Renderable<'a> {
    Compiled(&'a CompiledTemplate),
    Source {
        text: &'a str,
        template_id: Option<&'a str>,
    },
}

impl<'a> From<&'a CompiledTemplate> for Renderable<'a> {
    fn from(template: &'a CompiledTemplate) -> Self {
        Renderable::Compiled(template)
    }
}

impl<'a> From<&'a Arc<CompiledTemplate>> for Renderable<'a> {
    fn from(template: &'a Arc<CompiledTemplate>) -> Self {
        Renderable::Compiled(template)
    }
}

impl<'a> From<&'a str> for Renderable<'a> {
    fn from(text: &'a str) -> Self {
        Renderable::Source {
            text,
            template_id: None,
        }
    }
}

impl<'a> From<&'a TemplateSource> for Renderable<'a> {
    fn from(source: &'a TemplateSource) -> Self {
        Renderable::Source {
            text: &source.text,
            template_id: Some(&source.id),
        }
    }
}

/// The compiler context: configuration, import lookup and the registry of
/// named templates.
pub struct Emboss {
    config: Config,
    resolver: Box<dyn ImportResolver + Send + Sync>,
    /// Sources registered by id; consulted before `resolver`.
    sources: RwLock<HashMap<String, String>>,
    registry: TemplateRegistry,
}

impl Default for Emboss {
    fn default() -> Self {
        Emboss::with_config(Config::default())
    }
}

impl Emboss {
    pub fn new() -> Self {
        Emboss::default()
    }

    pub fn with_config(config: Config) -> Self {
        Emboss {
            config,
            resolver: Box::new(NoImports),
            sources: RwLock::new(HashMap::new()),
            registry: TemplateRegistry::new(),
        }
    }

    /// Look up imported templates through `resolver`.
    pub fn with_resolver(mut self, resolver: impl ImportResolver + Send + Sync + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn strict_scoping(&self) -> bool {
        self.config.strict_scoping
    }

    /// Affects templates compiled afterwards.
    pub fn set_strict_scoping(&mut self, strict: bool) {
        self.config.strict_scoping = strict;
    }

    /// Make `text` importable as `id`. Returns true when a source was replaced.
    pub fn register_source(&self, id: &str, text: impl Into<String>) -> bool {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(id.to_string(), text.into()).is_some()
    }

    /// Build the block tree of `source` without generating code.
    pub fn parse(&self, source: &str, template_id: Option<&str>) -> Result<BlockForest, TemplateError> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        let resolver = Layered {
            sources: &sources,
            fallback: self.resolver.as_ref(),
        };
        Parser::new(source, template_id)
            .with_max_import_depth(self.config.max_import_depth)
            .with_max_nesting_depth(self.config.max_nesting_depth)
            .parse(&resolver)
    }

    pub fn compile(&self, source: &str, template_id: Option<&str>) -> Result<CompiledTemplate, TemplateError> {
        let forest = self.parse(source, template_id)?;
        codegen::generate(&forest, self.config.strict_scoping)
    }

    pub fn render<'a>(
        &self,
        template: impl Into<Renderable<'a>>,
        data: Option<&Value>,
    ) -> Result<String, TemplateError> {
        match template.into() {
            Renderable::Compiled(compiled) => compiled.render(data),
            Renderable::Source { text, template_id } => self.compile(text, template_id)?.render(data),
        }
    }

    /// Store a compiled template by id. Returns true when an earlier
    /// template with the same id was replaced.
    pub fn store(&self, id: &str, template: impl Into<Arc<CompiledTemplate>>) -> bool {
        self.registry.store(id, template.into())
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledTemplate>> {
        self.registry.get(id)
    }

    pub fn render_stored(&self, id: &str, data: Option<&Value>) -> Result<String, TemplateError> {
        let template = self.get(id).ok_or_else(|| {
            TemplateError::resolution(format!("No stored template '{}'.", id)).with_template(Some(id))
        })?;
        template.render(data)
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }
}

/// Registered sources first, then the configured resolver.
struct Layered<'a> {
    sources: &'a HashMap<String, String>,
    fallback: &'a dyn ImportResolver,
}

impl ImportResolver for Layered<'_> {
    fn resolve(&self, id: &str) -> Option<TemplateSource> {
        self.sources.resolve(id).or_else(|| self.fallback.resolve(id))
    }
}
