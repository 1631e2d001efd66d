//! Code generation and rendering for Emboss templates, plus the `Emboss`
//! context object that ties parsing, configuration and the template
//! registry together.

pub mod builtins;
pub mod codegen;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod evaluator;
mod executor;
pub mod program;
pub mod registry;
pub mod runtime_value;

pub use config::Config;
pub use engine::{Emboss, Renderable};
pub use error::{ConfigError, RuntimeError};
pub use program::CompiledTemplate;
pub use registry::TemplateRegistry;
pub use runtime_value::{Object, Value};
