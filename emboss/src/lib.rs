//! Parsing half of the Emboss template compiler: normalization,
//! tokenizing, directive classification, the block tree builder with
//! import inlining, and the host expression language.

pub mod block;
pub mod error;
pub mod expression;
pub mod parser;
pub mod source;

pub use block::{Block, BlockForest, Keyword, Node, NodeId};
pub use error::{ErrorKind, TemplateError};
pub use parser::Parser;
pub use source::{DirectoryResolver, ImportResolver, NoImports, TemplateSource};

/// Name reserved for the renderer's internal state. Data contexts and
/// import contexts may not bind it.
pub const RESERVED_NAME: &str = "EmbossInternalData";
