//! Minimal XML tree codec
//!
//! Just enough XML for the store's on-disk format: an element tree,
//! a strict parser, and a pretty-printing serializer. No namespaces,
//! no DTDs, no processing instructions beyond the declaration.

pub mod node;
pub mod reader;
pub mod writer;

pub use node::Element;
pub use reader::{parse_document, ParseError};
pub use writer::write_document;
