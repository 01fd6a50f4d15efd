//! XML handling: hardened loading, an owned element tree, and exclusive C14N

pub mod c14n;
mod loader;
mod tree;

pub use c14n::{canonicalize, C14nError, C14nOptions, EXCLUSIVE_C14N};
pub use loader::{SecureXmlLoader, XmlLoadError, MAX_DOCUMENT_SIZE};
pub use tree::{XmlAttribute, XmlElement, XmlNode};
