//! Translating JVM class files to and from an XML document, and back without loss.
//!
//! A class file is read by [`cafe`] into events, which a [`translate::ModelBuilder`] turns into a [`ClassModel`]. That
//! model is validated and written as a [`Document`] by [`serialize()`]. The other direction runs [`parse()`] on the
//! document, which gives a validated [`ClassModel`] again, and feeds it to the class file writer.
//!
//! ```text
//! class bytes  --read_model-->  ClassModel  --serialize-->  Document  --to_xml-->  text
//! class bytes  <--write_model-- ClassModel  <---parse-----  Document  <-from_xml-  text
//! ```
//!
//! For many classes at once, use [`translate_all`].

pub mod batch;
pub mod document;
pub mod error;
pub mod insn;
pub mod labels;
pub mod listing;
pub mod model;
pub mod naming;
pub mod parse;
pub mod serialize;
pub mod translate;
pub mod value;

pub use batch::{translate_all, Artifact, BatchPolicy, Direction};
pub use document::{Document, Node};
pub use error::CodecError;
pub use model::ClassModel;
pub use parse::parse;
pub use serialize::{serialize, SerializeOptions};
pub use translate::{assemble, disassemble};
