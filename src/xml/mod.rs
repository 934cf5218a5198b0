//! XML document model
//!
//! A parsed element tree that can be written back without disturbing any
//! part of the source it did not change.

pub mod document;

pub use document::{Attribute, Attributes, Document, Element, ElementMut, ParseError};
