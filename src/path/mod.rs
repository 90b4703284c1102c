//! Lexical helpers for slash-delimited paths.
//!
//! Paths here are never touched on disk; two paths are compared purely by
//! their segments.

mod relationship;

pub use relationship::{PathRelationship, join, normalize, parent, relationship, segments};
