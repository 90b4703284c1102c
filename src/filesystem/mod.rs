//! Path-addressed tree with change tracking.
//!
//! This module provides a tree-like structure mapping paths to values,
//! where nodes are either directories (that can contain other nodes)
//! or leaves holding a value. Every mutation is announced to subscribers
//! as a [`ChangeEvent`](crate::changes::ChangeEvent).

mod subscription;
mod tree;

pub use subscription::{ChangeSubscription, SubscriptionId};
pub use tree::{PathTree, PathTreeError};
