#![allow(clippy::enum_variant_names)]
#![allow(clippy::module_inception)]
//! Incremental, coalescing mirroring of a hierarchical data source.
//!
//! Raw add/change/remove notifications are pushed into a
//! [`PathChangeQueue`](queue::PathChangeQueue), which folds them into at most
//! one pending event per path. A [`ChangeProcessor`](processor::ChangeProcessor)
//! drains the queue into a [`ChangeHandler`](processor::ChangeHandler), and
//! discards handler results that a newer event made stale before committing.

pub mod application;
pub mod changes;
pub mod cli;
pub mod config;
pub mod ext;
pub mod filesystem;
pub mod mirror;
pub mod path;
pub mod processor;
pub mod queue;
