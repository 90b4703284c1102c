//! Change events and the rules for folding a newer event into an older one.

mod change_event;
mod comparison;

pub use change_event::{ChangeEvent, ChangeKind};
pub use comparison::{EventComparison, compare, related};
