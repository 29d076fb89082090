//! Structural analysis over linked schemas

pub mod cycles;
pub mod reach;

pub use cycles::{find_unbounded_cycle, is_recursive, recursive_types};
pub use reach::reachable_types;
