//! Commit history traversal
//!
//! - `rev_walk`: the revision walker and its traversal strategies
//!
//! ## Ordering
//!
//! Orderings combine as flags: `TOPOLOGICAL | TIME` keeps the topological
//! constraint and picks the newest ready commit first, and `REVERSE` applies
//! to whatever order the other flags select.

use bitflags::bitflags;

pub mod rev_walk;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Sort: u8 {
        /// Discovery order
        const NONE = 0b000;
        /// Every commit after all of its children
        const TOPOLOGICAL = 0b001;
        /// Newest committer time first
        const TIME = 0b010;
        const REVERSE = 0b100;
    }
}
