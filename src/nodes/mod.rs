//! The node wrappers applications build graphs from.
//!
//! Every wrapper follows the same shape: a `ResourceHandle` over a
//! `repr(C)` core whose first field is the backend [`crate::graph::NodeCore`],
//! an `init` taking the engine it belongs to, and [`crate::bus::Topology`] /
//! [`crate::bus::Routing`] impls over the core pointer. Queries on an
//! uninitialized wrapper return `0`/`false` instead of panicking.

mod base;
mod filter;
mod group;
mod sound;
mod splitter;

pub use base::{BaseNode, ProcessNode};
pub use filter::{HpfNode, LpfNode, MAX_FILTER_ORDER};
pub use group::{GroupNode, GroupSettings};
pub use sound::Sound;
pub use splitter::SplitterNode;
