//! Node runtime.
//!
//! [`NodeBuilder`] wires storage, state machine and transport together and
//! spawns the two tasks a node consists of: the Raft event loop and the
//! commit/apply loop. The returned [`Node`] owns those tasks; its
//! [`NodeHandle`] is the cheap, cloneable way in for peers and clients.

mod builder;
mod node;

pub use builder::*;
pub use node::*;
