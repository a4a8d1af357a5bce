//! A Raft consensus engine.
//!
//! Every node runs a single event loop that owns its term, vote, role and
//! log. Peers talk through the [`Transport`] trait, clients through the
//! [`RaftClient`] gateway which retries on redirects and deduplicates
//! retransmitted commands by `(client_id, sequence)`.

mod client;
mod config;
mod constants;
mod core;
mod errors;
mod membership;
mod metrics;
mod network;
mod node;
pub mod proto;
mod storage;
pub mod utils;

pub use client::*;
pub use config::*;
pub use constants::*;
pub use core::*;
pub use errors::*;
pub use membership::*;
pub use metrics::*;
pub use network::*;
pub use node::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
