//! Messages exchanged between nodes and between clients and nodes.
//!
//! Transport and wire encoding are left to the [`Transport`](crate::Transport)
//! implementation; the types derive serde so durable adaptors can encode
//! them with bincode.

pub mod client;
pub mod common;
pub mod election;
pub mod replication;

#[cfg(test)]
mod proto_test;
