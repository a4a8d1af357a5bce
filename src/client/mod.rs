//! Client gateway.
//!
//! [`RaftClient`] turns a command into a committed, applied result. It
//! keeps a leader hint, follows redirects, falls back to round-robin over
//! the members when no leader is known and retries with jittered backoff
//! until an attempt budget or an overall deadline runs out.
//!
//! Every command carries the client's id and a sequence number that is
//! fixed across retries, so a retry after a leader change is applied at
//! most once.
//!
//! ```ignore
//! let client = RaftClientBuilder::new(vec![1, 2, 3], network.clone())
//!     .request_timeout(Duration::from_millis(500))
//!     .build()?;
//! let result = client.submit(b"set x 1".to_vec()).await?;
//! ```

mod builder;
mod client;
mod config;
mod error;

pub use builder::*;
pub use client::*;
pub use config::*;
pub use error::*;
