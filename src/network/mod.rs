//! Network abstraction layer.
//!
//! [`Transport`] carries peer RPCs, [`ClientTransport`] carries client
//! proposals. Callers bound every request with a timeout; an unreachable or
//! blocked peer surfaces as a `NetworkError` and is retried on the next
//! heartbeat or election round.

mod local;
pub use local::*;


use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::proto::client::ClientRequest;
use crate::proto::client::ClientResponse;
use crate::proto::election::TimeoutNowRequest;
use crate::proto::election::TimeoutNowResponse;
use crate::proto::election::VoteRequest;
use crate::proto::election::VoteResponse;
use crate::proto::replication::AppendEntriesRequest;
use crate::proto::replication::AppendEntriesResponse;
use crate::ClientApiError;
use crate::Result;

// -----------------------------------------------------------------------------
// Core model in Raft: Transport Definition
//
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send_vote_request(
        &self,
        to: u32,
        request: VoteRequest,
    ) -> Result<VoteResponse>;

    async fn send_append_entries(
        &self,
        to: u32,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse>;

    async fn send_timeout_now(
        &self,
        to: u32,
        request: TimeoutNowRequest,
    ) -> Result<TimeoutNowResponse>;
}

/// Delivers client proposals to a chosen node and waits for its answer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientTransport: Send + Sync + 'static {
    async fn propose(
        &self,
        node_id: u32,
        request: ClientRequest,
        timeout: Duration,
    ) -> std::result::Result<ClientResponse, ClientApiError>;
}
