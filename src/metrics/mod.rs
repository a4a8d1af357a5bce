//! Process-wide prometheus counters, labelled by node id.

#[cfg(test)]
mod metrics_test;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

lazy_static! {
    pub static ref ELECTIONS_STARTED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("elections_started", "Elections started by a node"),
        &["id"]
    )
    .expect("metric can not be created");

    pub static ref LEADERS_ELECTED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("leaders_elected", "Times a node won an election"),
        &["id"]
    )
    .expect("metric can not be created");

    pub static ref COMMITTED_ENTRIES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("committed_entries", "Entries applied to the state machine"),
        &["id"]
    )
    .expect("metric can not be created");

    pub static ref APPEND_REJECTIONS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("append_rejections", "AppendEntries rejected by a follower log check"),
        &["id", "peer_id"]
    )
    .expect("metric can not be created");

    pub static ref CLIENT_REDIRECTS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("client_redirects", "Client proposals answered with NotLeader"),
        &["id"]
    )
    .expect("metric can not be created");

    pub static ref LEADERSHIP_TRANSFERS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("leadership_transfers", "Leadership transfers started by a node"),
        &["id"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

fn register_custom_metrics(registry: &Registry) {
    let collectors = [
        &*ELECTIONS_STARTED_METRIC,
        &*LEADERS_ELECTED_METRIC,
        &*COMMITTED_ENTRIES_METRIC,
        &*APPEND_REJECTIONS_METRIC,
        &*CLIENT_REDIRECTS_METRIC,
        &*LEADERSHIP_TRANSFERS_METRIC,
    ];
    for collector in collectors {
        if let Err(e) = registry.register(Box::new(collector.clone())) {
            tracing::warn!("collector can not be registered: {:?}", e);
        }
    }
}

/// Renders every registered metric in the prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("could not encode metrics: {:?}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
