use std::collections::HashSet;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Static description of one cluster member
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    pub id: u32,
    #[serde(default)]
    pub name: String,
}

/// Cluster node configuration parameters
///
/// Field-level defaults use helper functions prefixed with `default_`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Unique node identifier in cluster. 0 is reserved.
    #[serde(default = "default_node_id")]
    pub node_id: u32,

    /// Fixed voting membership for the lifetime of the process
    #[serde(default = "default_initial_cluster")]
    pub initial_cluster: Vec<NodeMeta>,

    /// Database storage root directory
    #[serde(default = "default_db_dir")]
    pub db_root_dir: PathBuf,
}
impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            initial_cluster: default_initial_cluster(),
            db_root_dir: default_db_dir(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster configuration consistency
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "node_id cannot be 0 (reserved for invalid nodes)".into(),
            )));
        }

        if self.initial_cluster.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "initial_cluster must contain at least one node".into(),
            )));
        }

        if !self.initial_cluster.iter().any(|n| n.id == self.node_id) {
            return Err(Error::Config(ConfigError::Message(format!(
                "Current node {} not found in initial_cluster",
                self.node_id
            ))));
        }

        let mut ids = HashSet::new();
        for node in &self.initial_cluster {
            if node.id == 0 {
                return Err(Error::Config(ConfigError::Message(
                    "initial_cluster contains reserved node_id 0".into(),
                )));
            }
            if !ids.insert(node.id) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "Duplicate node_id {} in initial_cluster",
                    node.id
                ))));
            }
        }

        Ok(())
    }

    pub fn member_ids(&self) -> Vec<u32> {
        self.initial_cluster.iter().map(|n| n.id).collect()
    }

    /// Database directory of this node
    pub fn node_db_dir(&self) -> PathBuf {
        self.db_root_dir.join(self.node_id.to_string())
    }

    /// `ids` as members named `n<id>`
    pub fn with_members(
        mut self,
        ids: &[u32],
    ) -> Self {
        self.initial_cluster = ids
            .iter()
            .map(|id| NodeMeta {
                id: *id,
                name: format!("n{}", id),
            })
            .collect();
        self
    }
}

fn default_node_id() -> u32 {
    1
}
fn default_initial_cluster() -> Vec<NodeMeta> {
    (1..=3)
        .map(|id| NodeMeta {
            id,
            name: format!("n{}", id),
        })
        .collect()
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("/tmp/quorum-engine/db")
}
