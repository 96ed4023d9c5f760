//! Manager construction.

use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{ClientError, Result};
use crate::events::ManagerEvent;
use crate::manager::{Manager, TransferFn};
use crate::node::NodeConfig;

/// Builds a [`Manager`] and its notification receiver.
///
/// A transfer callback is mandatory: without one the manager has no way to
/// ask the host gateway to join or leave voice channels.
pub struct ManagerBuilder {
    nodes: Vec<NodeConfig>,
    transfer: Option<TransferFn>,
    client_name: String,
    shard_count: u32,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            transfer: None,
            client_name: "cadenza".to_string(),
            shard_count: 1,
        }
    }

    /// Add a node to connect to on `start`.
    pub fn node(mut self, config: NodeConfig) -> Self {
        self.nodes.push(config);
        self
    }

    /// The callback that forwards op-4 voice payloads to the host shard.
    pub fn transfer(
        mut self,
        callback: impl Fn(serde_json::Value) + Send + Sync + 'static,
    ) -> Self {
        self.transfer = Some(Box::new(callback));
        self
    }

    /// Identifies this client to nodes via the `Client-Name` header.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn shard_count(mut self, count: u32) -> Self {
        self.shard_count = count;
        self
    }

    pub fn build(self) -> Result<(Manager, UnboundedReceiver<ManagerEvent>)> {
        let transfer = self.transfer.ok_or(ClientError::MissingTransfer)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Manager::from_builder(
            self.nodes,
            transfer,
            self.client_name,
            self.shard_count,
            tx,
        );
        Ok((manager, rx))
    }
}
