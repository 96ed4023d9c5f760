//! Node registry, session registry and voice correlation.
//!
//! The `Manager` is a cheap clonable handle over one shared registry. It
//! owns every [`Node`] and [`Player`], picks the least-loaded node for new
//! sessions, and pairs the two independently-arriving voice-gateway events
//! before a session's voice link can go live.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cadenza_proto::{LoadResponse, LoadType, Track, VoiceServerUpdate, VoiceStateUpdate};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::builder::ManagerBuilder;
use crate::error::{ClientError, Result};
use crate::events::ManagerEvent;
use crate::node::{Node, NodeConfig};
use crate::player::{Player, PlayerOptions};

/// Host-supplied callback that forwards a voice-gateway payload (op 4
/// join/leave) to the shard owning the guild.
pub type TransferFn = Box<dyn Fn(serde_json::Value) + Send + Sync>;

/// Prefix applied to free-text queries before they reach the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSource {
    YouTube,
    SoundCloud,
}

impl SearchSource {
    fn prefix(self) -> &'static str {
        match self {
            SearchSource::YouTube => "ytsearch",
            SearchSource::SoundCloud => "scsearch",
        }
    }
}

/// Per-guild pairing of the two voice-gateway halves. Consumed atomically
/// once both are present.
#[derive(Default)]
struct PendingVoice {
    session_id: Option<String>,
    server: Option<VoiceServerUpdate>,
}

impl PendingVoice {
    fn complete(&self) -> bool {
        self.session_id.is_some() && self.server.is_some()
    }
}

pub(crate) struct Shared {
    pub(crate) nodes: DashMap<String, Arc<Node>>,
    pub(crate) players: DashMap<String, Arc<Player>>,
    pending_voice: DashMap<String, PendingVoice>,
    events: UnboundedSender<ManagerEvent>,
    pub(crate) transfer: TransferFn,
    pub(crate) bot_id: RwLock<Option<String>>,
    pub(crate) client_name: String,
    pub(crate) shard_count: u32,
    node_seq: AtomicUsize,
    configs: Vec<NodeConfig>,
}

impl Shared {
    /// Deliver a notification to the host. A dropped receiver is not an
    /// error; playback continues without an observer.
    pub(crate) fn emit(&self, event: ManagerEvent) {
        let _ = self.events.send(event);
    }
}

/// Handle over the shared registry. Clones are cheap and all observe the
/// same nodes and sessions.
#[derive(Clone)]
pub struct Manager {
    shared: Arc<Shared>,
}

impl Manager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    pub(crate) fn from_builder(
        configs: Vec<NodeConfig>,
        transfer: TransferFn,
        client_name: String,
        shard_count: u32,
        events: UnboundedSender<ManagerEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                nodes: DashMap::new(),
                players: DashMap::new(),
                pending_voice: DashMap::new(),
                events,
                transfer,
                bot_id: RwLock::new(None),
                client_name,
                shard_count,
                node_seq: AtomicUsize::new(0),
                configs,
            }),
        }
    }

    /// Bind the manager to the bot user and open every configured node
    /// connection. The id must be the bot's own snowflake; it is sent as a
    /// header on each connect and drives voice-state filtering.
    pub fn start(&self, bot_id: impl Into<String>) -> Result<()> {
        let bot_id = bot_id.into();
        if bot_id.is_empty() {
            return Err(ClientError::MissingBotId);
        }
        if bot_id.parse::<u64>().is_err() {
            return Err(ClientError::InvalidBotId(bot_id));
        }
        *self.shared.bot_id.write() = Some(bot_id);

        for config in self.shared.configs.clone() {
            self.add_node(config)?;
        }
        info!(nodes = self.shared.nodes.len(), "manager started");
        Ok(())
    }

    /// Register a node and open its connection. Registering under an
    /// already-used key replaces (and destroys) the previous node.
    pub fn add_node(&self, config: NodeConfig) -> Result<Arc<Node>> {
        let key = config.key();
        let seq = self.shared.node_seq.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(Node::new(config, seq, Arc::downgrade(&self.shared))?);

        if let Some(previous) = self.shared.nodes.insert(key.clone(), Arc::clone(&node)) {
            warn!(node = %key, "replacing existing node registration");
            previous.destroy("replaced");
        }
        node.connect();
        Ok(node)
    }

    pub fn node(&self, key: &str) -> Option<Arc<Node>> {
        self.shared.nodes.get(key).map(|n| n.value().clone())
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.shared.nodes.iter().map(|n| n.value().clone()).collect()
    }

    /// Connected nodes sorted by per-core CPU load, least-loaded first.
    /// Registration order breaks ties so repeated calls are stable.
    pub fn least_used_nodes(&self) -> Vec<Arc<Node>> {
        let mut nodes: Vec<Arc<Node>> = self
            .shared
            .nodes
            .iter()
            .filter(|n| n.connected())
            .map(|n| n.value().clone())
            .collect();
        nodes.sort_by(|a, b| {
            a.cpu_load()
                .partial_cmp(&b.cpu_load())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
        nodes
    }

    pub fn player(&self, guild_id: &str) -> Result<Arc<Player>> {
        self.shared
            .players
            .get(guild_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| ClientError::PlayerNotFound(guild_id.to_string()))
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.shared.players.iter().map(|p| p.value().clone()).collect()
    }

    /// Create a session for a guild, joining its voice channel through the
    /// host shard. Returns the existing session when one is already
    /// registered, without re-joining.
    pub fn create(&self, options: PlayerOptions) -> Result<Arc<Player>> {
        if let Some(existing) = self.shared.players.get(&options.guild_id) {
            return Ok(existing.value().clone());
        }

        (self.shared.transfer)(serde_json::json!({
            "op": 4,
            "d": {
                "guild_id": options.guild_id,
                "channel_id": options.voice_channel,
                "self_mute": options.self_mute,
                "self_deaf": options.self_deaf,
            }
        }));
        self.spawn_player(options)
    }

    /// Register the session, binding it to the least-loaded connected node.
    /// The entry API serializes concurrent creates for the same guild; the
    /// loser observes the winner's session.
    fn spawn_player(&self, options: PlayerOptions) -> Result<Arc<Player>> {
        match self.shared.players.entry(options.guild_id.clone()) {
            Entry::Occupied(occupied) => Ok(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let node = self
                    .least_used_nodes()
                    .into_iter()
                    .next()
                    .ok_or(ClientError::NoNodesAvailable)?;
                debug!(guild_id = %options.guild_id, node = %node.key(), "session bound");
                let player = Arc::new(Player::new(options, node, Arc::downgrade(&self.shared)));
                vacant.insert(Arc::clone(&player));
                Ok(player)
            }
        }
    }

    /// Ingest a raw voice-server-update from the host gateway. Returns
    /// whether the guild's voice link was established by this call.
    pub fn voice_server_update(&self, update: VoiceServerUpdate) -> bool {
        let guild_id = update.guild_id.clone();
        self.shared
            .pending_voice
            .entry(guild_id.clone())
            .or_default()
            .server = Some(update);
        self.try_establish(&guild_id)
    }

    /// Ingest a raw voice-state-update from the host gateway. Updates for
    /// users other than the bot are ignored. A null channel means the bot
    /// left voice; the pending pair is discarded. Returns whether the
    /// guild's voice link was established by this call.
    pub fn voice_state_update(&self, update: VoiceStateUpdate) -> bool {
        let is_self = self
            .shared
            .bot_id
            .read()
            .as_deref()
            .is_some_and(|id| id == update.user_id);
        if !is_self {
            return false;
        }
        let Some(guild_id) = update.guild_id else {
            return false;
        };

        if update.channel_id.is_none() {
            self.shared.pending_voice.remove(&guild_id);
            if let Some(player) = self.shared.players.get(&guild_id) {
                player.set_voice_channel(None);
            }
            return false;
        }

        if let Some(player) = self.shared.players.get(&guild_id) {
            player.set_voice_channel(update.channel_id.clone());
        }
        self.shared
            .pending_voice
            .entry(guild_id.clone())
            .or_default()
            .session_id = Some(update.session_id);
        self.try_establish(&guild_id)
    }

    /// Fire the voice link when both halves and the session are present.
    /// The pair is consumed exactly once; a lone half stays pending.
    fn try_establish(&self, guild_id: &str) -> bool {
        let Some(player) = self
            .shared
            .players
            .get(guild_id)
            .map(|p| p.value().clone())
        else {
            return false;
        };

        let Some((_, pending)) = self
            .shared
            .pending_voice
            .remove_if(guild_id, |_, pending| pending.complete())
        else {
            return false;
        };
        // remove_if only fires when complete, so both halves exist here.
        let (Some(session_id), Some(server)) = (pending.session_id, pending.server) else {
            return false;
        };

        match player.connect_voice(session_id, server) {
            Ok(()) => {
                debug!(%guild_id, "voice link established");
                true
            }
            Err(e) => {
                warn!(%guild_id, error = %e, "voice link failed");
                false
            }
        }
    }

    /// Resolve a query into tracks through the least-loaded node's REST
    /// surface. Plain text is prefixed for `source` (YouTube by default);
    /// http(s) URLs pass through untouched.
    pub async fn resolve_track(
        &self,
        query: &str,
        source: Option<SearchSource>,
    ) -> Result<LoadResponse> {
        let node = self
            .least_used_nodes()
            .into_iter()
            .next()
            .ok_or(ClientError::NoNodesAvailable)?;

        let identifier = if query.starts_with("http://") || query.starts_with("https://") {
            query.to_string()
        } else {
            let prefix = source.unwrap_or(SearchSource::YouTube).prefix();
            format!("{prefix}:{query}")
        };

        let response = node.rest().load_tracks(&identifier).await?;
        if response.load_type == LoadType::NoMatches || response.tracks.is_empty() {
            return Err(ClientError::NoResults(query.to_string()));
        }
        Ok(response)
    }

    /// Convenience: resolve and take the first result.
    pub async fn resolve_first(
        &self,
        query: &str,
        source: Option<SearchSource>,
    ) -> Result<Track> {
        let mut response = self.resolve_track(query, source).await?;
        let first = response
            .tracks
            .drain(..)
            .next()
            .ok_or_else(|| ClientError::NoResults(query.to_string()));
        first
    }

    /// Destroy every session and node. The manager is unusable afterwards.
    pub fn shutdown(&self) {
        let players: Vec<Arc<Player>> = self.players();
        for player in players {
            if let Err(e) = player.destroy() {
                warn!(guild_id = %player.guild_id(), error = %e, "destroy failed");
            }
        }
        let nodes: Vec<Arc<Node>> = self.nodes();
        for node in nodes {
            node.destroy("shutdown");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::node::NodeState;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub(crate) struct Captured {
        pub(crate) transfers: Arc<Mutex<Vec<serde_json::Value>>>,
        pub(crate) events: UnboundedReceiver<ManagerEvent>,
    }

    /// A manager with one registered node forced into `Connected` with no
    /// writer attached, so commands land in its backlog for inspection.
    pub(crate) fn manager_with_node() -> (Manager, Arc<Node>, Captured) {
        let transfers: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let sink = Arc::clone(&transfers);
        let (tx, rx) = mpsc::unbounded_channel();

        let manager = Manager::from_builder(
            Vec::new(),
            Box::new(move |payload| sink.lock().push(payload)),
            "test".to_string(),
            1,
            tx,
        );
        *manager.shared.bot_id.write() = Some("42".to_string());

        let seq = manager.shared.node_seq.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(
            Node::new(NodeConfig::default(), seq, Arc::downgrade(&manager.shared))
                .expect("node"),
        );
        node.test_set_state(NodeState::Connected);
        manager
            .shared
            .nodes
            .insert(node.key(), Arc::clone(&node));

        (manager, node, Captured { transfers, events: rx })
    }

    pub(crate) fn add_disconnected_node(manager: &Manager, identifier: &str) -> Arc<Node> {
        let seq = manager.shared.node_seq.fetch_add(1, Ordering::Relaxed);
        let config = NodeConfig {
            identifier: Some(identifier.to_string()),
            ..NodeConfig::default()
        };
        let node = Arc::new(
            Node::new(config, seq, Arc::downgrade(&manager.shared)).expect("node"),
        );
        manager
            .shared
            .nodes
            .insert(node.key(), Arc::clone(&node));
        node
    }
}
