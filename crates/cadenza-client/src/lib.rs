//! Control-plane client for remote audio-routing nodes.
//!
//! Maintains persistent control connections to one or more audio nodes,
//! load-balances playback sessions across them, correlates the host
//! gateway's voice events, and turns high-level playback commands into wire
//! messages while interpreting the lifecycle events that come back.
//!
//! Entry point: [`Manager::builder`]. The builder yields a [`Manager`]
//! handle plus an unbounded receiver of [`ManagerEvent`] notifications.

pub mod builder;
pub mod error;
pub mod events;
pub mod manager;
pub mod node;
pub mod player;
pub mod rest;

pub use builder::ManagerBuilder;
pub use error::{ClientError, Result};
pub use events::ManagerEvent;
pub use manager::{Manager, SearchSource, TransferFn};
pub use node::{Node, NodeConfig, NodeState, Sent};
pub use player::{PlayOptions, Player, PlayerOptions, EQ_BANDS};
pub use rest::RestClient;

pub use cadenza_proto as proto;

pub mod prelude {
    pub use crate::error::{ClientError, Result};
    pub use crate::events::ManagerEvent;
    pub use crate::manager::{Manager, SearchSource};
    pub use crate::node::{NodeConfig, NodeState};
    pub use crate::player::{PlayOptions, PlayerOptions};
    pub use cadenza_proto::{EndReason, LoadType, Track};
}
