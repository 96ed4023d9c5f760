//! Node load statistics and the penalty score

use serde::{Deserialize, Serialize};

/// Load snapshot pushed periodically by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub players: u32,
    pub playing_players: u32,
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

/// Audio frame health over the last stats window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

impl Stats {
    /// Load-balancing penalty; lower is better. A pure function of the
    /// snapshot, combining CPU pressure with frame-processing health. Frame
    /// terms contribute zero when the snapshot carries no frame statistics.
    ///
    /// The doubled null-frame term is fixed tuning policy, not something to
    /// rebalance.
    pub fn penalty(&self) -> i32 {
        let cpu_penalty = 1.05f64.powf(100.0 * self.cpu.system_load) * 10.0 - 10.0;

        let (deficit_frame_penalty, null_frame_penalty) = match self.frame_stats {
            Some(frames) => (
                1.03f64.powf(500.0 * (frames.deficit as f64 / 3000.0)) * 600.0 - 600.0,
                1.03f64.powf(500.0 * (frames.nulled as f64 / 3000.0)) * 300.0 - 300.0,
            ),
            None => (0.0, 0.0),
        };

        (cpu_penalty + deficit_frame_penalty + 2.0 * null_frame_penalty
            + self.playing_players as f64)
            .floor() as i32
    }

    /// CPU load normalized per core, as a percentage. Zero when the node has
    /// reported no cores yet.
    pub fn cpu_load(&self) -> f64 {
        if self.cpu.cores == 0 {
            0.0
        } else {
            self.cpu.system_load / self.cpu.cores as f64 * 100.0
        }
    }
}
