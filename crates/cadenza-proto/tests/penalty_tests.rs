//! Penalty score tests

use cadenza_proto::{CpuStats, FrameStats, MemoryStats, Stats};

fn stats(playing: u32, cores: u32, load: f64, frames: Option<FrameStats>) -> Stats {
    Stats {
        players: playing + 1,
        playing_players: playing,
        uptime: 60_000,
        memory: MemoryStats {
            free: 256,
            used: 512,
            allocated: 1024,
            reservable: 2048,
        },
        cpu: CpuStats {
            cores,
            system_load: load,
            lavalink_load: load / 2.0,
        },
        frame_stats: frames,
    }
}

#[test]
fn penalty_is_deterministic() {
    let snapshot = stats(
        7,
        4,
        0.35,
        Some(FrameStats {
            sent: 2900,
            nulled: 40,
            deficit: 60,
        }),
    );

    let first = snapshot.penalty();
    for _ in 0..100 {
        assert_eq!(snapshot.penalty(), first);
    }
}

#[test]
fn idle_node_has_zero_penalty() {
    assert_eq!(stats(0, 4, 0.0, None).penalty(), 0);
}

#[test]
fn playing_players_add_one_each() {
    assert_eq!(stats(5, 4, 0.0, None).penalty(), 5);
}

#[test]
fn absent_frame_stats_contribute_nothing() {
    let without = stats(3, 4, 0.5, None);
    let with_clean_frames = stats(
        3,
        4,
        0.5,
        Some(FrameStats {
            sent: 3000,
            nulled: 0,
            deficit: 0,
        }),
    );

    assert_eq!(without.penalty(), with_clean_frames.penalty());
}

#[test]
fn nulled_frames_cost_twice_deficit_rate() {
    let nulled = stats(
        0,
        4,
        0.0,
        Some(FrameStats {
            sent: 2700,
            nulled: 300,
            deficit: 0,
        }),
    );
    let deficit = stats(
        0,
        4,
        0.0,
        Some(FrameStats {
            sent: 2700,
            nulled: 0,
            deficit: 300,
        }),
    );

    // Identical frame counts: the nulled curve runs at half the deficit
    // curve's scale but is doubled in the sum, so the ratio holds exactly.
    let nulled_term = 1.03f64.powf(500.0 * (300.0 / 3000.0)) * 300.0 - 300.0;
    let deficit_term = 1.03f64.powf(500.0 * (300.0 / 3000.0)) * 600.0 - 600.0;
    assert_eq!(nulled.penalty(), (2.0 * nulled_term).floor() as i32);
    assert_eq!(deficit.penalty(), deficit_term.floor() as i32);
}

#[test]
fn higher_cpu_load_ranks_worse() {
    let calm = stats(0, 4, 0.1, None);
    let busy = stats(0, 4, 0.9, None);
    assert!(busy.penalty() > calm.penalty());
}

#[test]
fn cpu_load_normalizes_per_core() {
    let snapshot = stats(0, 4, 0.5, None);
    assert!((snapshot.cpu_load() - 12.5).abs() < f64::EPSILON);

    let coreless = stats(0, 0, 0.5, None);
    assert_eq!(coreless.cpu_load(), 0.0);
}
