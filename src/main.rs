use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use lockstep_mesh::config::{MeshConfig, SyncConfig};
use lockstep_mesh::game::audio::{AudioCue, AudioSink};
use lockstep_mesh::game::event::{Intent, Tick};
use lockstep_mesh::game::state::{PeerId, World};
use lockstep_mesh::net::transport::{MemoryMesh, MemoryTransport};
use lockstep_mesh::sync::join::JoinState;
use lockstep_mesh::sync::session::Session;
use lockstep_mesh::sync::status::SessionStats;

/// World digests kept per peer for the final comparison
const DIGEST_HISTORY: usize = 1200;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Lockstep Mesh v{}", env!("CARGO_PKG_VERSION"));

    let sync = SyncConfig::load_or_default();
    sync.validate().map_err(anyhow::Error::msg)?;
    let mesh = MeshConfig::load_or_default();
    mesh.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {} peers, {} Hz ticks, input delay {}, {}s run",
        mesh.peer_count, sync.tick_rate, sync.input_delay, mesh.run_seconds
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = run_mesh(sync, mesh) => {
            let summaries = result?;
            report(&summaries);
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

/// Final state of one demo peer
#[derive(Debug, Clone)]
struct PeerSummary {
    index: usize,
    id: PeerId,
    state: JoinState,
    tick: Tick,
    players: usize,
    stats: SessionStats,
    cues: u64,
    /// World digest at frame boundaries, by next tick to process
    digests: BTreeMap<Tick, u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Consistency {
    compared: usize,
    mismatched: usize,
}

/// Counts cues instead of playing them
#[derive(Default)]
struct CueCounter(u64);

impl AudioSink for CueCounter {
    fn play(&mut self, _cue: AudioCue) {
        self.0 += 1;
    }
}

/// Random walker standing in for keyboard input
struct Bot {
    rng: StdRng,
    intent: Option<Intent>,
    hold: u32,
}

impl Bot {
    fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            intent: None,
            hold: 0,
        }
    }

    fn next(&mut self) -> Option<Intent> {
        if self.hold == 0 {
            self.hold = self.rng.gen_range(10..60);
            self.intent = if self.rng.gen_bool(0.2) {
                None
            } else {
                let angle = self.rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
                Some(Intent::from_direction(angle.cos(), angle.sin(), false))
            };
        }
        self.hold -= 1;

        let jump = self.rng.gen_bool(0.02);
        match (self.intent, jump) {
            (Some(intent), true) => Some(Intent(intent.0 | Intent::JUMP)),
            (None, true) => Some(Intent(Intent::JUMP)),
            (intent, false) => intent,
        }
    }
}

/// Order-independent fingerprint of the simulated world
fn digest(world: &World) -> u64 {
    let mut hasher = DefaultHasher::new();
    for player in world.to_players() {
        player.owner.hash(&mut hasher);
        player.position.to_bits().hash(&mut hasher);
        player.velocity.to_bits().hash(&mut hasher);
        player.intent.hash(&mut hasher);
        player.alive.hash(&mut hasher);
    }
    hasher.finish()
}

/// Start `peer_count` sessions one by one on a shared in-process mesh
async fn run_mesh(sync: SyncConfig, config: MeshConfig) -> anyhow::Result<Vec<PeerSummary>> {
    let mesh = MemoryMesh::new();
    let start = Instant::now();
    let deadline = start + Duration::from_secs_f64(config.run_seconds);
    let mut tasks = JoinSet::new();

    for index in 0..config.peer_count {
        if index > 0 {
            tokio::time::sleep(Duration::from_millis(config.join_interval_ms)).await;
        }
        let id = Uuid::new_v4();
        let transport = mesh.join(id);
        mesh.link_all(id);

        let mut session = Session::new(id, sync.clone());
        if index == 0 {
            session.seed_session(start.elapsed().as_secs_f64());
        }
        info!(peer = index, %id, "Peer joining");
        tasks.spawn(run_peer(
            index,
            session,
            transport,
            start,
            deadline,
            config.frame_interval(),
        ));
    }

    let mut summaries = Vec::with_capacity(config.peer_count);
    while let Some(result) = tasks.join_next().await {
        summaries.push(result?);
    }
    summaries.sort_by_key(|s| s.index);
    Ok(summaries)
}

/// Frame loop of one peer until the deadline
async fn run_peer(
    index: usize,
    mut session: Session,
    mut transport: MemoryTransport,
    start: Instant,
    deadline: Instant,
    frame: Duration,
) -> PeerSummary {
    let mut ticker = interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut bot = Bot::new();
    let mut cues = CueCounter::default();
    let mut digests = BTreeMap::new();
    let mut next_log = 1.0;

    loop {
        let at = ticker.tick().await;
        if at >= deadline {
            break;
        }
        let now = start.elapsed().as_secs_f64();

        for envelope in transport.drain() {
            if let Err(e) = session.receive_bytes(envelope.from, &envelope.payload) {
                warn!(peer = index, from = %envelope.from, "Rejected packet: {}", e);
            }
        }

        let report = session.frame(now, bot.next(), &mut transport, &mut cues);

        if session.join_state().is_started() {
            digests.insert(session.tick(), digest(session.world()));
            if digests.len() > DIGEST_HISTORY {
                digests.pop_first();
            }
        }

        if now >= next_log {
            next_log += 1.0;
            info!(
                peer = index,
                tick = session.tick(),
                net_tick = session.net_tick(),
                state = ?session.join_state(),
                render = ?report.status,
                players = session.world().len(),
                "Status"
            );
            for peer in session.peer_diagnostics(&transport) {
                debug!(
                    peer = index,
                    remote = %peer.id,
                    status = ?peer.status,
                    lead = peer.lead,
                    "Link"
                );
            }
        }
    }

    PeerSummary {
        index,
        id: session.local_id(),
        state: session.join_state(),
        tick: session.tick(),
        players: session.world().len(),
        stats: session.stats(),
        cues: cues.0,
        digests,
    }
}

/// Compare digests of every peer pair at the ticks both recorded
fn check_consistency(summaries: &[PeerSummary]) -> Consistency {
    let mut result = Consistency::default();
    for (i, a) in summaries.iter().enumerate() {
        for b in &summaries[i + 1..] {
            for (tick, digest_a) in &a.digests {
                if let Some(digest_b) = b.digests.get(tick) {
                    result.compared += 1;
                    if digest_a != digest_b {
                        result.mismatched += 1;
                    }
                }
            }
        }
    }
    result
}

fn report(summaries: &[PeerSummary]) {
    for s in summaries {
        info!(
            peer = s.index,
            id = %s.id,
            state = ?s.state,
            tick = s.tick,
            players = s.players,
            sent = s.stats.packets_sent,
            received = s.stats.packets_received,
            dropped = s.stats.packets_dropped,
            processed = s.stats.ticks_processed,
            predicted = s.stats.ticks_predicted,
            cues = s.cues,
            "Final"
        );
    }

    let consistency = check_consistency(summaries);
    if consistency.mismatched == 0 {
        info!(
            "All peers agree on {} shared ticks",
            consistency.compared
        );
    } else {
        warn!(
            "{} of {} shared ticks diverged",
            consistency.mismatched, consistency.compared
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_mesh::game::state::Player;
    use lockstep_mesh::util::vec3::Vec3;

    fn summary(index: usize, digests: &[(Tick, u64)]) -> PeerSummary {
        PeerSummary {
            index,
            id: Uuid::new_v4(),
            state: JoinState::Synced,
            tick: 0,
            players: 0,
            stats: SessionStats::default(),
            cues: 0,
            digests: digests.iter().copied().collect(),
        }
    }

    #[test]
    fn test_digest_ignores_insertion_order() {
        let a = Player::new(Uuid::new_v4(), Vec3::new(1.0, 2.0, 3.0));
        let b = Player::new(Uuid::new_v4(), Vec3::new(4.0, 5.0, 6.0));
        let w1 = World::from_players(vec![a.clone(), b.clone()]);
        let w2 = World::from_players(vec![b, a]);
        assert_eq!(digest(&w1), digest(&w2));
        assert_ne!(digest(&w1), digest(&World::new()));
    }

    #[test]
    fn test_check_consistency() {
        let summaries = vec![
            summary(0, &[(10, 1), (11, 2), (12, 3)]),
            summary(1, &[(11, 2), (12, 9)]),
        ];
        let consistency = check_consistency(&summaries);
        assert_eq!(consistency, Consistency { compared: 2, mismatched: 1 });
    }

    #[test]
    fn test_bot_intents_are_valid() {
        let mut bot = Bot::new();
        for _ in 0..500 {
            if let Some(intent) = bot.next() {
                assert_eq!(intent.0 & !0x3FF, 0);
            }
        }
    }

    #[test]
    fn test_mesh_run_agrees() {
        let sync = SyncConfig::default();
        let config = MeshConfig {
            peer_count: 3,
            run_seconds: 2.0,
            join_interval_ms: 200,
            frame_rate: 60,
        };

        let summaries = tokio_test::block_on(run_mesh(sync, config)).unwrap();

        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].state, JoinState::Synced);
        assert!(summaries.iter().all(|s| s.state.is_started()));
        let consistency = check_consistency(&summaries);
        assert!(consistency.compared > 0);
        assert_eq!(consistency.mismatched, 0);
    }
}
