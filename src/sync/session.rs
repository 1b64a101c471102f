//! Lockstep session
//!
//! All mutable state of one peer lives here: the world, the event log, the
//! peer records, the scheduler and the join state. A process may run any
//! number of sessions side by side.
//!
//! Per render frame:
//! 1. seed a new session if no peer is reachable and there is no state yet
//! 2. drop records and bodies of peers that are gone
//! 3. process due ticks up to the net horizon
//! 4. predict a disposable world for rendering
//! 5. record the local intent
//! 6. send every open peer what it has not acknowledged yet

use hashbrown::HashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::game::audio::AudioSink;
use crate::game::event::{ClientEvent, Intent, Tick};
use crate::game::event_log::EventLog;
use crate::game::map::MapGenerator;
use crate::game::simulation::simulate_tick;
use crate::game::state::{PeerId, World};
use crate::game::systems::physics::TickContext;
use crate::net::peers::{Observation, PeerRecord, PeerRegistry};
use crate::net::protocol::{decode, encode, InitSnapshot, KnownPeer, Packet, PacketError};
use crate::net::transport::Transport;
use crate::sync::join::{spawn_position, JoinState, JoinSynchronizer};
use crate::sync::prediction::{self, PredictedFrame, PredictionParams};
use crate::sync::scheduler::TickScheduler;
use crate::sync::status::{PeerDiagnostics, PeerStatus, RenderStatus, SessionStats};

/// Outcome of one render frame
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Authoritative ticks processed this frame
    pub processed: u64,
    pub prediction: PredictedFrame,
    pub status: RenderStatus,
}

pub struct Session {
    local_id: PeerId,
    config: SyncConfig,
    join: JoinSynchronizer,
    scheduler: TickScheduler,
    world: World,
    log: EventLog,
    registry: PeerRegistry,
    /// Session seed, shared by every peer
    seed: u64,
    map_seed: u64,
    rng: StdRng,
    stats: SessionStats,
    /// Wall-clock time of the latest frame or pump
    last_now: f64,
    /// An open peer has no record yet; it may adopt our current tick
    unrecorded_peers: bool,
    /// Peers pruned this lifetime, never learned again from stale listings
    departed: HashSet<PeerId>,
}

impl Session {
    pub fn new(local_id: PeerId, config: SyncConfig) -> Self {
        Self::with_rng(local_id, config, StdRng::from_entropy())
    }

    /// Session drawing its session seed and spawn points from `rng`
    pub fn with_rng(local_id: PeerId, config: SyncConfig, rng: StdRng) -> Self {
        let scheduler = TickScheduler::new(&config);
        let map_seed = config.map_seed;
        Self {
            local_id,
            config,
            join: JoinSynchronizer::new(),
            scheduler,
            world: World::new(),
            log: EventLog::new(),
            registry: PeerRegistry::new(),
            seed: 0,
            map_seed,
            rng,
            stats: SessionStats::default(),
            last_now: 0.0,
            unrecorded_peers: false,
            departed: HashSet::new(),
        }
    }

    /// Run one render frame at wall-clock time `now` (seconds)
    pub fn frame(
        &mut self,
        now: f64,
        intent: Option<Intent>,
        transport: &mut impl Transport,
        audio: &mut impl AudioSink,
    ) -> FrameReport {
        self.last_now = now;
        self.stats.frames += 1;

        if !self.join.state().is_started() && transport.peers().is_empty() {
            self.seed_session(now);
        }
        if !self.join.state().is_started() {
            return FrameReport {
                processed: 0,
                prediction: PredictedFrame::default(),
                status: RenderStatus::Stalled,
            };
        }

        self.prune_closed(&*transport);
        let processed = self.advance(now, audio);
        let prediction = self.predict(now);
        self.submit_input(now, intent);
        self.send_packets(transport);

        let status = RenderStatus::classify(processed > 0, prediction.simulated_frames);
        FrameReport {
            processed,
            prediction,
            status,
        }
    }

    /// Keep the session moving while nothing is rendered
    ///
    /// Same as a frame minus prediction and input, so peers waiting on our
    /// confirmations are not held back.
    pub fn pump(
        &mut self,
        now: f64,
        transport: &mut impl Transport,
        audio: &mut impl AudioSink,
    ) -> u64 {
        self.last_now = now;
        if !self.join.state().is_started() {
            return 0;
        }
        self.prune_closed(&*transport);
        let processed = self.advance(now, audio);
        self.send_packets(transport);
        processed
    }

    /// Start a fresh session with this peer alone in it
    pub fn seed_session(&mut self, now: f64) {
        self.world = World::new();
        self.log.clear();
        self.registry.clear();
        self.departed.clear();
        self.seed = self.rng.gen();
        self.map_seed = self.config.map_seed;
        self.scheduler.start(0, now);

        let spawn_tick = self.scheduler.tick() + self.config.input_delay;
        self.join.seed(spawn_tick);
        let position = spawn_position(&mut self.rng);
        self.log.append_local(ClientEvent::spawn(spawn_tick, position));

        info!(
            peer = %self.local_id,
            seed = self.seed,
            map_seed = self.map_seed,
            spawn_tick,
            "Seeded new session"
        );
    }

    /// Decode and apply an inbound message
    pub fn receive_bytes(&mut self, from: PeerId, bytes: &[u8]) -> Result<Observation, PacketError> {
        match decode::<Packet>(bytes) {
            Ok(packet) => self.receive(from, packet),
            Err(e) => {
                self.stats.packets_dropped += 1;
                debug!(peer = %self.local_id, %from, "Dropping packet: {}", e);
                Err(e.into())
            }
        }
    }

    /// Apply an inbound packet
    ///
    /// Touches only the event log and peer records, except for the first
    /// snapshot, which replaces all game state.
    pub fn receive(&mut self, from: PeerId, mut packet: Packet) -> Result<Observation, PacketError> {
        if let Err(e) = packet.validate(from, self.local_id) {
            self.stats.packets_dropped += 1;
            debug!(peer = %self.local_id, %from, "Dropping packet: {}", e);
            return Err(e);
        }
        self.stats.packets_received += 1;

        if self.join.state() == JoinState::Unsynced {
            let Some(init) = packet.init.take() else {
                // Nothing to apply regular packets to yet
                return Ok(Observation::default());
            };
            return Ok(self.adopt(from, packet, init));
        }
        if self.departed.contains(&from) {
            debug!(peer = %self.local_id, %from, "Ignoring packet from departed peer");
            return Ok(Observation::default());
        }

        let observation = self.registry.observe(
            from,
            &packet,
            self.scheduler.tick(),
            self.local_id,
            &mut self.log,
        );
        self.learn_peers(from, &packet.known_peers);
        Ok(observation)
    }

    /// Start tracking peers the sender lists that we have no record of
    ///
    /// Until such a peer talks to us directly its record sits at zero, which
    /// holds our net tick and keeps every local event it may still need.
    fn learn_peers(&mut self, from: PeerId, known: &[KnownPeer]) {
        let local_id = self.local_id;
        let departed = &self.departed;
        let added = self
            .registry
            .learn(known, |id| id == local_id || id == from || departed.contains(&id));
        for id in added {
            debug!(peer = %self.local_id, %from, learned = %id, "Learned of peer");
        }
    }

    /// Replace all game state with a peer's snapshot
    fn adopt(&mut self, from: PeerId, packet: Packet, init: InitSnapshot) -> Observation {
        self.world = World::from_players(init.players);
        self.map_seed = init.map_seed;
        self.seed = packet.seed;
        self.log.clear();
        self.registry.clear();
        self.departed.clear();
        self.scheduler.start(init.tick, self.last_now);

        let mut observation = self.registry.observe(
            from,
            &packet,
            init.tick,
            self.local_id,
            &mut self.log,
        );

        // The sender's confirmations cover every peer it tracks
        for known in &packet.known_peers {
            if known.id != self.local_id && known.id != from {
                self.registry.upsert(known.id).confirm(known.confirmed_tick);
            }
        }

        // Forwarded events vouch for their producer up to their tick
        for event in &packet.events {
            let Some(producer) = event.producer else {
                continue;
            };
            if producer == from || producer == self.local_id || event.tick < init.tick {
                continue;
            }
            self.registry.upsert(producer).confirm(event.tick);
            self.log.append_received(*event);
            observation.ingested += 1;
        }

        self.join.adopt();
        info!(
            peer = %self.local_id,
            %from,
            tick = init.tick,
            players = self.world.len(),
            "Adopted snapshot, waiting for peers"
        );

        observation
    }

    /// Remove records and bodies of peers that are gone
    ///
    /// A peer we talk to directly is gone once its channel closes. One we only
    /// know through others is gone once nobody we talk to lists it.
    pub fn prune_closed(&mut self, transport: &impl Transport) {
        self.departed.retain(|id| !transport.is_open(*id));
        let removed = self.registry.sweep(|id| transport.is_open(id));
        for id in removed {
            self.world.remove_player(id);
            self.departed.insert(id);
            info!(peer = %self.local_id, removed = %id, "Peer gone, pruned");
        }
        self.unrecorded_peers = transport
            .peers()
            .into_iter()
            .any(|p| transport.is_open(p) && !self.registry.contains(p));
    }

    /// Process every due tick up to the net horizon
    ///
    /// Audio cues from these ticks go to `audio`. Returns ticks processed.
    pub fn advance(&mut self, now: f64, audio: &mut impl AudioSink) -> u64 {
        if !self.join.state().is_started() {
            return 0;
        }

        // A peer that may adopt our current tick has no events in our log yet
        let (min_confirmed, min_acknowledged) = if self.unrecorded_peers {
            (Some(self.scheduler.net_tick()), Some(0))
        } else {
            (
                self.registry.min_confirmed(),
                self.registry.min_acknowledged(),
            )
        };
        self.scheduler.recompute(min_confirmed, min_acknowledged);

        let Self {
            scheduler,
            world,
            log,
            local_id,
            seed,
            stats,
            ..
        } = self;
        let dt = scheduler.dt() as f32;
        let processed = scheduler.run(now, |tick| {
            let events = log.events_for_tick(tick, *local_id);
            let ctx = TickContext { tick, seed: *seed };
            for cue in simulate_tick(world, &events, dt, ctx) {
                audio.play(cue);
            }
        });
        stats.ticks_processed += processed;

        log.prune(scheduler.tick(), scheduler.ack_min());
        processed
    }

    /// Disposable world advanced to `now` through buffered events
    pub fn predict(&mut self, now: f64) -> PredictedFrame {
        let frame = prediction::predict(
            &self.world,
            &self.log,
            PredictionParams {
                local_id: self.local_id,
                from_tick: self.scheduler.tick(),
                elapsed: self.scheduler.elapsed(now),
                dt: self.scheduler.dt(),
                max_ticks: self.config.max_predicted_ticks,
                seed: self.seed,
            },
        );
        self.stats.ticks_predicted += frame.whole_ticks();
        frame
    }

    /// Record this frame's intent; `None` means nothing is pressed
    ///
    /// Only a peer with a body has input. The event targets the tick the
    /// intent can still reach every peer in time for. Returns that tick.
    pub fn submit_input(&mut self, now: f64, intent: Option<Intent>) -> Option<Tick> {
        self.world.get_player(self.local_id)?;
        let tick =
            self.scheduler.tick() + self.config.input_delay + self.scheduler.frames_due(now);
        self.log
            .append_local(ClientEvent::intent(tick, intent.unwrap_or(Intent::IDLE)));
        Some(tick)
    }

    /// Send a packet to every open peer; returns how many went out
    pub fn send_packets(&mut self, transport: &mut impl Transport) -> usize {
        if !self.join.state().is_started() {
            return 0;
        }

        let open: Vec<PeerId> = transport
            .peers()
            .into_iter()
            .filter(|p| transport.is_open(*p))
            .collect();

        if let Some(spawn_tick) = self.join.poll(
            self.scheduler.tick(),
            self.scheduler.net_tick(),
            self.config.input_delay,
            &open,
            &self.registry,
        ) {
            let position = spawn_position(&mut self.rng);
            self.log.append_local(ClientEvent::spawn(spawn_tick, position));
            info!(peer = %self.local_id, spawn_tick, "All peers in sync, spawning");
        }

        let horizon = self.scheduler.horizon();
        let known = self.known_peers(&open);
        let mut sent = 0;
        for peer in open {
            // Until a peer has spoken on its own channel it may have no state
            let packet = match self.registry.get(peer) {
                Some(record) if record.heard => self.regular_packet(record, horizon, &known),
                _ => self.init_packet(horizon, &known),
            };
            let bytes = match encode(&packet) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(peer = %self.local_id, to = %peer, "Failed to encode packet: {}", e);
                    continue;
                }
            };
            match transport.send(peer, bytes) {
                Ok(()) => {
                    self.stats.packets_sent += 1;
                    sent += 1;
                }
                Err(e) => {
                    self.stats.send_failures += 1;
                    debug!(peer = %self.local_id, "Send failed: {}", e);
                }
            }
        }
        sent
    }

    /// Every peer we track, plus open peers we have no record of yet
    fn known_peers(&self, open: &[PeerId]) -> Vec<KnownPeer> {
        let mut known = self.registry.known_peers();
        known.extend(
            open.iter()
                .filter(|p| !self.registry.contains(**p))
                .map(|&id| KnownPeer {
                    id,
                    confirmed_tick: 0,
                }),
        );
        known
    }

    /// Local events the peer has not acknowledged, up to our horizon
    fn regular_packet(&self, record: &PeerRecord, horizon: Tick, known: &[KnownPeer]) -> Packet {
        Packet {
            sender: self.local_id,
            seed: self.seed,
            horizon_tick: horizon,
            received_on_sender: record.confirmed_tick,
            net_tick: self.scheduler.net_tick(),
            known_peers: known.to_vec(),
            events: self
                .log
                .local_between(record.acknowledged_tick, horizon)
                .copied()
                .collect(),
            init: None,
        }
    }

    /// Full state for a peer we have not heard from, plus every pending event
    fn init_packet(&self, horizon: Tick, known: &[KnownPeer]) -> Packet {
        let events = self
            .log
            .local_upto(horizon)
            .chain(self.log.received().iter())
            .copied()
            .collect();
        Packet {
            sender: self.local_id,
            seed: self.seed,
            horizon_tick: horizon,
            received_on_sender: 0,
            net_tick: self.scheduler.net_tick(),
            known_peers: known.to_vec(),
            events,
            init: Some(InitSnapshot {
                tick: self.scheduler.tick(),
                map_seed: self.map_seed,
                players: self.world.to_players(),
            }),
        }
    }

    /// Status of every peer the transport knows about, ordered by id
    pub fn peer_diagnostics(&self, transport: &impl Transport) -> Vec<PeerDiagnostics> {
        let tick = self.scheduler.tick();
        let mut peers = transport.peers();
        peers.sort();
        peers
            .into_iter()
            .map(|id| {
                let record = self.registry.get(id);
                let confirmed_tick = record.map_or(0, |r| r.confirmed_tick);
                PeerDiagnostics {
                    id,
                    status: PeerStatus::classify(transport.is_open(id), record, tick),
                    lead: confirmed_tick as i64 - tick as i64 + 1,
                    confirmed_tick,
                    acknowledged_tick: record.map_or(0, |r| r.acknowledged_tick),
                }
            })
            .collect()
    }

    /// Build the map background for this session's map seed
    pub fn background<G: MapGenerator>(&self, generator: &G) -> G::Background {
        generator.generate(self.map_seed)
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn join_state(&self) -> JoinState {
        self.join.state()
    }

    /// Next tick to process
    pub fn tick(&self) -> Tick {
        self.scheduler.tick()
    }

    pub fn net_tick(&self) -> Tick {
        self.scheduler.net_tick()
    }

    pub fn ack_min(&self) -> Tick {
        self.scheduler.ack_min()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn map_seed(&self) -> u64 {
        self.map_seed
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}
