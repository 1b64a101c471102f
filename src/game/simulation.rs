//! Authoritative simulation step
//!
//! `(world, events for tick, dt) -> world'`. Pure and deterministic: the whole
//! protocol relies on every peer computing bit-identical results here.

use tracing::trace;

use crate::game::audio::AudioCue;
use crate::game::event::{ClientEvent, EventPayload};
use crate::game::state::{Player, World};
use crate::game::systems::physics::{self, TickContext};

/// Apply one tick's events to the world
///
/// Spawns replace the producer's body; intents overwrite the producer's last
/// intent. Events without a producer or for a peer with no body are ignored.
pub fn apply_events(world: &mut World, events: &[ClientEvent]) {
    for event in events {
        let Some(producer) = event.producer else {
            continue;
        };
        match event.payload {
            EventPayload::Spawn(position) => {
                world.insert_player(Player::new(producer, position));
                trace!(%producer, tick = event.tick, "spawned");
            }
            EventPayload::Intent(intent) => {
                if let Some(player) = world.get_player_mut(producer) {
                    player.intent = intent;
                }
            }
            EventPayload::Empty => {}
        }
    }
}

/// Process one tick: apply its events, then step physics by `dt`
///
/// Returns the audio cues raised during the step.
pub fn simulate_tick(
    world: &mut World,
    events: &[ClientEvent],
    dt: f32,
    ctx: TickContext,
) -> Vec<AudioCue> {
    apply_events(world, events);
    physics::update_players(world, dt, ctx)
}
