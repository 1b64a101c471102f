pub mod audio;
pub mod constants;
pub mod event;
pub mod event_log;
pub mod map;
pub mod simulation;
pub mod state;
pub mod systems;
