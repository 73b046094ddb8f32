//! Core of a turn-based tactics game: the tick scheduler, the updatable
//! registry it drives, the event bus, the match state machine and timed
//! effects.

pub mod army;
pub mod clock;
pub mod command;
pub mod config;
pub mod effect;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod match_state;
pub mod player;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod unit;
pub mod updatable;
