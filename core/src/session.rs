//! Composition root for one match: one bus, one registry, one scheduler.
//!
//! Everything is wired here through constructor parameters. Nothing in the
//! core reaches for global state.

use crate::{
    army::Army,
    clock::{Clock, SystemClock},
    command::MatchCommand,
    config::GameConfig,
    effect::{EffectFactory, EffectHandle},
    error::{CoreError, CoreResult},
    event_bus::{EventBus, SyncEventBus},
    match_state::{Match, SpendOutcome},
    player::Player,
    render::{RenderRequests, RenderSignal},
    scheduler::TickScheduler,
    snapshot::SessionSnapshot,
    unit::{Unit, UnitDefinition},
    updatable::UpdatableRegistry,
};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Spent(SpendOutcome),
    TurnFinished,
    Effect(EffectHandle),
}

pub struct GameSession {
    config:          GameConfig,
    bus:             Arc<dyn EventBus>,
    registry:        Arc<UpdatableRegistry>,
    render:          RenderSignal,
    render_requests: RenderRequests,
    scheduler:       TickScheduler,
    match_state:     Arc<Match>,
    effects:         EffectFactory,
    units:           RwLock<Vec<Arc<Unit>>>,
}

impl GameSession {
    /// Wire a session on the system clock with a fresh event bus.
    pub fn build(config: GameConfig) -> CoreResult<Self> {
        Self::build_with(config, Arc::new(SyncEventBus::new()), Arc::new(SystemClock))
    }

    /// Wire a session around a caller-supplied bus and clock.
    pub fn build_with(
        config: GameConfig,
        bus:    Arc<dyn EventBus>,
        clock:  Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let registry = Arc::new(UpdatableRegistry::new());
        let (render, render_requests) = RenderSignal::new();
        let scheduler = TickScheduler::new(
            config.scheduler.clone(),
            Arc::clone(&registry),
            Arc::new(render.clone()),
            clock,
        )?;
        let effects = EffectFactory::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            config.rules.status_message_seconds,
        );
        Ok(Self {
            match_state: Arc::new(Match::new(Arc::clone(&bus))),
            config,
            bus,
            registry,
            render,
            render_requests,
            scheduler,
            effects,
            units: RwLock::new(Vec::new()),
        })
    }

    pub fn start(&mut self) -> CoreResult<()> {
        self.scheduler.start()
    }

    pub fn stop(&mut self) -> CoreResult<()> {
        self.scheduler.stop()
    }

    /// Seat a player with the configured action-point pool.
    pub fn add_player(&self, name: &str, army: Army) -> CoreResult<()> {
        let player = Player::new(name, self.config.rules.default_max_action_points)?;
        self.match_state.add_player(player, army)
    }

    pub fn spawn_unit(&self, name: &str, definition: Arc<UnitDefinition>) -> CoreResult<Arc<Unit>> {
        let mut units = self.units.write().unwrap_or_else(|p| p.into_inner());
        if units.iter().any(|u| u.name() == name) {
            return Err(CoreError::invalid_argument(format!("unit '{name}' already exists")));
        }
        let unit = Unit::spawn(name, definition);
        units.push(Arc::clone(&unit));
        Ok(unit)
    }

    pub fn unit(&self, name: &str) -> CoreResult<Arc<Unit>> {
        self.units
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|u| u.name() == name)
            .cloned()
            .ok_or_else(|| CoreError::invalid_argument(format!("unknown unit '{name}'")))
    }

    pub fn apply_command(&self, command: &MatchCommand) -> CoreResult<CommandOutcome> {
        log::debug!("command: {command:?}");
        let outcome = match command {
            MatchCommand::SpendActionPoints { amount } => {
                CommandOutcome::Spent(self.match_state.spend_action_points(*amount)?)
            }
            MatchCommand::FinishTurn => {
                self.match_state.finish_turn()?;
                CommandOutcome::TurnFinished
            }
            MatchCommand::ApplyMoveBuff { unit, amount, rounds } => {
                let effect = self.effects.move_buff(self.unit(unit)?, *amount, *rounds)?;
                CommandOutcome::Effect(EffectHandle::Round(effect))
            }
            MatchCommand::ApplyStun { unit, rounds } => {
                let effect = self.effects.stun(self.unit(unit)?, *rounds)?;
                CommandOutcome::Effect(EffectHandle::Round(effect))
            }
            MatchCommand::ShowStatus { unit, text } => {
                let animation = self.effects.status_message(self.unit(unit)?, text.as_str())?;
                CommandOutcome::Effect(EffectHandle::Status(animation))
            }
        };
        Ok(outcome)
    }

    pub fn snapshot(&self) -> CoreResult<SessionSnapshot> {
        let units = self
            .units
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|u| u.snapshot())
            .collect();
        Ok(SessionSnapshot {
            match_state:     self.match_state.snapshot()?,
            units,
            ticks:           self.scheduler.stats().steps,
            live_updatables: self.registry.live_count(),
        })
    }

    pub fn config(&self) -> &GameConfig { &self.config }
    pub fn bus(&self) -> &Arc<dyn EventBus> { &self.bus }
    pub fn registry(&self) -> &Arc<UpdatableRegistry> { &self.registry }
    pub fn scheduler(&self) -> &TickScheduler { &self.scheduler }
    pub fn match_state(&self) -> &Arc<Match> { &self.match_state }
    pub fn effects(&self) -> &EffectFactory { &self.effects }
    pub fn render_signal(&self) -> &RenderSignal { &self.render }
    pub fn render_requests(&self) -> &RenderRequests { &self.render_requests }
}
