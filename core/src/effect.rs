//! Timed effects on units.
//!
//! Two families:
//!   - Round effects (move buff, stun): apply on creation, count down on
//!     every `EndRound`, reverse and unsubscribe at zero.
//!   - Status animations: tick-timed updatables that remove themselves
//!     from the registry when done. No event bus involvement.
//!
//! RULE: the reverse/complete path of an effect runs at most once, no
//! matter how many notifications arrive after expiry.
//!
//! A live subscription keeps its round effect alive (bus -> handler ->
//! effect). The effect only holds the bus weakly, so dropping the session
//! frees the bus and every unexpired effect with it.

use crate::{
    error::{CoreError, CoreResult},
    event::{EventKind, GameEvent},
    event_bus::{EventBus, Handler, SubscriptionId},
    types::Round,
    unit::Unit,
    updatable::{Updatable, UpdatableRegistry},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(Uuid);

impl EffectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for EffectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Closed set of round-timed effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectKind {
    MoveBuff { amount: i32 },
    Stun,
}

impl EffectKind {
    fn apply_to(&self, unit: &Unit) {
        match self {
            Self::MoveBuff { amount } => unit.adjust_movement(*amount),
            Self::Stun => unit.add_stun(),
        }
    }

    fn reverse_on(&self, unit: &Unit) {
        match self {
            Self::MoveBuff { amount } => unit.adjust_movement(-*amount),
            Self::Stun => unit.release_stun(),
        }
    }
}

// ── Round effects ──────────────────────────────────────────────────

#[derive(Debug)]
struct RoundState {
    rounds_remaining: Round,
    subscription:     Option<SubscriptionId>,
    expired:          bool,
}

pub struct RoundEffect {
    id:     EffectId,
    kind:   EffectKind,
    target: Arc<Unit>,
    bus:    Weak<dyn EventBus>,
    state:  Mutex<RoundState>,
}

impl RoundEffect {
    fn apply(
        kind:   EffectKind,
        target: Arc<Unit>,
        rounds: Round,
        bus:    Arc<dyn EventBus>,
    ) -> CoreResult<Arc<Self>> {
        if rounds == 0 {
            return Err(CoreError::invalid_argument("effect duration must be at least one round"));
        }
        if let EffectKind::MoveBuff { amount: 0 } = kind {
            return Err(CoreError::invalid_argument("move buff amount must not be zero"));
        }

        let effect = Arc::new(Self {
            id: EffectId::new(),
            kind,
            target,
            bus: Arc::downgrade(&bus),
            state: Mutex::new(RoundState {
                rounds_remaining: rounds,
                subscription:     None,
                expired:          false,
            }),
        });

        {
            // Held across subscribe so a concurrent EndRound cannot expire
            // the effect before its subscription id is stored.
            let mut state = effect.lock();
            effect.kind.apply_to(&effect.target);
            effect.target.attach_effect(effect.id);

            let notified = Arc::clone(&effect);
            let handler: Handler = Arc::new(move |event: &GameEvent| {
                if let GameEvent::EndRound { .. } = event {
                    notified.on_round_end();
                }
            });
            state.subscription = Some(bus.subscribe(EventKind::EndRound, handler));
        }

        log::debug!(
            "effect {} applied to '{}': {:?} for {rounds} rounds",
            effect.id,
            effect.target.name(),
            effect.kind
        );
        bus.publish(&GameEvent::EffectApplied {
            effect: effect.id,
            unit:   effect.target.name().to_string(),
            kind:   effect.kind,
        });
        Ok(effect)
    }

    pub fn id(&self) -> EffectId { self.id }
    pub fn kind(&self) -> EffectKind { self.kind }
    pub fn target(&self) -> &Arc<Unit> { &self.target }

    pub fn rounds_remaining(&self) -> Round {
        self.lock().rounds_remaining
    }

    pub fn is_active(&self) -> bool {
        !self.lock().expired
    }

    /// End the effect now. Returns false if it had already expired.
    pub fn dispel(&self) -> bool {
        let mut state = self.lock();
        if state.expired {
            return false;
        }
        let subscription = self.expire(&mut state);
        drop(state);
        self.detach(subscription);
        true
    }

    fn on_round_end(&self) {
        let mut state = self.lock();
        if state.expired {
            log::trace!("stale round notification for effect {}", self.id);
            return;
        }
        state.rounds_remaining -= 1;
        if state.rounds_remaining > 0 {
            return;
        }
        let subscription = self.expire(&mut state);
        drop(state);
        self.detach(subscription);
    }

    fn expire(&self, state: &mut RoundState) -> Option<SubscriptionId> {
        state.expired = true;
        state.rounds_remaining = 0;
        self.kind.reverse_on(&self.target);
        state.subscription.take()
    }

    /// Runs without the state lock: publishing may re-enter other effects.
    fn detach(&self, subscription: Option<SubscriptionId>) {
        self.target.detach_effect(self.id);
        log::debug!("effect {} on '{}' expired", self.id, self.target.name());
        let Some(bus) = self.bus.upgrade() else {
            log::trace!("effect {} outlived its bus", self.id);
            return;
        };
        if let Some(id) = subscription {
            bus.unsubscribe(EventKind::EndRound, id);
        }
        bus.publish(&GameEvent::EffectExpired {
            effect: self.id,
            unit:   self.target.name().to_string(),
            kind:   self.kind,
        });
    }

    fn lock(&self) -> MutexGuard<'_, RoundState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for RoundEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundEffect")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("target", &self.target.name())
            .field("state", &*self.lock())
            .finish()
    }
}

// ── Status animations ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct AnimationState {
    elapsed_ticks: u32,
    total_ticks:   Option<u32>,
    finished:      bool,
}

/// Floating status text over a unit, e.g. "Stunned!".
pub struct StatusAnimation {
    id:       EffectId,
    label:    String,
    text:     String,
    target:   Arc<Unit>,
    seconds:  f64,
    registry: Weak<UpdatableRegistry>,
    this:     Weak<StatusAnimation>,
    state:    Mutex<AnimationState>,
}

impl StatusAnimation {
    fn spawn(
        target:   Arc<Unit>,
        text:     String,
        seconds:  f64,
        registry: &Arc<UpdatableRegistry>,
    ) -> CoreResult<Arc<Self>> {
        if !(seconds > 0.0 && seconds.is_finite()) {
            return Err(CoreError::invalid_argument(format!(
                "status message duration must be positive, got {seconds}"
            )));
        }
        let label = format!("status:{}", target.name());
        let animation = Arc::new_cyclic(|this| Self {
            id: EffectId::new(),
            label,
            text,
            target,
            seconds,
            registry: Arc::downgrade(registry),
            this: this.clone(),
            state: Mutex::new(AnimationState::default()),
        });
        registry.add(Arc::clone(&animation));
        Ok(animation)
    }

    pub fn id(&self) -> EffectId { self.id }
    pub fn text(&self) -> &str { &self.text }
    pub fn target(&self) -> &Arc<Unit> { &self.target }

    /// 0.0 before the first tick, 1.0 once finished.
    pub fn progress(&self) -> f32 {
        let state = self.lock();
        if state.finished {
            return 1.0;
        }
        match state.total_ticks {
            Some(total) => state.elapsed_ticks as f32 / total as f32,
            None => 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Stop the animation before it runs out. Returns false if already done.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        if state.finished {
            return false;
        }
        state.finished = true;
        drop(state);
        self.unregister();
        true
    }

    fn unregister(&self) {
        if let (Some(registry), Some(this)) = (self.registry.upgrade(), self.this.upgrade()) {
            registry.remove(this);
        }
        log::trace!("status '{}' over '{}' finished", self.text, self.target.name());
    }

    fn lock(&self) -> MutexGuard<'_, AnimationState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Updatable for StatusAnimation {
    fn name(&self) -> &str {
        &self.label
    }

    fn update_state(&self, ticks_per_second: u32) -> anyhow::Result<()> {
        let mut state = self.lock();
        if state.finished {
            return Ok(());
        }
        let total = *state.total_ticks.get_or_insert_with(|| {
            ((self.seconds * f64::from(ticks_per_second)).ceil() as u32).max(1)
        });
        state.elapsed_ticks += 1;
        if state.elapsed_ticks < total {
            return Ok(());
        }
        state.finished = true;
        drop(state);
        self.unregister();
        Ok(())
    }
}

// ── Factory ────────────────────────────────────────────────────────

/// Live handle to any effect created by the factory.
#[derive(Debug, Clone)]
pub enum EffectHandle {
    Round(Arc<RoundEffect>),
    Status(Arc<StatusAnimation>),
}

impl EffectHandle {
    pub fn id(&self) -> EffectId {
        match self {
            Self::Round(e) => e.id(),
            Self::Status(s) => s.id(),
        }
    }
}

impl std::fmt::Debug for StatusAnimation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAnimation")
            .field("id", &self.id)
            .field("text", &self.text)
            .field("target", &self.target.name())
            .field("state", &*self.lock())
            .finish()
    }
}

/// Creates effects wired to one session's bus and registry.
#[derive(Clone)]
pub struct EffectFactory {
    bus:            Arc<dyn EventBus>,
    registry:       Arc<UpdatableRegistry>,
    status_seconds: f64,
}

impl EffectFactory {
    pub fn new(
        bus:            Arc<dyn EventBus>,
        registry:       Arc<UpdatableRegistry>,
        status_seconds: f64,
    ) -> Self {
        Self { bus, registry, status_seconds }
    }

    /// Change `target`'s movement range by `amount` for `rounds` rounds.
    pub fn move_buff(
        &self,
        target: Arc<Unit>,
        amount: i32,
        rounds: Round,
    ) -> CoreResult<Arc<RoundEffect>> {
        RoundEffect::apply(EffectKind::MoveBuff { amount }, target, rounds, Arc::clone(&self.bus))
    }

    pub fn stun(&self, target: Arc<Unit>, rounds: Round) -> CoreResult<Arc<RoundEffect>> {
        RoundEffect::apply(EffectKind::Stun, target, rounds, Arc::clone(&self.bus))
    }

    pub fn status_message(
        &self,
        target: Arc<Unit>,
        text:   impl Into<String>,
    ) -> CoreResult<Arc<StatusAnimation>> {
        self.status_message_for(target, text, self.status_seconds)
    }

    pub fn status_message_for(
        &self,
        target:  Arc<Unit>,
        text:    impl Into<String>,
        seconds: f64,
    ) -> CoreResult<Arc<StatusAnimation>> {
        StatusAnimation::spawn(target, text.into(), seconds, &self.registry)
    }
}
