//! The match state machine: turn order, rounds and the action-point economy.
//!
//! RULES:
//!   - Transitions (`finish_turn`, `spend_action_points`) are serialized by
//!     the caller, typically the input-handling context.
//!   - Reads may come from any thread at any time and only take a shared lock.
//!   - Events are published with no lock held, so handlers may read the match.
//!   - One `EndTurn` per `finish_turn`; one `EndRound` per full rotation.

use crate::{
    army::Army,
    error::{CoreError, CoreResult},
    event::GameEvent,
    event_bus::EventBus,
    player::Player,
    snapshot::{MatchSnapshot, PlayerSnapshot},
    types::{ActionPoints, Round},
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendOutcome {
    /// Points left for the current player.
    Remaining(ActionPoints),
    /// The pool hit zero and the turn passed to the next player.
    TurnEnded,
}

#[derive(Debug)]
struct MatchState {
    players:              Vec<Player>,
    armies:               Vec<Army>,
    current_player_index: usize,
    round:                Round,
    started:              bool,
}

impl MatchState {
    fn ensure_players(&self) -> CoreResult<()> {
        if self.players.is_empty() {
            return Err(CoreError::invalid_state("no players have joined the match"));
        }
        Ok(())
    }

    fn ensure_playable(&self) -> CoreResult<()> {
        if self.players.len() < MIN_PLAYERS {
            return Err(CoreError::invalid_state(format!(
                "match needs at least {MIN_PLAYERS} players, has {}",
                self.players.len()
            )));
        }
        Ok(())
    }
}

pub struct Match {
    state: RwLock<MatchState>,
    bus:   Arc<dyn EventBus>,
}

impl Match {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            state: RwLock::new(MatchState {
                players:              Vec::new(),
                armies:               Vec::new(),
                current_player_index: 0,
                round:                1,
                started:              false,
            }),
            bus,
        }
    }

    /// Append a player and their army to the turn order.
    /// Only allowed before the first turn transition.
    pub fn add_player(&self, player: Player, army: Army) -> CoreResult<()> {
        let mut state = self.write();
        if state.started {
            return Err(CoreError::invalid_state(format!(
                "cannot add player '{}' after the match has started",
                player.name()
            )));
        }
        if state.players.iter().any(|p| p.name() == player.name()) {
            return Err(CoreError::invalid_argument(format!(
                "player '{}' has already joined",
                player.name()
            )));
        }
        log::debug!(
            "player '{}' joined at seat {} with {} units",
            player.name(),
            state.players.len(),
            army.total_units()
        );
        state.players.push(player);
        state.armies.push(army);
        Ok(())
    }

    /// Deduct action points from the current player. Reaching exactly zero
    /// refills the pool and ends the turn.
    pub fn spend_action_points(&self, amount: ActionPoints) -> CoreResult<SpendOutcome> {
        if amount == 0 {
            return Err(CoreError::invalid_argument("cannot spend zero action points"));
        }

        let (player, remaining) = {
            let mut state = self.write();
            state.ensure_playable()?;
            state.started = true;
            let idx = state.current_player_index;
            let current = &mut state.players[idx];
            let remaining = current.spend(amount)?;
            if remaining == 0 {
                current.reset_action_points();
            }
            (current.name().to_string(), remaining)
        };

        self.bus.publish(&GameEvent::ActionPointsSpent {
            player: player.clone(),
            amount,
            remaining,
        });

        if remaining > 0 {
            return Ok(SpendOutcome::Remaining(remaining));
        }
        log::debug!("'{player}' is out of action points");
        self.finish_turn()?;
        Ok(SpendOutcome::TurnEnded)
    }

    /// End the current player's turn and pass to the next seat.
    pub fn finish_turn(&self) -> CoreResult<()> {
        let (player, round) = {
            let mut state = self.write();
            state.ensure_playable()?;
            state.started = true;
            let current = &state.players[state.current_player_index];
            (current.name().to_string(), state.round)
        };

        self.bus.publish(&GameEvent::EndTurn { player: player.clone(), round });

        let ended_round = {
            let mut state = self.write();
            let idx = state.current_player_index;
            state.players[idx].reset_action_points();
            state.current_player_index = (idx + 1) % state.players.len();
            if state.current_player_index == 0 {
                state.round += 1;
                Some(state.round - 1)
            } else {
                None
            }
        };
        log::debug!("turn of '{player}' ended (round {round})");

        if let Some(ended) = ended_round {
            log::info!("round {ended} ended");
            self.bus.publish(&GameEvent::EndRound { round: ended });
        }
        Ok(())
    }

    // ── Read accessors ─────────────────────────────

    pub fn current_player(&self) -> CoreResult<Player> {
        let state = self.read();
        state.ensure_players()?;
        Ok(state.players[state.current_player_index].clone())
    }

    pub fn current_army(&self) -> CoreResult<Army> {
        let state = self.read();
        state.ensure_players()?;
        Ok(state.armies[state.current_player_index].clone())
    }

    pub fn current_player_index(&self) -> CoreResult<usize> {
        let state = self.read();
        state.ensure_players()?;
        Ok(state.current_player_index)
    }

    pub fn current_action_points(&self) -> CoreResult<ActionPoints> {
        let state = self.read();
        state.ensure_players()?;
        Ok(state.players[state.current_player_index].current_action_points())
    }

    pub fn round(&self) -> Round {
        self.read().round
    }

    pub fn player_count(&self) -> usize {
        self.read().players.len()
    }

    pub fn players(&self) -> Vec<Player> {
        self.read().players.clone()
    }

    /// Consistent view of the whole match under a single read lock.
    pub fn snapshot(&self) -> CoreResult<MatchSnapshot> {
        let state = self.read();
        state.ensure_players()?;
        let players = state
            .players
            .iter()
            .zip(&state.armies)
            .map(|(p, a)| PlayerSnapshot {
                name:                  p.name().to_string(),
                current_action_points: p.current_action_points(),
                max_action_points:     p.max_action_points(),
                army_size:             a.total_units(),
            })
            .collect();
        Ok(MatchSnapshot {
            round:                state.round,
            current_player_index: state.current_player_index,
            players,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, MatchState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MatchState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}
