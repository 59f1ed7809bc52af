//! Turn order, round counting and elimination bookkeeping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    constants::MAX_PLAYERS,
    entities::{PlayerId, PlayerView},
};

#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum SessionError {
    #[error("player {0} already joined")]
    AlreadyJoined(PlayerId),
    #[error("game is full")]
    CapacityReached,
    #[error("game already in progress")]
    AlreadyStarted,
}

/// The participants of one game, in id order.
///
/// Views live in an arena sorted by id, so turn order is id order. The
/// session only tracks coins and influence through those views; it never
/// looks at cards.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GameSession {
    players: Vec<PlayerView>,
    turn: usize,
    round: u32,
    started: bool,
}

impl GameSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&mut self, id: PlayerId) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::AlreadyStarted);
        }
        let idx = match self.players.binary_search_by_key(&id, |view| view.id) {
            Ok(_) => return Err(SessionError::AlreadyJoined(id)),
            Err(idx) => idx,
        };
        if self.players.len() >= MAX_PLAYERS {
            return Err(SessionError::CapacityReached);
        }
        self.players.insert(idx, PlayerView::new(id));
        Ok(())
    }

    /// Drop a participant that left before the game started.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerView> {
        if self.started {
            return None;
        }
        let idx = self.index_of(id)?;
        Some(self.players.remove(idx))
    }

    fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.players.binary_search_by_key(&id, |view| view.id).ok()
    }

    #[must_use]
    pub fn view(&self, id: PlayerId) -> Option<&PlayerView> {
        self.index_of(id).map(|idx| &self.players[idx])
    }

    pub fn view_mut(&mut self, id: PlayerId) -> Option<&mut PlayerView> {
        self.index_of(id).map(|idx| &mut self.players[idx])
    }

    #[must_use]
    pub fn views(&self) -> &[PlayerView] {
        &self.players
    }

    #[must_use]
    pub fn contains(&self, id: PlayerId) -> bool {
        self.index_of(id).is_some()
    }

    #[must_use]
    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.view(id).is_some_and(|view| view.alive)
    }

    #[must_use]
    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|view| view.alive)
            .map(|view| view.id)
            .collect()
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|view| view.alive).count()
    }

    /// Alive participants other than `id`, in id order.
    #[must_use]
    pub fn alive_opponents(&self, id: PlayerId) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|view| view.alive && view.id != id)
            .map(|view| view.id)
            .collect()
    }

    /// Alive participants other than `id`, in id order starting after `id`
    /// and wrapping around.
    #[must_use]
    pub fn alive_after(&self, id: PlayerId) -> Vec<PlayerId> {
        let (after, before): (Vec<_>, Vec<_>) = self
            .alive_opponents(id)
            .into_iter()
            .partition(|other| *other > id);
        after.into_iter().chain(before).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Start the game with the lowest alive id to move.
    pub fn begin(&mut self) -> Option<PlayerId> {
        self.started = true;
        self.round = 0;
        self.turn = self.players.iter().position(|view| view.alive)?;
        self.current()
    }

    /// Whose turn it is, once the game started.
    #[must_use]
    pub fn current(&self) -> Option<PlayerId> {
        if !self.started {
            return None;
        }
        self.players.get(self.turn).map(|view| view.id)
    }

    /// Force the turn pointer to `id`. Fails if `id` is not alive.
    pub fn set_turn(&mut self, id: PlayerId) -> bool {
        match self.index_of(id) {
            Some(idx) if self.players[idx].alive => {
                self.turn = idx;
                true
            }
            _ => false,
        }
    }

    /// Finish the current action: move the turn to the next alive
    /// participant, wrapping, and count one round. Returns `None` once at
    /// most one participant is alive.
    pub fn advance(&mut self) -> Option<PlayerId> {
        if self.is_over() {
            return None;
        }
        self.round += 1;
        let n = self.players.len();
        self.turn = (1..=n)
            .map(|step| (self.turn + step) % n)
            .find(|idx| self.players[*idx].alive)?;
        self.current()
    }

    /// Mark `id` as eliminated. Returns true if it was alive.
    pub fn eliminate(&mut self, id: PlayerId) -> bool {
        match self.view_mut(id) {
            Some(view) if view.alive => {
                view.eliminate();
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_over(&self) -> bool {
        self.started && self.alive_count() <= 1
    }

    /// The last participant standing.
    #[must_use]
    pub fn winner(&self) -> Option<PlayerId> {
        if !self.is_over() {
            return None;
        }
        self.players.iter().find(|view| view.alive).map(|view| view.id)
    }
}
