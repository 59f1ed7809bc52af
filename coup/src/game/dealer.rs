//! The court, run by the root participant.
//!
//! Every card in play passes through the dealer: the initial deal, the
//! replacement for a card shown to win a challenge, and the two draws of an
//! exchange. It sees the same message stream as the root's own machine, plus
//! the private KEEP messages exchangers address to root.

use log::{debug, error, info, warn};
use rand::{SeedableRng, rngs::StdRng};
use std::collections::{BTreeMap, BTreeSet};

use super::{
    constants::{MAX_INFLUENCE, MAX_PLAYERS, MIN_PLAYERS, STARTING_COINS},
    entities::{Card, Court, PlayerId, ROOT},
    state_machine::PlayerMachine,
    states::{DealerCue, Phase},
};
use crate::net::messages::{Command, GameMessage};

#[derive(Debug)]
pub struct Dealer {
    expected: usize,
    rng: StdRng,
    court: Court,
    joined: BTreeSet<PlayerId>,
    ready: BTreeSet<PlayerId>,
    hands: BTreeMap<PlayerId, Vec<Card>>,
    /// Cards drawn for the exchange in progress.
    drawn: Vec<Card>,
    /// Cards kept so far in the exchange in progress.
    kept: Vec<Card>,
    exchanger: Option<PlayerId>,
    dealt: bool,
    started: bool,
}

impl Dealer {
    /// A dealer waiting for `expected` participants, root included.
    /// `seed` fixes the shuffle for reproducible games.
    #[must_use]
    pub fn new(expected: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut court = Court::default();
        court.shuffle(&mut rng);
        Self {
            expected: expected.clamp(MIN_PLAYERS, MAX_PLAYERS),
            rng,
            court,
            joined: BTreeSet::from([ROOT]),
            ready: BTreeSet::from([ROOT]),
            hands: BTreeMap::new(),
            drawn: Vec::new(),
            kept: Vec::new(),
            exchanger: None,
            dealt: false,
            started: false,
        }
    }

    #[must_use]
    pub fn joined(&self) -> usize {
        self.joined.len()
    }

    #[must_use]
    pub fn court_size(&self) -> usize {
        self.court.len()
    }

    /// The cards the dealer believes `player` holds.
    #[must_use]
    pub fn hand(&self, player: PlayerId) -> &[Card] {
        self.hands.get(&player).map_or(&[], Vec::as_slice)
    }

    /// Track one message and return whatever the dealer must send in
    /// response. Messages the dealer itself emitted are observed too.
    pub fn observe(&mut self, msg: &GameMessage) -> Vec<GameMessage> {
        let player = msg.actor;
        match (msg.command, msg.card()) {
            (Command::Hello, _) => return self.join(player),
            (Command::Ready, _) => {
                self.ready.insert(player);
                return self.try_start();
            }
            (Command::Show, Some(card)) => {
                self.take_from_hand(player, card);
                self.court.put_back(card);
                self.court.shuffle(&mut self.rng);
            }
            (Command::Lose, Some(card)) => {
                self.take_from_hand(player, card);
            }
            (Command::Keep, Some(card)) => {
                self.kept.push(card);
                self.settle_exchange(player);
            }
            (Command::Exit, _) => return self.leave(player),
            _ => {}
        }
        Vec::new()
    }

    /// Draw the card a cue asks for.
    pub fn serve(&mut self, cue: DealerCue) -> Option<GameMessage> {
        let Some(card) = self.court.draw() else {
            error!("Court is empty");
            return None;
        };
        match cue {
            DealerCue::Replace { player } => {
                self.hands.entry(player).or_default().push(card);
                Some(GameMessage::deck(player, Some(card)))
            }
            DealerCue::Exchange { actor, .. } => {
                self.exchanger = Some(actor);
                self.drawn.push(card);
                Some(GameMessage::choose(actor, Some(card)))
            }
        }
    }

    /// The server reported that `player`'s connection is gone. Returns the
    /// messages that take them out of the game and hand the turn on.
    #[must_use]
    pub fn on_disconnect(&self, player: PlayerId, machine: &PlayerMachine) -> Vec<GameMessage> {
        if matches!(machine.phase(), Phase::GameOver { .. }) {
            return Vec::new();
        }
        let in_game = machine.session().is_started();
        if in_game && !machine.session().is_alive(player) {
            return Vec::new();
        }
        if !in_game && !self.joined.contains(&player) {
            return Vec::new();
        }

        let exit = GameMessage::exit(player);
        let mut replies = vec![exit];
        let mut probe = machine.clone();
        if probe.apply(&exit).is_ok() {
            if let Phase::Turn { actor } = probe.phase() {
                replies.push(GameMessage::turn(*actor));
            }
        }
        replies
    }

    fn join(&mut self, player: PlayerId) -> Vec<GameMessage> {
        if self.dealt || self.joined.len() >= self.expected {
            warn!("Ignoring HELLO from #{player}: game is full");
            return Vec::new();
        }
        if !self.joined.insert(player) {
            return Vec::new();
        }
        info!("#{player} joined ({}/{})", self.joined.len(), self.expected);
        if self.joined.len() < self.expected {
            return Vec::new();
        }
        self.deal()
    }

    fn deal(&mut self) -> Vec<GameMessage> {
        self.dealt = true;
        let mut messages: Vec<_> = self.joined.iter().map(|p| GameMessage::player(*p)).collect();
        messages.extend(
            self.joined
                .iter()
                .map(|p| GameMessage::coins(*p, STARTING_COINS)),
        );
        for _ in 0..MAX_INFLUENCE {
            for player in self.joined.clone() {
                let Some(card) = self.court.draw() else {
                    error!("Court ran out while dealing");
                    return messages;
                };
                self.hands.entry(player).or_default().push(card);
                messages.push(GameMessage::deck(player, Some(card)));
            }
        }
        messages.extend(self.try_start());
        messages
    }

    fn try_start(&mut self) -> Vec<GameMessage> {
        if !self.dealt || self.started || self.joined.len() < MIN_PLAYERS {
            return Vec::new();
        }
        if !self.joined.is_subset(&self.ready) {
            return Vec::new();
        }
        self.started = true;
        info!("Everyone is ready, starting with {} players", self.joined.len());
        let Some(first) = self.joined.first().copied() else {
            return Vec::new();
        };
        vec![GameMessage::start(ROOT), GameMessage::turn(first)]
    }

    fn settle_exchange(&mut self, player: PlayerId) {
        let held = self.hand(player).len();
        if self.kept.len() < held {
            return;
        }
        let mut pool = self.hands.remove(&player).unwrap_or_default();
        pool.append(&mut self.drawn);
        for card in &self.kept {
            if let Some(idx) = pool.iter().position(|c| c == card) {
                pool.remove(idx);
            } else {
                warn!("#{player} kept {card}, which they were never dealt");
            }
        }
        for card in pool {
            self.court.put_back(card);
        }
        self.court.shuffle(&mut self.rng);
        self.hands.insert(player, std::mem::take(&mut self.kept));
        self.exchanger = None;
        debug!("Exchange by #{player} settled, court holds {}", self.court.len());
    }

    fn leave(&mut self, player: PlayerId) -> Vec<GameMessage> {
        if self.exchanger == Some(player) {
            for card in self.drawn.drain(..) {
                self.court.put_back(card);
            }
            self.kept.clear();
            self.exchanger = None;
        }
        if self.started {
            self.hands.remove(&player);
            return Vec::new();
        }
        self.joined.remove(&player);
        self.ready.remove(&player);
        for card in self.hands.remove(&player).unwrap_or_default() {
            self.court.put_back(card);
        }
        self.court.shuffle(&mut self.rng);
        self.try_start()
    }

    fn take_from_hand(&mut self, player: PlayerId, card: Card) {
        let Some(hand) = self.hands.get_mut(&player) else {
            return;
        };
        match hand.iter().position(|c| *c == card) {
            Some(idx) => {
                hand.remove(idx);
            }
            None => warn!("#{player} revealed {card}, which they were never dealt"),
        }
    }
}
