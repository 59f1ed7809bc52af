//! What an agent gets to look at, and what it remembers between decisions.

use std::collections::BTreeMap;

use crate::game::{
    GameSession, PlayerState,
    constants::COPIES_PER_CARD,
    entities::{Card, PlayerId},
    history::History,
};
use crate::net::messages::{Command, GameMessage};

/// Public information available to an agent when it decides.
#[derive(Clone, Copy, Debug)]
pub struct DecisionContext<'a> {
    pub me: PlayerId,
    pub state: PlayerState,
    pub session: &'a GameSession,
    pub history: &'a History,
}

impl DecisionContext<'_> {
    /// Own cards.
    #[must_use]
    pub fn hand(&self) -> &[Card] {
        self.session
            .view(self.me)
            .map_or(&[], |view| view.deck.as_slice())
    }

    /// Copies of `card` that can't be in anyone else's hand: revealed ones
    /// plus own copies.
    #[must_use]
    pub fn accounted_for(&self, card: Card) -> usize {
        let revealed: usize = self
            .session
            .views()
            .iter()
            .map(|view| view.revealed.iter().filter(|c| **c == card).count())
            .sum();
        let held = self.hand().iter().filter(|c| **c == card).count();
        revealed + held
    }

    /// Whether `claimant` provably can't hold `card`.
    #[must_use]
    pub fn impossible_claim(&self, claimant: PlayerId, card: Card) -> bool {
        claimant != self.me && self.accounted_for(card) >= COPIES_PER_CARD
    }
}

/// Believed opponent hands, built from their claims.
///
/// Each claim is taken at face value: the claimed card is appended to the
/// claimant's believed hand while that hand is smaller than their influence.
/// This is an approximation. It can diverge from the truth when an opponent
/// bluffs, or when their unclaimed card differs from what they later claim,
/// and nothing in the protocol relies on it.
#[derive(Clone, Debug, Default)]
pub struct Beliefs {
    believed: BTreeMap<PlayerId, Vec<Card>>,
}

impl Beliefs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn believed(&self, player: PlayerId) -> &[Card] {
        self.believed.get(&player).map_or(&[], Vec::as_slice)
    }

    pub fn observe(&mut self, message: &GameMessage, ctx: &DecisionContext) {
        let player = message.actor;
        if player == ctx.me {
            return;
        }
        let influence = ctx
            .session
            .view(player)
            .map_or(0, |view| usize::from(view.influence));
        let hand = self.believed.entry(player).or_default();
        match message.command {
            Command::Act | Command::Block => {
                let claim = match message.command {
                    Command::Act => message.action().and_then(|action| action.claim()),
                    _ => message.card(),
                };
                if let Some(card) = claim {
                    if hand.len() < influence && !hand.contains(&card) {
                        hand.push(card);
                    }
                }
            }
            Command::Show | Command::Lose => {
                if let Some(card) = message.card() {
                    if let Some(idx) = hand.iter().position(|c| *c == card) {
                        hand.remove(idx);
                    }
                }
                hand.truncate(influence);
            }
            // A fresh hand from the court
            Command::Keep => hand.clear(),
            Command::Exit => {
                self.believed.remove(&player);
            }
            _ => {}
        }
    }

    /// Whether the believed hand of `claimant` is complete and lacks `card`.
    #[must_use]
    pub fn doubts(&self, claimant: PlayerId, card: Card, ctx: &DecisionContext) -> bool {
        let influence = ctx
            .session
            .view(claimant)
            .map_or(0, |view| usize::from(view.influence));
        let hand = self.believed(claimant);
        influence > 0 && hand.len() >= influence && !hand.contains(&card)
    }
}
