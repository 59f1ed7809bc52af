use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::constants::{
    ASSASSINATE_COST, COPIES_PER_CARD, COUP_COST, FORCED_COUP_COINS, MAX_INFLUENCE,
};
use crate::net::errors::ParseError;

/// Participants are identified by the id of their connection.
pub type PlayerId = u32;

/// Type alias for coin counts. Coin counts are never negative.
pub type Coins = u32;

/// The first participant to connect. It deals the court and receives
/// disconnect notices from the server.
pub const ROOT: PlayerId = 0;

/// A character card. Each card held is one influence.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Card {
    Duke,
    Assassin,
    Captain,
    Ambassador,
    Contessa,
}

impl Card {
    pub const ALL: [Card; 5] = [
        Card::Duke,
        Card::Assassin,
        Card::Captain,
        Card::Ambassador,
        Card::Contessa,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Duke => "DUKE",
            Self::Assassin => "ASSASSIN",
            Self::Captain => "CAPTAIN",
            Self::Ambassador => "AMBASSADOR",
            Self::Contessa => "CONTESSA",
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Card {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|card| card.as_str() == s)
            .ok_or_else(|| ParseError::UnknownOperand(s.to_string()))
    }
}

/// An action a participant may declare on their turn.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Action {
    Income,
    ForeignAid,
    Coup,
    Tax,
    Assassinate,
    Steal,
    Exchange,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Income,
        Action::ForeignAid,
        Action::Coup,
        Action::Tax,
        Action::Assassinate,
        Action::Steal,
        Action::Exchange,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::ForeignAid => "FOREIGN_AID",
            Self::Coup => "COUP",
            Self::Tax => "TAX",
            Self::Assassinate => "ASSASSINATE",
            Self::Steal => "STEAL",
            Self::Exchange => "EXCHANGE",
        }
    }

    /// The character the actor claims to hold when declaring this action.
    #[must_use]
    pub const fn claim(&self) -> Option<Card> {
        match self {
            Self::Tax => Some(Card::Duke),
            Self::Assassinate => Some(Card::Assassin),
            Self::Steal => Some(Card::Captain),
            Self::Exchange => Some(Card::Ambassador),
            Self::Income | Self::ForeignAid | Self::Coup => None,
        }
    }

    /// Characters that may block this action.
    #[must_use]
    pub const fn blockers(&self) -> &'static [Card] {
        match self {
            Self::ForeignAid => &[Card::Duke],
            Self::Assassinate => &[Card::Contessa],
            Self::Steal => &[Card::Captain, Card::Ambassador],
            Self::Income | Self::Coup | Self::Tax | Self::Exchange => &[],
        }
    }

    /// Only the target may block a targeted action. Anyone may block
    /// foreign aid.
    #[must_use]
    pub const fn is_targeted(&self) -> bool {
        matches!(self, Self::Coup | Self::Assassinate | Self::Steal)
    }

    /// Whether other participants get a chance to respond at all.
    #[must_use]
    pub const fn is_contestable(&self) -> bool {
        self.claim().is_some() || !self.blockers().is_empty()
    }

    #[must_use]
    pub const fn cost(&self) -> Coins {
        match self {
            Self::Coup => COUP_COST,
            Self::Assassinate => ASSASSINATE_COST,
            _ => 0,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ParseError::UnknownOperand(s.to_string()))
    }
}

/// One participant as seen by one observer.
///
/// For the observer's own view, `deck` holds the real cards. For anyone
/// else it stays empty; only the influence count is public. Cards that were
/// lost face up are kept in `revealed`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub deck: Vec<Card>,
    pub revealed: Vec<Card>,
    pub influence: u8,
    pub coins: Coins,
    pub alive: bool,
}

impl PlayerView {
    #[must_use]
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            deck: Vec::with_capacity(MAX_INFLUENCE as usize),
            revealed: Vec::new(),
            influence: 0,
            coins: 0,
            alive: true,
        }
    }

    #[must_use]
    pub fn holds(&self, card: Card) -> bool {
        self.deck.contains(&card)
    }

    /// Distinct cards in the deck, in a stable order.
    #[must_use]
    pub fn distinct_cards(&self) -> Vec<Card> {
        let mut cards = self.deck.clone();
        cards.sort();
        cards.dedup();
        cards
    }

    /// Gain one influence. `card` is only known for the observer's own deck.
    pub fn gain(&mut self, card: Option<Card>) {
        self.influence = (self.influence + 1).min(MAX_INFLUENCE);
        if let Some(card) = card {
            if self.deck.len() < MAX_INFLUENCE as usize {
                self.deck.push(card);
            }
        }
    }

    /// Reveal and discard a card. Returns true if this eliminated the
    /// participant.
    pub fn lose(&mut self, card: Card) -> bool {
        self.take_card(card);
        self.revealed.push(card);
        self.influence = self.influence.saturating_sub(1);
        if self.influence == 0 && self.alive {
            self.alive = false;
            self.deck.clear();
            return true;
        }
        false
    }

    /// Put a shown card back in the court. The participant stays alive
    /// while waiting for the replacement.
    pub fn return_card(&mut self, card: Card) {
        self.take_card(card);
        self.influence = self.influence.saturating_sub(1);
    }

    /// Forfeit every remaining influence.
    pub fn eliminate(&mut self) {
        self.revealed.append(&mut self.deck);
        self.influence = 0;
        self.alive = false;
    }

    pub fn earn(&mut self, amount: Coins) {
        self.coins += amount;
    }

    /// Pay up to `amount` and return what was actually paid.
    pub fn pay(&mut self, amount: Coins) -> Coins {
        let paid = amount.min(self.coins);
        self.coins -= paid;
        paid
    }

    #[must_use]
    pub fn must_coup(&self) -> bool {
        self.coins >= FORCED_COUP_COINS
    }

    fn take_card(&mut self, card: Card) {
        if let Some(idx) = self.deck.iter().position(|c| *c == card) {
            self.deck.remove(idx);
        }
    }
}

impl fmt::Display for PlayerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.alive { "alive" } else { "out" };
        write!(
            f,
            "#{} {status} influence={} coins={}",
            self.id, self.influence, self.coins
        )
    }
}

/// The undealt cards, held by the dealer.
#[derive(Clone, Debug)]
pub struct Court {
    cards: Vec<Card>,
}

impl Court {
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn put_back(&mut self, card: Card) {
        self.cards.push(card);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[must_use]
    pub fn count(&self, card: Card) -> usize {
        self.cards.iter().filter(|c| **c == card).count()
    }
}

impl Default for Court {
    fn default() -> Self {
        let cards = Card::ALL
            .into_iter()
            .flat_map(|card| std::iter::repeat_n(card, COPIES_PER_CARD))
            .collect();
        Self { cards }
    }
}
