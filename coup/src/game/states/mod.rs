//! Shared negotiation phases and their per-observer projection.
//!
//! Every observer holds the same [`Phase`] because every observer applies the
//! same messages in the same order. [`PlayerState`] is what one observer
//! makes of that phase: whether it is their move, and what kind of move.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::game::entities::{Action, Card, PlayerId};

/// An action that has been declared but not carried out.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Pending {
    pub actor: PlayerId,
    pub action: Action,
    pub target: Option<PlayerId>,
    /// The claim survived a challenge, so it can't be challenged again.
    pub proven: bool,
}

impl Pending {
    #[must_use]
    pub fn is_challengeable(&self) -> bool {
        self.action.claim().is_some() && !self.proven
    }

    /// Whether `responder` may block this action.
    #[must_use]
    pub fn may_block(&self, responder: PlayerId) -> bool {
        match self.action {
            Action::ForeignAid => true,
            Action::Assassinate | Action::Steal => self.target == Some(responder),
            _ => false,
        }
    }
}

/// A block declared against a pending action.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Block {
    pub blocker: PlayerId,
    pub card: Card,
}

/// What happens once the current sub-negotiation is settled.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Continuation {
    /// Keep collecting reactions to the pending action.
    Reactions {
        pending: Pending,
        remaining: VecDeque<PlayerId>,
    },
    /// Carry out the pending action.
    Execute(Pending),
    /// Nothing more happens this turn.
    Void,
    /// `player` loses one influence, then continue.
    Lose {
        player: PlayerId,
        then: Box<Continuation>,
    },
}

/// The negotiation state shared by every observer.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Phase {
    /// Roster, coins and initial deal.
    Lobby,
    /// `actor` must declare an action.
    Turn { actor: PlayerId },
    /// The front of `remaining` must accept, challenge or block.
    Reactions {
        pending: Pending,
        remaining: VecDeque<PlayerId>,
    },
    /// The front of `remaining` must accept or challenge the block.
    Blocked {
        pending: Pending,
        block: Block,
        remaining: VecDeque<PlayerId>,
    },
    /// `claimant` must show `card` or lose an influence.
    Challenged {
        claimant: PlayerId,
        card: Card,
        challenger: PlayerId,
        /// Continues here if the claim holds.
        upheld: Box<Continuation>,
        /// Continues here if the claim was a bluff.
        refuted: Box<Continuation>,
    },
    /// The dealer owes `player` a card in place of one they showed.
    Replace {
        player: PlayerId,
        then: Box<Continuation>,
    },
    /// `player` must lose an influence.
    Lose {
        player: PlayerId,
        then: Box<Continuation>,
    },
    /// The dealer is drawing for `actor`'s exchange.
    Exchange { actor: PlayerId, drawn: u8 },
    /// `actor` keeps `keep` of their candidates.
    Choose { actor: PlayerId, keep: u8, kept: u8 },
    GameOver { winner: Option<PlayerId> },
}

impl Phase {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Lobby => "Lobby",
            Self::Turn { .. } => "Turn",
            Self::Reactions { .. } => "Reactions",
            Self::Blocked { .. } => "Blocked",
            Self::Challenged { .. } => "Challenged",
            Self::Replace { .. } => "Replace",
            Self::Lose { .. } => "Lose",
            Self::Exchange { .. } => "Exchange",
            Self::Choose { .. } => "Choose",
            Self::GameOver { .. } => "GameOver",
        }
    }
}

/// Work the dealer must do before the negotiation can continue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DealerCue {
    /// Deal `player` a card in place of the one they showed.
    Replace { player: PlayerId },
    /// Draw the rest of `actor`'s exchange.
    Exchange { actor: PlayerId, drawn: u8 },
}

/// The protocol situation of one participant.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum PlayerState {
    Lobby,
    MyTurn,
    OtherTurn,
    PendingForeignAid,
    PendingTax,
    PendingExchange,
    PendingAssassinateTarget,
    PendingAssassinateBystander,
    PendingStealTarget,
    PendingStealBystander,
    BlockForeignAid,
    BlockAssassinate,
    BlockStealAmbassador,
    BlockStealCaptain,
    AwaitShow,
    AwaitLose,
    ExchangeChoose,
    Eliminated,
    GameOver,
}

impl PlayerState {
    /// Whether the participant must send exactly one message now.
    #[must_use]
    pub const fn requires_reply(&self) -> bool {
        !matches!(
            self,
            Self::Lobby | Self::OtherTurn | Self::Eliminated | Self::GameOver
        )
    }

    /// The state of a responder asked to react to `pending`.
    #[must_use]
    pub fn pending(pending: &Pending, me: PlayerId) -> Self {
        let targeted = pending.target == Some(me);
        match pending.action {
            Action::ForeignAid => Self::PendingForeignAid,
            Action::Tax => Self::PendingTax,
            Action::Exchange => Self::PendingExchange,
            Action::Assassinate if targeted => Self::PendingAssassinateTarget,
            Action::Assassinate => Self::PendingAssassinateBystander,
            Action::Steal if targeted => Self::PendingStealTarget,
            Action::Steal => Self::PendingStealBystander,
            // never collect reactions
            Action::Income | Action::Coup => Self::OtherTurn,
        }
    }

    /// The state of a responder asked to react to `block`.
    #[must_use]
    pub fn blocked(pending: &Pending, block: &Block) -> Self {
        match (pending.action, block.card) {
            (Action::ForeignAid, _) => Self::BlockForeignAid,
            (Action::Assassinate, _) => Self::BlockAssassinate,
            (Action::Steal, Card::Ambassador) => Self::BlockStealAmbassador,
            (Action::Steal, _) => Self::BlockStealCaptain,
            _ => Self::OtherTurn,
        }
    }
}
