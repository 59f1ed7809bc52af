//! The per-participant protocol state machine.
//!
//! A [`PlayerMachine`] mirrors the whole game from one participant's seat.
//! Feed it every game message in relay order with [`PlayerMachine::apply`];
//! ask it what this participant may say with
//! [`PlayerMachine::legal_messages`].

use log::{debug, warn};
use std::collections::VecDeque;
use thiserror::Error;

use super::{
    constants::{EXCHANGE_DRAW, STEAL_AMOUNT},
    entities::{Action, Card, PlayerId, PlayerView},
    session::{GameSession, SessionError},
    states::{Block, Continuation, DealerCue, Pending, Phase, PlayerState},
};
use crate::net::messages::{Command, GameMessage};

/// Errors from applying a message the machine can't accept. The machine is
/// left unchanged when one is returned.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ProtocolError {
    #[error("unexpected {message} during {phase}")]
    Unexpected {
        phase: &'static str,
        message: GameMessage,
    },
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("player {0} is out")]
    NotAlive(PlayerId),
    #[error("{player} can't afford {action}")]
    InsufficientCoins { player: PlayerId, action: Action },
    #[error("{0} holds 10 or more coins and must coup")]
    ForcedCoup(PlayerId),
    #[error("invalid target for {action}")]
    InvalidTarget { action: Action },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// One participant's mirror of the game.
#[derive(Clone, Debug)]
pub struct PlayerMachine {
    me: PlayerId,
    session: GameSession,
    phase: Phase,
    /// Own cards to choose from during an exchange.
    candidates: Vec<Card>,
    /// Own cards kept so far during an exchange.
    kept: Vec<Card>,
}

impl PlayerMachine {
    #[must_use]
    pub fn new(me: PlayerId) -> Self {
        Self {
            me,
            session: GameSession::new(),
            phase: Phase::Lobby,
            candidates: Vec::new(),
            kept: Vec::new(),
        }
    }

    #[must_use]
    pub fn me(&self) -> PlayerId {
        self.me
    }

    #[must_use]
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    #[must_use]
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// This participant's own view, once they are on the roster.
    #[must_use]
    pub fn my_view(&self) -> Option<&PlayerView> {
        self.session.view(self.me)
    }

    #[must_use]
    pub fn candidates(&self) -> &[Card] {
        &self.candidates
    }

    #[must_use]
    pub fn is_over(&self) -> bool {
        matches!(self.phase, Phase::GameOver { .. })
    }

    #[must_use]
    pub fn winner(&self) -> Option<PlayerId> {
        match self.phase {
            Phase::GameOver { winner } => winner,
            _ => None,
        }
    }

    /// Project the shared phase onto this participant.
    #[must_use]
    pub fn state(&self) -> PlayerState {
        let me = self.me;
        match &self.phase {
            Phase::Lobby => return PlayerState::Lobby,
            Phase::GameOver { .. } => return PlayerState::GameOver,
            _ => {}
        }
        if !self.session.is_alive(me) {
            return PlayerState::Eliminated;
        }
        match &self.phase {
            Phase::Turn { actor } if *actor == me => PlayerState::MyTurn,
            Phase::Reactions { pending, remaining } if remaining.front() == Some(&me) => {
                PlayerState::pending(pending, me)
            }
            Phase::Blocked {
                pending,
                block,
                remaining,
            } if remaining.front() == Some(&me) => PlayerState::blocked(pending, block),
            Phase::Challenged { claimant, .. } if *claimant == me => PlayerState::AwaitShow,
            Phase::Lose { player, .. } if *player == me => PlayerState::AwaitLose,
            Phase::Choose { actor, .. } if *actor == me => PlayerState::ExchangeChoose,
            _ => PlayerState::OtherTurn,
        }
    }

    /// Whether this participant must reply before anyone else can speak.
    #[must_use]
    pub fn awaiting_reply(&self) -> bool {
        self.state().requires_reply()
    }

    /// What the dealer owes the game before anyone can continue.
    #[must_use]
    pub fn dealer_cue(&self) -> Option<DealerCue> {
        match self.phase {
            Phase::Replace { player, .. } => Some(DealerCue::Replace { player }),
            Phase::Exchange { actor, drawn } => Some(DealerCue::Exchange { actor, drawn }),
            _ => None,
        }
    }

    /// Every message this participant may send right now, without
    /// duplicates. Empty when it isn't their move.
    #[must_use]
    pub fn legal_messages(&self) -> Vec<GameMessage> {
        let me = self.me;
        let Some(view) = self.my_view() else {
            return Vec::new();
        };
        match (self.state(), &self.phase) {
            (PlayerState::MyTurn, _) => self.turn_actions(view),
            (
                PlayerState::PendingForeignAid
                | PlayerState::PendingTax
                | PlayerState::PendingExchange
                | PlayerState::PendingAssassinateTarget
                | PlayerState::PendingAssassinateBystander
                | PlayerState::PendingStealTarget
                | PlayerState::PendingStealBystander,
                Phase::Reactions { pending, .. },
            ) => {
                let mut legal = vec![GameMessage::ok(me)];
                if pending.is_challengeable() {
                    legal.push(GameMessage::chal(me, pending.actor));
                }
                if pending.may_block(me) {
                    legal.extend(
                        pending
                            .action
                            .blockers()
                            .iter()
                            .filter(|card| view.holds(**card))
                            .map(|card| GameMessage::block(me, pending.actor, *card)),
                    );
                }
                legal
            }
            (
                PlayerState::BlockForeignAid
                | PlayerState::BlockAssassinate
                | PlayerState::BlockStealAmbassador
                | PlayerState::BlockStealCaptain,
                Phase::Blocked { block, .. },
            ) => vec![GameMessage::ok(me), GameMessage::chal(me, block.blocker)],
            (PlayerState::AwaitShow, Phase::Challenged { card, .. }) => {
                let show = view
                    .holds(*card)
                    .then(|| GameMessage::show(me, *card));
                show.into_iter().chain(self.concessions(view)).collect()
            }
            (PlayerState::AwaitLose, _) => self.concessions(view),
            (PlayerState::ExchangeChoose, _) => {
                let mut cards = self.candidates.clone();
                cards.sort();
                cards.dedup();
                cards
                    .into_iter()
                    .map(|card| GameMessage::keep(me, Some(card)))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn concessions(&self, view: &PlayerView) -> Vec<GameMessage> {
        view.distinct_cards()
            .into_iter()
            .map(|card| GameMessage::lose(self.me, card))
            .collect()
    }

    fn turn_actions(&self, view: &PlayerView) -> Vec<GameMessage> {
        let me = self.me;
        let opponents = self.session.alive_opponents(me);
        let coup = opponents
            .iter()
            .map(|target| GameMessage::act(me, Action::Coup, Some(*target)));
        if view.must_coup() {
            return coup.collect();
        }

        let mut legal = vec![
            GameMessage::act(me, Action::Income, None),
            GameMessage::act(me, Action::ForeignAid, None),
        ];
        if view.holds(Card::Duke) {
            legal.push(GameMessage::act(me, Action::Tax, None));
        }
        if view.holds(Card::Ambassador) {
            legal.push(GameMessage::act(me, Action::Exchange, None));
        }
        for action in [Action::Steal, Action::Assassinate] {
            let claimed = action.claim().is_some_and(|card| view.holds(card));
            if claimed && view.coins >= action.cost() {
                legal.extend(
                    opponents
                        .iter()
                        .map(|target| GameMessage::act(me, action, Some(*target))),
                );
            }
        }
        if view.coins >= Action::Coup.cost() {
            legal.extend(coup);
        }
        legal
    }

    /// Apply one relayed message. On error the machine is unchanged.
    pub fn apply(&mut self, message: &GameMessage) -> Result<(), ProtocolError> {
        let snapshot = self.clone();
        let result = self.transition(message);
        if let Err(error) = &result {
            debug!("#{} rejected {message}: {error}", self.me);
            *self = snapshot;
        }
        result
    }

    fn transition(&mut self, msg: &GameMessage) -> Result<(), ProtocolError> {
        let unexpected = ProtocolError::Unexpected {
            phase: self.phase.name(),
            message: *msg,
        };
        match msg.command {
            Command::Hello | Command::Ready => return Ok(()),
            Command::Illegal => {
                warn!("#{} reported an illegal message", msg.actor);
                return Ok(());
            }
            Command::Exit => return self.exit(msg.actor),
            Command::Turn => return self.force_turn(msg.actor, unexpected),
            _ => {}
        }

        let from = msg.actor;
        let phase = std::mem::replace(&mut self.phase, Phase::Lobby);
        match (phase, msg.command) {
            (Phase::Lobby, Command::Player) => {
                self.session.add_player(from)?;
            }
            (Phase::Lobby, Command::Coins) => {
                let amount = msg.amount().ok_or(unexpected)?;
                self.view_mut(from)?.coins = amount;
            }
            (Phase::Lobby, Command::Deck) => {
                let card = self.own_card(from, msg);
                self.view_mut(from)?.gain(card);
            }
            (Phase::Lobby, Command::Start) => {
                let first = self.session.begin().ok_or(unexpected)?;
                self.phase = Phase::Turn { actor: first };
            }

            (Phase::Turn { actor }, Command::Act) if actor == from => {
                let action = msg.action().ok_or(unexpected)?;
                self.act(actor, action, msg.target)?;
            }

            (
                Phase::Reactions {
                    pending,
                    mut remaining,
                },
                Command::Ok,
            ) if remaining.front() == Some(&from) => {
                remaining.pop_front();
                self.enter(Continuation::Reactions { pending, remaining })?;
            }
            (
                Phase::Reactions {
                    pending,
                    mut remaining,
                },
                Command::Chal,
            ) if remaining.front() == Some(&from)
                && msg.target == Some(pending.actor)
                && pending.is_challengeable() =>
            {
                remaining.pop_front();
                let card = pending.action.claim().ok_or(unexpected)?;
                let upheld = Continuation::Reactions {
                    pending: Pending {
                        proven: true,
                        ..pending
                    },
                    remaining,
                };
                self.phase = Phase::Challenged {
                    claimant: pending.actor,
                    card,
                    challenger: from,
                    upheld: Box::new(upheld),
                    refuted: Box::new(Continuation::Void),
                };
            }
            (Phase::Reactions { pending, remaining }, Command::Block)
                if remaining.front() == Some(&from)
                    && msg.target == Some(pending.actor)
                    && pending.may_block(from) =>
            {
                let card = msg
                    .card()
                    .filter(|card| pending.action.blockers().contains(card))
                    .ok_or(unexpected)?;
                let responders: VecDeque<_> = self.session.alive_after(from).into();
                if responders.is_empty() {
                    self.resolve();
                } else {
                    self.phase = Phase::Blocked {
                        pending,
                        block: Block {
                            blocker: from,
                            card,
                        },
                        remaining: responders,
                    };
                }
            }

            (
                Phase::Blocked {
                    pending,
                    block,
                    mut remaining,
                },
                Command::Ok,
            ) if remaining.front() == Some(&from) => {
                remaining.pop_front();
                remaining.retain(|id| self.session.is_alive(*id));
                if remaining.is_empty() {
                    debug!("Block by #{} stands", block.blocker);
                    self.resolve();
                } else {
                    self.phase = Phase::Blocked {
                        pending,
                        block,
                        remaining,
                    };
                }
            }
            (
                Phase::Blocked {
                    pending,
                    block,
                    remaining,
                },
                Command::Chal,
            ) if remaining.front() == Some(&from) && msg.target == Some(block.blocker) =>
            {
                self.phase = Phase::Challenged {
                    claimant: block.blocker,
                    card: block.card,
                    challenger: from,
                    upheld: Box::new(Continuation::Void),
                    refuted: Box::new(Continuation::Execute(pending)),
                };
            }

            (
                Phase::Challenged {
                    claimant,
                    card,
                    challenger,
                    upheld,
                    ..
                },
                Command::Show,
            ) if claimant == from && msg.card() == Some(card) => {
                self.view_mut(claimant)?.return_card(card);
                self.phase = Phase::Replace {
                    player: claimant,
                    then: Box::new(Continuation::Lose {
                        player: challenger,
                        then: upheld,
                    }),
                };
            }
            (
                Phase::Challenged {
                    claimant, refuted, ..
                },
                Command::Lose,
            ) if claimant == from => {
                let card = msg.card().ok_or(unexpected)?;
                self.lose(claimant, card)?;
                if !self.game_over() {
                    self.enter(*refuted)?;
                }
            }

            (Phase::Replace { player, then }, Command::Deck) if player == from => {
                let card = self.own_card(from, msg);
                self.view_mut(player)?.gain(card);
                self.enter(*then)?;
            }

            (Phase::Lose { player, then }, Command::Lose) if player == from => {
                let card = msg.card().ok_or(unexpected)?;
                self.lose(player, card)?;
                if !self.game_over() {
                    self.enter(*then)?;
                }
            }

            (Phase::Exchange { actor, drawn }, Command::Choose) if actor == from => {
                if let Some(card) = self.own_card(from, msg) {
                    self.candidates.push(card);
                }
                let drawn = drawn + 1;
                if drawn < EXCHANGE_DRAW {
                    self.phase = Phase::Exchange { actor, drawn };
                } else {
                    let keep = self.view(actor)?.influence;
                    self.phase = Phase::Choose {
                        actor,
                        keep,
                        kept: 0,
                    };
                }
            }

            (Phase::Choose { actor, keep, kept }, Command::Keep) if actor == from => {
                if actor == self.me {
                    let card = msg.card().ok_or(unexpected.clone())?;
                    let idx = self
                        .candidates
                        .iter()
                        .position(|c| *c == card)
                        .ok_or(unexpected)?;
                    self.kept.push(self.candidates.remove(idx));
                }
                let kept = kept + 1;
                if kept < keep {
                    self.phase = Phase::Choose { actor, keep, kept };
                } else {
                    if actor == self.me {
                        let kept = std::mem::take(&mut self.kept);
                        self.view_mut(actor)?.deck = kept;
                        self.candidates.clear();
                    }
                    self.resolve();
                }
            }

            _ => return Err(unexpected),
        }
        Ok(())
    }

    /// Declare `action`. Costs are paid up front and never refunded.
    fn act(
        &mut self,
        actor: PlayerId,
        action: Action,
        target: Option<PlayerId>,
    ) -> Result<(), ProtocolError> {
        let view = self.view(actor)?;
        if view.must_coup() && action != Action::Coup {
            return Err(ProtocolError::ForcedCoup(actor));
        }
        if view.coins < action.cost() {
            return Err(ProtocolError::InsufficientCoins {
                player: actor,
                action,
            });
        }
        let target_ok = match target {
            Some(target) => target != actor && self.session.is_alive(target),
            None => true,
        };
        if action.is_targeted() != target.is_some() || !target_ok {
            return Err(ProtocolError::InvalidTarget { action });
        }
        self.view_mut(actor)?.pay(action.cost());

        let pending = Pending {
            actor,
            action,
            target,
            proven: false,
        };
        match (action, target) {
            (Action::Income, _) => {
                self.view_mut(actor)?.earn(1);
                self.resolve();
                Ok(())
            }
            (Action::Coup, Some(target)) => self.enter(Continuation::Lose {
                player: target,
                then: Box::new(Continuation::Void),
            }),
            _ => self.enter(Continuation::Reactions {
                pending,
                remaining: self.session.alive_after(actor).into(),
            }),
        }
    }

    /// Move into `next`, skipping whatever no longer applies.
    fn enter(&mut self, next: Continuation) -> Result<(), ProtocolError> {
        match next {
            Continuation::Reactions {
                pending,
                mut remaining,
            } => {
                remaining.retain(|id| self.session.is_alive(*id));
                if remaining.is_empty() {
                    self.execute(pending)
                } else {
                    self.phase = Phase::Reactions { pending, remaining };
                    Ok(())
                }
            }
            Continuation::Execute(pending) => self.execute(pending),
            Continuation::Void => {
                self.resolve();
                Ok(())
            }
            Continuation::Lose { player, then } => {
                if self.session.is_alive(player) {
                    self.phase = Phase::Lose { player, then };
                    Ok(())
                } else {
                    self.enter(*then)
                }
            }
        }
    }

    fn execute(&mut self, pending: Pending) -> Result<(), ProtocolError> {
        let Pending {
            actor,
            action,
            target,
            ..
        } = pending;
        if !self.session.is_alive(actor) {
            self.resolve();
            return Ok(());
        }
        debug!("#{actor} {action} resolves");
        match (action, target) {
            (Action::ForeignAid, _) => self.view_mut(actor)?.earn(2),
            (Action::Tax, _) => self.view_mut(actor)?.earn(3),
            (Action::Steal, Some(target)) => {
                let taken = self.view_mut(target)?.pay(STEAL_AMOUNT);
                self.view_mut(actor)?.earn(taken);
            }
            (Action::Assassinate, Some(target)) => {
                return self.enter(Continuation::Lose {
                    player: target,
                    then: Box::new(Continuation::Void),
                });
            }
            (Action::Exchange, _) => {
                if actor == self.me {
                    self.candidates = self.view(actor)?.deck.clone();
                    self.kept.clear();
                }
                self.phase = Phase::Exchange { actor, drawn: 0 };
                return Ok(());
            }
            (Action::Income | Action::Coup | Action::Steal | Action::Assassinate, _) => {}
        }
        self.resolve();
        Ok(())
    }

    /// The action is fully settled: pass the turn on.
    fn resolve(&mut self) {
        self.phase = match self.session.advance() {
            Some(actor) => Phase::Turn { actor },
            None => Phase::GameOver {
                winner: self.session.winner(),
            },
        };
    }

    fn lose(&mut self, player: PlayerId, card: Card) -> Result<(), ProtocolError> {
        if self.view_mut(player)?.lose(card) {
            debug!("#{player} is out");
        }
        Ok(())
    }

    /// Switch to `GameOver` if at most one participant is left.
    fn game_over(&mut self) -> bool {
        if self.session.is_over() {
            self.phase = Phase::GameOver {
                winner: self.session.winner(),
            };
            return true;
        }
        false
    }

    fn force_turn(&mut self, actor: PlayerId, unexpected: ProtocolError) -> Result<(), ProtocolError> {
        match self.phase {
            Phase::Lobby | Phase::GameOver { .. } => return Err(unexpected),
            Phase::Turn { actor: current } if current == actor => return Ok(()),
            _ => {}
        }
        if !self.session.set_turn(actor) {
            return Err(ProtocolError::NotAlive(actor));
        }
        self.candidates.clear();
        self.kept.clear();
        self.phase = Phase::Turn { actor };
        Ok(())
    }

    /// `player` left. Their part in the current negotiation is dropped and
    /// whatever depended on it settles as if they had given up.
    fn exit(&mut self, player: PlayerId) -> Result<(), ProtocolError> {
        if !self.session.is_started() {
            self.session.remove_player(player);
            return Ok(());
        }
        if !self.session.eliminate(player) || matches!(self.phase, Phase::GameOver { .. }) {
            return Ok(());
        }
        if self.game_over() {
            return Ok(());
        }
        let phase = std::mem::replace(&mut self.phase, Phase::Lobby);
        match phase {
            Phase::Turn { actor }
            | Phase::Exchange { actor, .. }
            | Phase::Choose { actor, .. }
                if actor == player =>
            {
                self.candidates.clear();
                self.kept.clear();
                self.resolve();
            }
            Phase::Reactions { pending, .. } | Phase::Blocked { pending, .. }
                if pending.actor == player =>
            {
                self.resolve();
            }
            Phase::Reactions { pending, remaining } => {
                self.enter(Continuation::Reactions { pending, remaining })?;
            }
            Phase::Blocked { pending, block, .. } if block.blocker == player => {
                self.enter(Continuation::Execute(pending))?;
            }
            Phase::Blocked {
                pending,
                block,
                mut remaining,
            } => {
                remaining.retain(|id| self.session.is_alive(*id));
                if remaining.is_empty() {
                    self.resolve();
                } else {
                    self.phase = Phase::Blocked {
                        pending,
                        block,
                        remaining,
                    };
                }
            }
            Phase::Challenged {
                claimant, refuted, ..
            } if claimant == player => self.enter(*refuted)?,
            Phase::Challenged {
                challenger, upheld, ..
            } if challenger == player => self.enter(*upheld)?,
            Phase::Replace { player: owed, then } | Phase::Lose { player: owed, then }
                if owed == player =>
            {
                self.enter(*then)?;
            }
            other => self.phase = other,
        }
        Ok(())
    }

    /// The card in `msg` if it is about this participant. Cards about
    /// anyone else are ignored.
    fn own_card(&self, from: PlayerId, msg: &GameMessage) -> Option<Card> {
        (from == self.me).then(|| msg.card()).flatten()
    }

    fn view(&self, id: PlayerId) -> Result<&PlayerView, ProtocolError> {
        self.session.view(id).ok_or(ProtocolError::UnknownPlayer(id))
    }

    fn view_mut(&mut self, id: PlayerId) -> Result<&mut PlayerView, ProtocolError> {
        self.session
            .view_mut(id)
            .ok_or(ProtocolError::UnknownPlayer(id))
    }
}
