//! One seat at the game: a machine, an agent, and the dealer when seated at
//! root.
//!
//! A [`Participant`] is transport-agnostic. Feed it every envelope the
//! server delivers with [`Participant::receive`] and send back whatever it
//! returns, in order. The TCP [`Client`](crate::net::client::Client) and the
//! in-process [`Table`](super::table::Table) both drive one this way.
//!
//! ## Addressing
//!
//! - Cards dealt to someone else go to them alone; everyone else sees the
//!   same message with the card stripped
//! - A non-root exchanger tells root which card it kept and tells everyone
//!   else only that it kept one
//! - HELLO and READY go to root only
//! - Everything else goes to everyone

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;

use super::{
    constants::MAX_INFLUENCE,
    dealer::Dealer,
    entities::{PlayerId, ROOT},
    history::History,
    state_machine::PlayerMachine,
    states::PlayerState,
};
use crate::bot::{Agent, DecisionAgent, DecisionContext};
use crate::net::{
    errors::ClientError,
    messages::{Command, Envelope, GameMessage, Mode},
};

/// How a finished game went, as one participant saw it.
#[derive(Clone, Debug, Serialize)]
pub struct GameSummary {
    pub winner: Option<PlayerId>,
    pub rounds: u32,
    pub history: History,
}

/// The id a welcome envelope assigns, if it is one.
#[must_use]
pub fn welcome_id(envelope: &Envelope) -> Option<PlayerId> {
    match (envelope.mode, envelope.address, envelope.payload) {
        (Mode::Single, Some(address), Some(payload))
            if payload.command == Command::Hello && payload.actor == address =>
        {
            Some(address)
        }
        _ => None,
    }
}

#[derive(Debug)]
pub struct Participant {
    machine: PlayerMachine,
    dealer: Option<Dealer>,
    agent: Agent,
    history: History,
    ready_sent: bool,
}

impl Participant {
    /// A participant with connection id `id`. Root also deals, for a game
    /// of `expected` players shuffled by `seed`.
    #[must_use]
    pub fn new(id: PlayerId, expected: usize, agent: Agent, seed: Option<u64>) -> Self {
        Self {
            machine: PlayerMachine::new(id),
            dealer: (id == ROOT).then(|| Dealer::new(expected, seed)),
            agent,
            history: History::new(),
            ready_sent: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> PlayerId {
        self.machine.me()
    }

    #[must_use]
    pub fn machine(&self) -> &PlayerMachine {
        &self.machine
    }

    #[must_use]
    pub fn dealer(&self) -> Option<&Dealer> {
        self.dealer.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn is_over(&self) -> bool {
        self.machine.is_over()
    }

    #[must_use]
    pub fn summary(&self) -> GameSummary {
        GameSummary {
            winner: self.machine.winner(),
            rounds: self.machine.session().round(),
            history: self.history.clone(),
        }
    }

    /// Announce this participant to root. Root has nothing to say until
    /// someone joins.
    pub fn join(&mut self) -> Result<Vec<Envelope>, ClientError> {
        let mut out = Vec::new();
        if self.id() != ROOT {
            self.emit(GameMessage::hello(self.id()), &mut out)?;
        }
        self.pump(&mut out)?;
        Ok(out)
    }

    /// Apply one delivered envelope and return the envelopes to send in
    /// response. If the delivered message itself is rejected, the machine is
    /// left as it was.
    pub fn receive(&mut self, envelope: &Envelope) -> Result<Vec<Envelope>, ClientError> {
        let mut out = Vec::new();
        if envelope.mode == Mode::Disconnect {
            self.disconnected(envelope.address, &mut out)?;
            return Ok(out);
        }
        let Some(message) = envelope.payload else {
            debug!("#{}: ignoring empty envelope", self.id());
            return Ok(out);
        };
        let origin = envelope.address.unwrap_or(ROOT);

        self.machine.apply(&message)?;
        self.observe(origin, &message);
        if let Some(dealer) = self.dealer.as_mut() {
            let replies = dealer.observe(&message);
            for reply in replies {
                self.emit(reply, &mut out)?;
            }
        }
        self.pump(&mut out)?;
        Ok(out)
    }

    fn disconnected(
        &mut self,
        address: Option<PlayerId>,
        out: &mut Vec<Envelope>,
    ) -> Result<(), ClientError> {
        let (Some(player), Some(dealer)) = (address, self.dealer.as_ref()) else {
            debug!("#{}: ignoring disconnect notice", self.id());
            return Ok(());
        };
        info!("#{player} disconnected");
        for message in dealer.on_disconnect(player, &self.machine) {
            self.emit(message, out)?;
        }
        self.pump(out)
    }

    /// Keep saying whatever this participant owes the game until it is
    /// someone else's move.
    fn pump(&mut self, out: &mut Vec<Envelope>) -> Result<(), ClientError> {
        loop {
            if let (Some(cue), Some(dealer)) = (self.machine.dealer_cue(), self.dealer.as_mut()) {
                let Some(message) = dealer.serve(cue) else {
                    break;
                };
                self.emit(message, out)?;
                continue;
            }

            let state = self.machine.state();
            if state == PlayerState::Lobby && self.should_ready() {
                self.ready_sent = true;
                self.emit(GameMessage::ready(self.id()), out)?;
                continue;
            }
            if !state.requires_reply() {
                break;
            }

            let legal = self.machine.legal_messages();
            if legal.is_empty() {
                return Err(ClientError::NoLegalMessages(state));
            }
            let ctx = DecisionContext {
                me: self.machine.me(),
                state,
                session: self.machine.session(),
                history: &self.history,
            };
            let choice = self
                .agent
                .choose(&legal, &ctx)
                .ok_or(ClientError::NoSelection)?;
            if !legal.contains(&choice) {
                warn!("#{}: agent picked {choice}, which isn't legal", self.id());
                return Err(ClientError::NoSelection);
            }
            self.emit(choice, out)?;
        }
        Ok(())
    }

    fn should_ready(&self) -> bool {
        self.id() != ROOT
            && !self.ready_sent
            && self
                .machine
                .my_view()
                .is_some_and(|view| view.influence == MAX_INFLUENCE)
    }

    /// Apply an own message locally, let the dealer react, and address the
    /// lot. Dealer reactions are sent after the message that caused them.
    fn emit(&mut self, message: GameMessage, out: &mut Vec<Envelope>) -> Result<(), ClientError> {
        let mut queue = VecDeque::from([message]);
        while let Some(message) = queue.pop_front() {
            self.machine.apply(&message)?;
            self.observe(self.id(), &message);
            if let Some(dealer) = self.dealer.as_mut() {
                queue.extend(dealer.observe(&message));
            }
            out.extend(self.address(message));
        }
        Ok(())
    }

    fn observe(&mut self, origin: PlayerId, message: &GameMessage) {
        self.history.record(origin, message);
        let ctx = DecisionContext {
            me: self.machine.me(),
            state: self.machine.state(),
            session: self.machine.session(),
            history: &self.history,
        };
        self.agent.observe(message, &ctx);
    }

    fn address(&self, message: GameMessage) -> Vec<Envelope> {
        let me = self.id();
        let private = message.card().is_some();
        match message.command {
            Command::Deck | Command::Choose if private && message.actor != me => vec![
                Envelope::single(message.actor, message),
                Envelope::except(message.actor, message.public()),
            ],
            Command::Keep if private && me != ROOT => vec![
                Envelope::single(ROOT, message),
                Envelope::except(ROOT, message.public()),
            ],
            Command::Hello | Command::Ready if me != ROOT => vec![Envelope::single(ROOT, message)],
            _ => vec![Envelope::all(message.public())],
        }
    }
}
