//! # Coup
//!
//! A networked implementation of the bluffing card game Coup, built around a
//! deterministic protocol state machine and a text relay server.
//!
//! The server never interprets game rules. It relays addressed text
//! envelopes between connections. Every client mirrors the whole game by
//! feeding the relayed messages, in order, into its own [`PlayerMachine`],
//! which tells it which protocol messages are legal right now. A pluggable
//! decision agent picks one of them.
//!
//! ## Architecture
//!
//! The game negotiation is a closed set of phases shared by every observer:
//!
//! - **Lobby**: roster, coins and initial deal
//! - **Turn**: the active participant declares an action
//! - **Reactions**: other participants accept, challenge or block, one at a time
//! - **Blocked**: a block is accepted or challenged
//! - **Challenged**: the claimant shows the claimed card or loses one
//! - **Replace / Lose**: shown cards are replaced, lost influence is revealed
//! - **Exchange / Choose**: the dealer draws, the exchanger keeps
//! - **GameOver**: one participant remains
//!
//! Each observer projects the shared phase onto its own [`PlayerState`].
//!
//! ## Core Modules
//!
//! - [`game`]: cards, views, session bookkeeping, the state machine, the dealer
//!   and the in-process table
//! - [`net`]: wire codec, framing, connection registry, router, server and client
//! - [`bot`]: decision agents
//!
//! ## Example
//!
//! ```
//! use coup::{PlayerMachine, PlayerState};
//!
//! let machine = PlayerMachine::new(1);
//! assert_eq!(machine.state(), PlayerState::Lobby);
//! ```

/// Networking components: codec, registry, router, server and client.
pub mod net;
pub use net::{client::{Client, ExitHandle}, messages, registry, router, server, utils};

/// Core game logic, entities and the protocol state machine.
pub mod game;
pub use game::{
    GameSession, GameSummary, Participant, PlayerMachine, PlayerState, ProtocolError, Table,
    constants::{self, MAX_PLAYERS, MIN_PLAYERS},
    entities::{self, Action, Card, PlayerId, PlayerView, ROOT},
};

/// Decision agents that choose among legal messages.
pub mod bot;
pub use bot::{Agent, DecisionAgent, PriorityAgent, RandomAgent};
