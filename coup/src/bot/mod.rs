//! Automated players.
//!
//! ## Agents
//!
//! ### Random
//! - Picks uniformly among the legal messages
//! - Never bluffs, since bluffs are never legal
//!
//! ### Priority
//! - COUP, then ASSASSINATE, then an honest BLOCK, then TAX, then INCOME
//! - Challenges claims that card counting rules out
//! - Sometimes challenges claims that contradict what an opponent already
//!   claimed
//! - Shows when challenged honestly, otherwise gives up its least valuable card
//!
//! ## Example
//!
//! ```
//! use coup::bot::{Agent, DecisionAgent, DecisionContext};
//! use coup::game::{GameSession, PlayerState, history::History};
//! use coup::net::messages::GameMessage;
//! use coup::entities::Action;
//!
//! let session = GameSession::new();
//! let history = History::new();
//! let ctx = DecisionContext { me: 1, state: PlayerState::MyTurn, session: &session, history: &history };
//! let legal = [GameMessage::act(1, Action::Income, None)];
//! let mut agent = Agent::priority(Some(3));
//! assert_eq!(agent.choose(&legal, &ctx), Some(legal[0]));
//! ```

pub mod decision;
pub mod models;

pub use decision::{Agent, DecisionAgent, PriorityAgent, RandomAgent};
pub use models::{Beliefs, DecisionContext};
