//! Coup game engine.
//!
//! This module provides:
//! - The per-participant protocol state machine and its phases
//! - The game session: roster, turn order, eliminations
//! - The dealer run by root
//! - Participants, which tie a machine to an agent, and the in-process table

// Submodules
pub mod constants;
pub mod dealer;
pub mod entities;
pub mod history;
pub mod participant;
pub mod session;
pub mod state_machine;
pub mod states;
pub mod table;

pub use participant::{GameSummary, Participant};
pub use session::{GameSession, SessionError};
pub use state_machine::{PlayerMachine, ProtocolError};
pub use states::PlayerState;
pub use table::Table;
