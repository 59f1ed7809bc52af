//! Error types for the wire codec, the connection registry and the client.

use std::io;

use thiserror::Error;

use crate::game::{
    PlayerState, ProtocolError,
    constants::{MAX_PLAYERS, MIN_PLAYERS},
};

/// Errors that can occur while decoding one envelope line.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParseError {
    /// The line held no fields at all
    #[error("empty envelope")]
    Empty,

    #[error("unknown mode `{0}`")]
    UnknownMode(String),

    /// The address was neither an integer nor `*`
    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// A field that the command requires was absent
    #[error("missing {0}")]
    MissingField(&'static str),

    /// A participant id that is not a non-negative integer
    #[error("invalid id `{0}`")]
    InvalidId(String),

    /// Neither an action, a card nor an amount
    #[error("unknown operand `{0}`")]
    UnknownOperand(String),

    #[error("payload has {0} fields, at most 4 are allowed")]
    TooManyFields(usize),

    /// Well-formed fields that don't fit the command's schema
    #[error("malformed {command}: {reason}")]
    Malformed {
        command: &'static str,
        reason: &'static str,
    },

    /// A line whose bytes aren't UTF-8
    #[error("envelope is not valid UTF-8")]
    NotUtf8,

    /// A DISCONNECT envelope that carries a payload
    #[error("DISCONNECT carries no payload")]
    UnexpectedPayload,
}

/// Errors returned by the connection registry.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("connection limit of {0} reached")]
    Full(usize),
}

/// Errors that end a client's decision loop.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A reply was required but nothing was legal
    #[error("no legal messages in state {0:?}")]
    NoLegalMessages(PlayerState),

    /// The agent declined to pick one of the legal messages
    #[error("agent made no selection")]
    NoSelection,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server closed the connection before the game ended
    #[error("disconnected from server")]
    Disconnected,

    /// The first frame from the server wasn't a welcome
    #[error("expected a welcome, got {0:?}")]
    NoWelcome(String),

    /// Every participant is waiting on someone else
    #[error("game stalled after {0} frames")]
    Stalled(usize),

    #[error("a table seats {min} to {max} players, got {0}", min = MIN_PLAYERS, max = MAX_PLAYERS)]
    Seats(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type for envelope decoding
pub type Result<T> = std::result::Result<T, ParseError>;
