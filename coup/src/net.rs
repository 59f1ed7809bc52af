//! Networking layer for client-server communication.
//!
//! This module provides a line-oriented text protocol over TCP. The server
//! runs one blocking reader thread per connection and relays envelopes
//! through a shared, mutex-protected connection registry.

/// Blocking TCP client that drives a participant.
pub mod client;

/// Error types for parsing and client operation.
pub mod errors;

/// Envelope and game message codec.
pub mod messages;

/// Shared registry of live connections.
pub mod registry;

/// Addressing semantics for inbound envelopes.
pub mod router;

/// Thread-per-connection TCP server.
pub mod server;

/// Newline framing over byte streams.
pub mod utils;
