//! A whole game in one process.
//!
//! Seats are wired to a real [`Router`] through channel transports, so an
//! in-process game takes the same addressing path as a networked one, just
//! without sockets or threads.

use log::{debug, info, warn};
use std::{
    io,
    sync::{
        Arc,
        mpsc::{self, Receiver},
    },
};

use super::{
    constants::{MAX_PLAYERS, MIN_PLAYERS},
    entities::PlayerId,
    participant::{GameSummary, Participant, welcome_id},
};
use crate::bot::Agent;
use crate::net::{
    errors::ClientError,
    messages::{Envelope, GameMessage, decode_frame_bytes, encode_frame},
    registry::ConnectionRegistry,
    router::Router,
};

/// Frames a game may take before it is declared stuck.
pub const MAX_FRAMES: usize = 250_000;

#[derive(Debug)]
struct Seat {
    participant: Participant,
    inbox: Receiver<Vec<u8>>,
}

#[derive(Debug)]
pub struct Table {
    router: Router,
    seats: Vec<Seat>,
    frames: usize,
}

impl Table {
    /// Seat one participant per agent. The first agent sits at root and
    /// deals, shuffling with `seed`.
    pub fn new(agents: Vec<Agent>, seed: Option<u64>) -> Result<Self, ClientError> {
        let players = agents.len();
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&players) {
            return Err(ClientError::Seats(players));
        }
        let registry = Arc::new(ConnectionRegistry::new(players));
        let mut seats = Vec::with_capacity(players);
        for agent in agents {
            let (tx, inbox) = mpsc::channel();
            registry
                .register_with(tx, |id| {
                    Some(Envelope::single(id, GameMessage::hello(id)).to_string())
                })
                .map_err(io::Error::other)?;
            let welcome = inbox.try_recv().unwrap_or_default();
            let id = decode_frame_bytes(&welcome)
                .next()
                .and_then(Result::ok)
                .as_ref()
                .and_then(welcome_id)
                .ok_or_else(|| {
                    ClientError::NoWelcome(String::from_utf8_lossy(&welcome).trim().to_string())
                })?;
            seats.push(Seat {
                participant: Participant::new(id, players, agent, seed),
                inbox,
            });
        }
        Ok(Self {
            router: Router::new(registry),
            seats,
            frames: 0,
        })
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.seats.iter().map(|seat| &seat.participant)
    }

    /// Play until every seat has seen the game end.
    pub fn run(&mut self) -> Result<GameSummary, ClientError> {
        for seat in &mut self.seats {
            let sender = seat.participant.id();
            let out = seat.participant.join()?;
            send(&self.router, sender, &out);
        }

        loop {
            let mut progressed = false;
            for seat in &mut self.seats {
                while let Ok(frame) = seat.inbox.try_recv() {
                    progressed = true;
                    self.frames += 1;
                    if self.frames > MAX_FRAMES {
                        return Err(ClientError::Stalled(self.frames));
                    }
                    deliver(&self.router, &mut seat.participant, &frame)?;
                }
            }
            if !progressed {
                break;
            }
        }

        if !self.seats.iter().all(|seat| seat.participant.is_over()) {
            return Err(ClientError::Stalled(self.frames));
        }
        let summary = self
            .seats
            .first()
            .map(|seat| seat.participant.summary())
            .ok_or(ClientError::Seats(0))?;
        info!(
            "Game over after {} rounds and {} frames, winner {:?}",
            summary.rounds, self.frames, summary.winner
        );
        Ok(summary)
    }
}

fn deliver(router: &Router, participant: &mut Participant, frame: &[u8]) -> Result<(), ClientError> {
    for decoded in decode_frame_bytes(frame) {
        match decoded {
            Ok(envelope) => {
                let out = participant.receive(&envelope)?;
                send(router, participant.id(), &out);
            }
            Err(error) => warn!("#{}: dropping malformed envelope: {error}", participant.id()),
        }
    }
    Ok(())
}

fn send(router: &Router, sender: PlayerId, out: &[Envelope]) {
    if out.is_empty() {
        return;
    }
    let routed = router.route(sender, encode_frame(out).as_bytes());
    debug!(
        "#{sender} sent {} envelopes, {} deliveries",
        out.len(),
        routed.delivered
    );
    if routed.dropped > 0 {
        warn!("{} envelopes from #{sender} went nowhere", routed.dropped);
    }
}
