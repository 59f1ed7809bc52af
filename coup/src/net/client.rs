//! A blocking TCP client that plays one seat.
//!
//! A reader thread turns incoming frames into envelopes and queues them on a
//! channel; [`Client::play`] drains that channel through a
//! [`Participant`] and writes back whatever it says, one frame per inbound
//! envelope.

use log::{debug, error, info, warn};
use std::{
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use super::{
    errors::ClientError,
    messages::{Envelope, GameMessage, decode_frame_bytes, encode_frame},
    utils::{FrameReader, write_frame},
};
use crate::bot::Agent;
use crate::game::{
    entities::PlayerId,
    participant::{GameSummary, Participant, welcome_id},
};

/// Default timeout for writing to the server.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the welcome after connecting.
pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Client {
    id: PlayerId,
    stream: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
    playing: Arc<AtomicBool>,
    inbox: Receiver<Envelope>,
    reader: Option<JoinHandle<()>>,
}

/// Takes a client out of its game from another thread, for example a signal
/// handler, while [`Client::play`] is blocked on the next message.
#[derive(Clone, Debug)]
pub struct ExitHandle {
    id: PlayerId,
    writer: Arc<Mutex<TcpStream>>,
    playing: Arc<AtomicBool>,
}

impl ExitHandle {
    /// Announce EXIT if the game is still running for this client, then ask
    /// the server to drop the connection. Both go out as one frame, so the
    /// EXIT always reaches the others before root hears of the disconnect.
    pub fn leave(&self) -> Result<(), ClientError> {
        let mut envelopes = Vec::with_capacity(2);
        if self.playing.swap(false, Ordering::SeqCst) {
            info!("#{} leaving the game", self.id);
            envelopes.push(Envelope::all(GameMessage::exit(self.id)));
        }
        envelopes.push(Envelope::disconnect(None));
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_frame(&mut *writer, &encode_frame(&envelopes))?;
        Ok(())
    }
}

impl Client {
    /// Connect and wait for the server to assign an id.
    ///
    /// This method attempts to connect with backoff, trying three times with
    /// increasing timeouts (100ms, 500ms, 1s).
    ///
    /// # Errors
    ///
    /// Returns an error if unable to connect or if the first frame isn't a
    /// welcome.
    pub fn connect(addr: &SocketAddr) -> Result<Self, ClientError> {
        let mut connect_timeouts = vec![
            Duration::from_secs(1),
            Duration::from_millis(500),
            Duration::from_millis(100),
        ];
        let mut last_error = None;
        while let Some(connect_timeout) = connect_timeouts.pop() {
            match TcpStream::connect_timeout(addr, connect_timeout) {
                Ok(stream) => return Self::handshake(stream),
                Err(error) => {
                    debug!("Connecting to {addr} failed: {error}");
                    last_error = Some(error);
                    thread::sleep(connect_timeout);
                }
            }
        }
        Err(last_error.map_or(ClientError::Disconnected, ClientError::Io))
    }

    fn handshake(stream: TcpStream) -> Result<Self, ClientError> {
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        stream.set_read_timeout(Some(WELCOME_TIMEOUT))?;

        let mut reader = FrameReader::new(stream.try_clone()?);
        let frame = reader.read_frame()?.ok_or(ClientError::Disconnected)?;
        let mut envelopes = decode_frame_bytes(&frame);
        let id = envelopes
            .next()
            .and_then(Result::ok)
            .as_ref()
            .and_then(welcome_id)
            .ok_or_else(|| {
                ClientError::NoWelcome(String::from_utf8_lossy(&frame).trim().to_string())
            })?;
        stream.set_read_timeout(None)?;
        info!("Connected as #{id}");

        let (tx, inbox) = mpsc::channel();
        // Anything that arrived with the welcome goes first
        for envelope in envelopes.flatten() {
            let _ = tx.send(envelope);
        }
        let reader = thread::Builder::new()
            .name(format!("reader-{id}"))
            .spawn(move || read_loop(reader, &tx))?;
        Ok(Self {
            id,
            writer: Arc::new(Mutex::new(stream.try_clone()?)),
            stream,
            playing: Arc::new(AtomicBool::new(false)),
            inbox,
            reader: Some(reader),
        })
    }

    #[must_use]
    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Send envelopes as one frame.
    pub fn send(&mut self, envelopes: &[Envelope]) -> Result<(), ClientError> {
        if envelopes.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_frame(&mut *writer, &encode_frame(envelopes))?;
        Ok(())
    }

    #[must_use]
    pub fn exit_handle(&self) -> ExitHandle {
        ExitHandle {
            id: self.id,
            writer: Arc::clone(&self.writer),
            playing: Arc::clone(&self.playing),
        }
    }

    /// Next delivered envelope, blocking. `None` once the server is gone.
    pub fn recv(&self) -> Option<Envelope> {
        self.inbox.recv().ok()
    }

    /// Play until the game ends. Root deals for `expected` players using
    /// `seed`.
    ///
    /// A message the local machine rejects is answered with ILLEGAL and
    /// skipped. A reply the agent can't produce ends the game for this
    /// client.
    pub fn play(
        &mut self,
        agent: Agent,
        expected: usize,
        seed: Option<u64>,
    ) -> Result<GameSummary, ClientError> {
        let mut participant = Participant::new(self.id, expected, agent, seed);
        self.playing.store(true, Ordering::SeqCst);
        let out = participant.join()?;
        self.send(&out)?;
        while !participant.is_over() {
            let Some(envelope) = self.recv() else {
                warn!("#{}: server went away mid-game", self.id);
                return Err(ClientError::Disconnected);
            };
            match participant.receive(&envelope) {
                Ok(out) => self.send(&out)?,
                Err(ClientError::Protocol(error)) => {
                    warn!("#{}: rejected {envelope}: {error}", self.id);
                    self.send(&[Envelope::all(GameMessage::illegal(self.id))])?;
                }
                Err(error) => {
                    error!("#{}: {error}", self.id);
                    return Err(error);
                }
            }
        }
        self.playing.store(false, Ordering::SeqCst);
        Ok(participant.summary())
    }

    /// Leave the game, if it is still running, and ask the server to drop
    /// this connection.
    pub fn close(self) -> Result<(), ClientError> {
        self.exit_handle().leave()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn read_loop(mut reader: FrameReader<TcpStream>, tx: &Sender<Envelope>) {
    loop {
        match reader.read_frame() {
            Ok(Some(frame)) => {
                for decoded in decode_frame_bytes(&frame) {
                    match decoded {
                        Ok(envelope) => {
                            if tx.send(envelope).is_err() {
                                return;
                            }
                        }
                        Err(error) => warn!("Dropping malformed envelope: {error}"),
                    }
                }
            }
            Ok(None) => {
                debug!("Server closed the connection");
                return;
            }
            Err(error) => {
                debug!("Read failed: {error}");
                return;
            }
        }
    }
}
