//! Live connections shared between the accept loop and reader threads.

use log::{debug, warn};
use std::{
    collections::BTreeMap,
    io::{self, Write},
    net::{Shutdown, TcpStream},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
    },
};

use super::{errors::RegistryError, utils::write_frame};
use crate::game::entities::PlayerId;

/// Connections are identified by the participant id they are assigned.
pub type ConnectionId = PlayerId;

/// The write half of a connection.
pub trait Transport: Send {
    /// Write one frame. A failure means the connection is broken.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Release the transport. Must unblock a reader waiting on the other half.
    fn close(&mut self);
}

impl Transport for TcpStream {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame)?;
        self.flush()
    }

    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// In-process transport used by the local table and tests.
impl Transport for Sender<Vec<u8>> {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        Sender::send(self, frame.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped"))
    }

    fn close(&mut self) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One registered connection. Sends are serialized by the transport lock so
/// concurrent fan-outs never interleave partial frames.
pub struct Connection {
    id: ConnectionId,
    transport: Mutex<Box<dyn Transport>>,
    alive: AtomicBool,
}

impl Connection {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send one newline-terminated frame.
    pub fn send(&self, frame: &str) -> io::Result<()> {
        if !self.is_alive() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("connection {} is closed", self.id),
            ));
        }
        let mut buf = Vec::with_capacity(frame.len() + 1);
        write_frame(&mut buf, frame)?;
        lock(&self.transport).send(&buf)
    }

    fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            lock(&self.transport).close();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: ConnectionId,
    /// Ids handed out whose greeting is still being written.
    greeting: usize,
    connections: BTreeMap<ConnectionId, Arc<Connection>>,
}

/// Thread-safe set of live connections.
///
/// Ids come from a monotonic counter starting at 0 and are never reused, so
/// the first connection is always the root participant.
#[derive(Debug)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
    max_connections: usize,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_connections,
        }
    }

    /// Register a transport and return its connection.
    pub fn register(
        &self,
        transport: impl Transport + 'static,
    ) -> Result<Arc<Connection>, RegistryError> {
        self.register_with(transport, |_| None)
    }

    /// Register a transport, sending the frame produced by `greeting` before
    /// the connection becomes visible to other threads. The greeting is
    /// therefore always the first frame the peer receives.
    ///
    /// The greeting is written outside the registry lock. A reserved id
    /// counts against the connection limit.
    pub fn register_with(
        &self,
        transport: impl Transport + 'static,
        greeting: impl FnOnce(ConnectionId) -> Option<String>,
    ) -> Result<Arc<Connection>, RegistryError> {
        let id = {
            let mut inner = lock(&self.inner);
            if inner.connections.len() + inner.greeting >= self.max_connections {
                return Err(RegistryError::Full(self.max_connections));
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.greeting += 1;
            id
        };
        let connection = Arc::new(Connection {
            id,
            transport: Mutex::new(Box::new(transport)),
            alive: AtomicBool::new(true),
        });
        let greeted = greeting(id).map_or(Ok(()), |frame| connection.send(&frame));

        let mut inner = lock(&self.inner);
        inner.greeting -= 1;
        if let Err(error) = greeted {
            drop(inner);
            warn!("Failed to greet connection {id}: {error}");
            connection.close();
            return Ok(connection);
        }
        inner.connections.insert(id, Arc::clone(&connection));
        debug!("Registered connection {id}");
        Ok(connection)
    }

    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        lock(&self.inner).connections.get(&id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        lock(&self.inner).connections.contains_key(&id)
    }

    /// Remove and close a connection. Only the first call for an id returns
    /// the connection; later calls return `None`.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = lock(&self.inner).connections.remove(&id);
        if let Some(connection) = &removed {
            connection.close();
            debug!("Removed connection {id}");
        }
        removed
    }

    /// Point-in-time copy of every live connection, in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        lock(&self.inner).connections.values().cloned().collect()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        lock(&self.inner).connections.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every connection, unblocking their reader threads.
    pub fn close_all(&self) {
        let drained = std::mem::take(&mut lock(&self.inner).connections);
        for connection in drained.values() {
            connection.close();
        }
    }
}
