//! Thread-per-connection TCP relay.
//!
//! The accept loop runs on its own thread with a nonblocking listener so it
//! can notice the stop flag. Every accepted connection is registered, greeted
//! with its id and handed to a reader thread that blocks on reads and routes
//! each frame. Reader threads never hold the registry lock while reading.

use log::{error, info, warn};
use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use super::{
    messages::{Envelope, GameMessage},
    registry::{Connection, ConnectionRegistry},
    router::Router,
    utils::FrameReader,
};

pub const DEFAULT_BIND: &str = "localhost:12345";

pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: String,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Handle returned by [`start`] to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    registry: Arc<ConnectionRegistry>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Signal the server to stop, close every connection and wait for the
    /// accept loop to exit.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    /// Block until the accept loop exits.
    pub fn wait(mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    /// A flag that stops the server when cleared.
    #[must_use]
    pub fn keep_running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.keep_running)
    }
}

/// Bind and start the server on a background thread. Returns a handle and
/// the bound address, which is useful when binding port 0.
pub fn start(config: &ServerConfig) -> io::Result<(ServerHandle, SocketAddr)> {
    let listener = TcpListener::bind(&config.bind)?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let registry = Arc::new(ConnectionRegistry::new(config.max_connections));

    let thread = {
        let keep_running = Arc::clone(&keep_running);
        let router = Router::new(Arc::clone(&registry));
        thread::Builder::new()
            .name("accept".to_string())
            .spawn(move || accept_loop(&listener, &router, &keep_running))?
    };
    info!("Listening on {addr}");

    Ok((
        ServerHandle {
            keep_running,
            registry,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Start the server and block until it is stopped.
pub fn run(config: &ServerConfig) -> io::Result<()> {
    let (handle, _) = start(config)?;
    handle.wait();
    Ok(())
}

fn accept_loop(listener: &TcpListener, router: &Router, keep_running: &AtomicBool) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(error) = accept(stream, router) {
                    warn!("Rejected connection from {peer}: {error}");
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!("Accept failed: {e}");
                break;
            }
        }
    }
    info!("Shutting down");
    router.registry().close_all();
}

fn accept(stream: TcpStream, router: &Router) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let reader = stream.try_clone()?;
    let connection = router
        .registry()
        .register_with(stream, |id| {
            Some(Envelope::single(id, GameMessage::hello(id)).to_string())
        })
        .map_err(|error| io::Error::other(error.to_string()))?;
    if !connection.is_alive() {
        return Err(io::ErrorKind::BrokenPipe.into());
    }
    info!("New client connected with ID {}", connection.id());

    let id = connection.id();
    let worker = router.clone();
    let spawned = thread::Builder::new()
        .name(format!("conn-{id}"))
        .spawn(move || read_loop(reader, &connection, &worker));
    if let Err(error) = spawned {
        router.teardown(id);
        return Err(error);
    }
    Ok(())
}

fn read_loop(stream: TcpStream, connection: &Connection, router: &Router) {
    let id = connection.id();
    let mut reader = FrameReader::new(stream);
    loop {
        match reader.read_frame() {
            Ok(Some(frame)) => {
                if router.route(id, &frame).close {
                    break;
                }
            }
            Ok(None) => {
                info!("Client {id} closed the connection");
                break;
            }
            Err(error) => {
                if connection.is_alive() {
                    warn!("Read from ID {id} failed: {error}");
                }
                break;
            }
        }
    }
    router.teardown(id);
}
