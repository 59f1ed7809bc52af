//! Integration tests for the TCP relay.
//!
//! Each test starts its own server on an ephemeral port and talks to it
//! with raw sockets or full clients.

use std::{
    io::{BufRead, BufReader, Write},
    net::{SocketAddr, TcpStream},
    thread,
    time::{Duration, Instant},
};

use coup::{
    Agent, Client,
    server::{self, ServerConfig, ServerHandle},
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn start_server(max_connections: usize) -> (ServerHandle, SocketAddr) {
    let config = ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        max_connections,
    };
    server::start(&config).unwrap()
}

struct RawClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl RawClient {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        Self {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        }
    }

    fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{line}\n").as_bytes()).unwrap();
        self.writer.flush().unwrap();
    }

    fn recv(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    /// True if nothing arrives within a short wait.
    fn is_quiet(&mut self) -> bool {
        self.writer
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut line = String::new();
        let quiet = match self.reader.read_line(&mut line) {
            Ok(0) => true,
            Ok(_) => false,
            Err(_) => true,
        };
        self.writer.set_read_timeout(Some(TIMEOUT)).unwrap();
        quiet
    }
}

fn wait_for_connections(handle: &ServerHandle, count: usize) {
    let deadline = Instant::now() + TIMEOUT;
    while handle.connection_count() != count {
        assert!(Instant::now() < deadline, "expected {count} connections");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_welcome_assigns_sequential_ids() {
    let (handle, addr) = start_server(8);
    let mut clients: Vec<_> = (0..3).map(|_| RawClient::connect(addr)).collect();
    for (id, client) in clients.iter_mut().enumerate() {
        assert_eq!(client.recv(), format!("SINGLE,{id},HELLO,{id}"));
    }
    wait_for_connections(&handle, 3);
    handle.stop();
}

#[test]
fn test_all_is_relayed_with_sender_as_origin() {
    let (handle, addr) = start_server(8);
    let mut clients: Vec<_> = (0..4).map(|_| RawClient::connect(addr)).collect();
    for client in &mut clients {
        client.recv();
    }
    wait_for_connections(&handle, 4);

    clients[1].send("ALL,*,ACT,1,,INCOME");
    assert_eq!(clients[0].recv(), "SINGLE,1,ACT,1,,INCOME");
    assert_eq!(clients[2].recv(), "SINGLE,1,ACT,1,,INCOME");
    assert_eq!(clients[3].recv(), "SINGLE,1,ACT,1,,INCOME");
    assert!(clients[1].is_quiet());
    handle.stop();
}

#[test]
fn test_single_and_except_addressing() {
    let (handle, addr) = start_server(8);
    let mut clients: Vec<_> = (0..4).map(|_| RawClient::connect(addr)).collect();
    for client in &mut clients {
        client.recv();
    }
    wait_for_connections(&handle, 4);

    clients[0].send("SINGLE,2,DECK,2,,DUKE");
    assert_eq!(clients[2].recv(), "SINGLE,0,DECK,2,,DUKE");

    clients[0].send("EXCEPT,2,DECK,2");
    assert_eq!(clients[1].recv(), "SINGLE,0,DECK,2");
    assert_eq!(clients[3].recv(), "SINGLE,0,DECK,2");
    assert!(clients[2].is_quiet());

    // Self-addressed and malformed envelopes go nowhere
    clients[3].send("SINGLE,3,OK,3");
    clients[3].send("NOPE,1,OK,3");
    clients[3].send("ALL,*,OK,3");
    assert_eq!(clients[0].recv(), "SINGLE,3,OK,3");
    assert_eq!(clients[1].recv(), "SINGLE,3,OK,3");
    handle.stop();
}

#[test]
fn test_root_is_told_about_disconnects() {
    let (handle, addr) = start_server(8);
    let mut clients: Vec<_> = (0..3).map(|_| RawClient::connect(addr)).collect();
    for client in &mut clients {
        client.recv();
    }
    wait_for_connections(&handle, 3);

    let leaving = clients.pop().unwrap();
    drop(leaving);
    assert_eq!(clients[0].recv(), "DISCONNECT,2");
    wait_for_connections(&handle, 2);

    clients[1].send("DISCONNECT,*");
    assert_eq!(clients[0].recv(), "DISCONNECT,1");
    wait_for_connections(&handle, 1);
    handle.stop();
}

#[test]
fn test_leaving_client_announces_exit_before_disconnect() {
    let (handle, addr) = start_server(8);
    let mut root = RawClient::connect(addr);
    let mut other = RawClient::connect(addr);
    root.recv();
    other.recv();
    let client = Client::connect(&addr).unwrap();
    assert_eq!(client.id(), 2);
    wait_for_connections(&handle, 3);

    let exit = client.exit_handle();
    let mut client = client;
    let playing = thread::spawn(move || client.play(Agent::random(Some(1)), 3, None));
    assert_eq!(root.recv(), "SINGLE,2,HELLO,2");

    exit.leave().unwrap();
    assert_eq!(root.recv(), "SINGLE,2,EXIT,2");
    assert_eq!(root.recv(), "DISCONNECT,2");
    assert_eq!(other.recv(), "SINGLE,2,EXIT,2");
    assert!(other.is_quiet());
    wait_for_connections(&handle, 2);

    // The server closed the socket, so the game loop ends
    assert!(playing.join().unwrap().is_err());
    handle.stop();
}

#[test]
fn test_close_after_connecting_only_disconnects() {
    let (handle, addr) = start_server(8);
    let mut root = RawClient::connect(addr);
    root.recv();
    let client = Client::connect(&addr).unwrap();
    wait_for_connections(&handle, 2);
    client.close().unwrap();
    assert_eq!(root.recv(), "DISCONNECT,1");
    wait_for_connections(&handle, 1);
    handle.stop();
}

#[test]
fn test_connection_limit() {
    let (handle, addr) = start_server(2);
    let mut first = RawClient::connect(addr);
    let mut second = RawClient::connect(addr);
    assert_eq!(first.recv(), "SINGLE,0,HELLO,0");
    assert_eq!(second.recv(), "SINGLE,1,HELLO,1");
    let mut third = RawClient::connect(addr);
    assert!(third.is_quiet());
    wait_for_connections(&handle, 2);
    handle.stop();
}

#[test]
fn test_stop_closes_connections() {
    let (handle, addr) = start_server(8);
    let mut client = RawClient::connect(addr);
    client.recv();
    wait_for_connections(&handle, 1);
    handle.stop();
    let mut line = String::new();
    assert_eq!(client.reader.read_line(&mut line).unwrap_or(0), 0);
}

#[test]
fn test_networked_game_agrees_on_winner() {
    let (handle, addr) = start_server(8);
    let players = 3;
    let mut clients = Vec::new();
    for _ in 0..players {
        clients.push(Client::connect(&addr).unwrap());
    }
    let ids: Vec<_> = clients.iter().map(Client::id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    let threads: Vec<_> = clients
        .into_iter()
        .map(|mut client| {
            thread::spawn(move || {
                let seed = u64::from(client.id()) + 100;
                client.play(Agent::priority(Some(seed)), players, Some(17))
            })
        })
        .collect();
    let summaries: Vec<_> = threads
        .into_iter()
        .map(|thread| thread.join().unwrap().unwrap())
        .collect();
    let winner = summaries[0].winner;
    assert!(winner.is_some());
    assert!(summaries.iter().all(|summary| summary.winner == winner));
    assert!(summaries.iter().all(|summary| summary.rounds == summaries[0].rounds));
    handle.stop();
}
