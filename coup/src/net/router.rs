//! Addressing semantics for inbound envelopes.
//!
//! Every envelope a client sends is re-wrapped with the sender's id as its
//! address before it is delivered, so recipients can attribute it:
//!
//! | Inbound          | Delivered to                                 |
//! |------------------|----------------------------------------------|
//! | `SINGLE,t,msg`   | `t` only, as `SINGLE,<sender>,msg`           |
//! | `EXCEPT,x,msg`   | everyone but the sender and `x`              |
//! | `ALL,*,msg`      | everyone but the sender                      |
//! | `DISCONNECT,*`   | nobody; the sender's connection is torn down |

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};

use super::{
    messages::{Envelope, Mode, decode_frame_bytes},
    registry::{Connection, ConnectionId, ConnectionRegistry},
};
use crate::game::entities::ROOT;

/// Outcome of routing one inbound frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Routed {
    /// Successful sends.
    pub delivered: usize,
    /// Envelopes that failed to parse or had no valid recipient.
    pub dropped: usize,
    /// The sender asked to close its connection.
    pub close: bool,
}

/// Dispatches inbound frames. Clones share the registry and the dispatch
/// lock.
#[derive(Clone, Debug)]
pub struct Router {
    registry: Arc<ConnectionRegistry>,
    /// Held for a whole frame, so a reply can never overtake the message it
    /// answers at a third recipient.
    dispatch: Arc<Mutex<()>>,
}

impl Router {
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            dispatch: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Decode a raw frame from `sender` and dispatch every envelope in it.
    ///
    /// A line that fails to parse, or isn't UTF-8, is logged and dropped;
    /// the other lines of the frame are still dispatched.
    pub fn route(&self, sender: ConnectionId, frame: &[u8]) -> Routed {
        let mut routed = Routed::default();
        let _guard = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        for decoded in decode_frame_bytes(frame) {
            match decoded {
                Ok(envelope) => self.dispatch(sender, &envelope, &mut routed),
                Err(error) => {
                    warn!("Dropping malformed envelope from ID {sender}: {error}");
                    routed.dropped += 1;
                }
            }
        }
        routed
    }

    fn dispatch(&self, sender: ConnectionId, envelope: &Envelope, routed: &mut Routed) {
        if envelope.mode == Mode::Disconnect {
            info!("ID {sender} asked to disconnect");
            routed.close = true;
            return;
        }
        let Some(payload) = envelope.payload else {
            warn!("Empty message from ID {sender}");
            routed.dropped += 1;
            return;
        };
        info!("Received message from ID {sender}: {envelope}");
        let outgoing = Envelope::single(sender, payload).to_string();
        match envelope.mode {
            Mode::Single => {
                let Some(target) = envelope.address else {
                    warn!("SINGLE message from ID {sender} has no target");
                    routed.dropped += 1;
                    return;
                };
                if target == sender {
                    warn!("Client {sender} addressed itself");
                    routed.dropped += 1;
                    return;
                }
                let Some(connection) = self.registry.get(target) else {
                    warn!("Client with ID {target} not found");
                    routed.dropped += 1;
                    return;
                };
                if self.deliver(&connection, &outgoing) {
                    routed.delivered += 1;
                }
            }
            Mode::Except => {
                let Some(excluded) = envelope.address else {
                    warn!("EXCEPT message from ID {sender} has no excluded address");
                    routed.dropped += 1;
                    return;
                };
                debug!("Broadcasting from ID {sender} except {excluded}");
                routed.delivered += self.fan_out(&outgoing, |id| id != sender && id != excluded);
            }
            Mode::All => {
                debug!("Broadcasting from ID {sender}");
                routed.delivered += self.fan_out(&outgoing, |id| id != sender);
            }
            Mode::Disconnect => {}
        }
    }

    /// Deliver to every connection in a snapshot that passes `include`.
    /// A failed recipient is torn down and delivery continues.
    fn fan_out(&self, frame: &str, include: impl Fn(ConnectionId) -> bool) -> usize {
        self.registry
            .snapshot()
            .iter()
            .filter(|connection| include(connection.id()))
            .filter(|connection| self.deliver(connection, frame))
            .count()
    }

    fn deliver(&self, connection: &Connection, frame: &str) -> bool {
        match connection.send(frame) {
            Ok(()) => true,
            Err(error) => {
                warn!("Failed to send to ID {}: {error}", connection.id());
                self.teardown(connection.id());
                false
            }
        }
    }

    /// Remove a connection and tell root about it. Returns false if the
    /// connection was already gone, in which case nothing is sent.
    pub fn teardown(&self, id: ConnectionId) -> bool {
        if self.registry.remove(id).is_none() {
            return false;
        }
        info!("Client {id} disconnected");
        if id != ROOT {
            if let Some(root) = self.registry.get(ROOT) {
                let notice = Envelope::disconnect(Some(id)).to_string();
                if let Err(error) = root.send(&notice) {
                    warn!("Failed to notify root of ID {id} leaving: {error}");
                    self.teardown(ROOT);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::registry::Transport;
    use std::{
        io,
        sync::mpsc::{self, Receiver},
    };

    /// Transport that always fails, as a broken socket would.
    struct Broken;

    impl Transport for Broken {
        fn send(&mut self, _frame: &[u8]) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn close(&mut self) {}
    }

    fn setup(n: usize) -> (Router, Vec<Receiver<Vec<u8>>>) {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let receivers = (0..n)
            .map(|_| {
                let (tx, rx) = mpsc::channel();
                registry.register(tx).unwrap();
                rx
            })
            .collect();
        (Router::new(registry), receivers)
    }

    fn drain(rx: &Receiver<Vec<u8>>) -> Vec<String> {
        rx.try_iter()
            .map(|frame| String::from_utf8(frame).unwrap())
            .collect()
    }

    #[test]
    fn test_single_is_rewrapped_with_origin() {
        let (router, rxs) = setup(3);
        let routed = router.route(1, b"SINGLE,2,CHAL,1,0\n");
        assert_eq!(routed.delivered, 1);
        assert_eq!(drain(&rxs[2]), vec!["SINGLE,1,CHAL,1,0\n"]);
        assert!(drain(&rxs[0]).is_empty());
        assert!(drain(&rxs[1]).is_empty());
    }

    #[test]
    fn test_single_to_self_is_dropped() {
        let (router, rxs) = setup(3);
        let routed = router.route(1, b"SINGLE,1,OK,1\n");
        assert_eq!(routed.delivered, 0);
        assert_eq!(routed.dropped, 1);
        assert!(rxs.iter().all(|rx| drain(rx).is_empty()));
    }

    #[test]
    fn test_single_without_target_or_unknown_target() {
        let (router, _rxs) = setup(2);
        assert_eq!(router.route(0, b"SINGLE,*,OK,0\n").dropped, 1);
        assert_eq!(router.route(0, b"SINGLE,9,OK,0\n").dropped, 1);
    }

    #[test]
    fn test_all_reaches_everyone_but_sender() {
        // Connections 1 to 4; 0 is root.
        let (router, rxs) = setup(5);
        let routed = router.route(1, b"ALL,*,ACT,1,,INCOME\n");
        assert_eq!(routed.delivered, 4);
        assert!(drain(&rxs[1]).is_empty());
        for rx in [&rxs[0], &rxs[2], &rxs[3], &rxs[4]] {
            assert_eq!(drain(rx), vec!["SINGLE,1,ACT,1,,INCOME\n"]);
        }
    }

    #[test]
    fn test_except_skips_excluded_and_sender() {
        let (router, rxs) = setup(5);
        router.registry().remove(0);
        let routed = router.route(1, b"EXCEPT,3,DECK,3\n");
        assert_eq!(routed.delivered, 2);
        assert_eq!(drain(&rxs[2]), vec!["SINGLE,1,DECK,3\n"]);
        assert_eq!(drain(&rxs[4]), vec!["SINGLE,1,DECK,3\n"]);
        assert!(drain(&rxs[1]).is_empty());
        assert!(drain(&rxs[3]).is_empty());
    }

    #[test]
    fn test_except_without_address_is_dropped() {
        let (router, rxs) = setup(3);
        assert_eq!(router.route(1, b"EXCEPT,*,OK,1\n").dropped, 1);
        assert!(rxs.iter().all(|rx| drain(rx).is_empty()));
    }

    #[test]
    fn test_empty_payload_is_dropped() {
        let (router, _rxs) = setup(2);
        let routed = router.route(1, b"ALL,*\n");
        assert_eq!(routed, Routed { delivered: 0, dropped: 1, close: false });
    }

    #[test]
    fn test_malformed_line_does_not_drop_others() {
        let (router, rxs) = setup(3);
        let routed = router.route(1, b"ALL,*,OK,1\nALL,*,BOGUS,1\nSINGLE,2,OK,1\n");
        assert_eq!(routed.dropped, 1);
        assert_eq!(routed.delivered, 3);
        assert_eq!(drain(&rxs[2]), vec!["SINGLE,1,OK,1\n", "SINGLE,1,OK,1\n"]);
    }

    #[test]
    fn test_non_utf8_line_is_dropped() {
        let (router, rxs) = setup(2);
        let routed = router.route(1, &[0xff, 0xfe, b'\n']);
        assert_eq!(routed.dropped, 1);
        assert!(drain(&rxs[0]).is_empty());
    }

    #[test]
    fn test_non_utf8_line_does_not_drop_others() {
        let (router, rxs) = setup(3);
        let routed = router.route(1, b"ALL,*,OK,1\nALL,*,\xff\nSINGLE,2,OK,1\n");
        assert_eq!(routed.dropped, 1);
        assert_eq!(routed.delivered, 3);
        assert_eq!(drain(&rxs[0]), vec!["SINGLE,1,OK,1\n"]);
        assert_eq!(drain(&rxs[2]), vec!["SINGLE,1,OK,1\n", "SINGLE,1,OK,1\n"]);
    }

    #[test]
    fn test_disconnect_request_sets_close() {
        let (router, rxs) = setup(2);
        let routed = router.route(1, b"DISCONNECT,*\n");
        assert!(routed.close);
        assert!(drain(&rxs[0]).is_empty());
    }

    #[test]
    fn test_failed_recipient_removed_once_and_others_served() {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let mut rxs = Vec::new();
        for id in 0..5 {
            if id == 3 {
                registry.register(Broken).unwrap();
                continue;
            }
            let (tx, rx) = mpsc::channel();
            registry.register(tx).unwrap();
            rxs.push((id, rx));
        }
        let router = Router::new(Arc::clone(&registry));

        let routed = router.route(1, b"ALL,*,OK,1\n");
        assert_eq!(routed.delivered, 3);
        assert!(!registry.contains(3));
        assert_eq!(registry.ids(), vec![0, 1, 2, 4]);

        for (id, rx) in &rxs {
            let frames = drain(rx);
            match id {
                0 => assert_eq!(frames, vec!["SINGLE,1,OK,1\n", "DISCONNECT,3\n"]),
                1 => assert!(frames.is_empty()),
                _ => assert_eq!(frames, vec!["SINGLE,1,OK,1\n"]),
            }
        }
        assert!(!router.teardown(3));
    }

    #[test]
    fn test_teardown_notifies_root_once() {
        let (router, rxs) = setup(3);
        assert!(router.teardown(2));
        assert!(!router.teardown(2));
        assert_eq!(drain(&rxs[0]), vec!["DISCONNECT,2\n"]);
        assert!(drain(&rxs[1]).is_empty());
    }

    #[test]
    fn test_root_teardown_sends_no_notice() {
        let (router, rxs) = setup(2);
        assert!(router.teardown(ROOT));
        assert!(drain(&rxs[1]).is_empty());
    }
}
