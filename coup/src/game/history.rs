//! Observable game history, as one participant saw it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use super::entities::{Card, PlayerId};
use crate::net::messages::{Command, GameMessage};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Entry {
    pub at: DateTime<Utc>,
    /// Who sent the message.
    pub origin: PlayerId,
    /// The message with private cards stripped.
    pub message: GameMessage,
}

/// Every message applied, in order, with private cards stripped.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct History {
    entries: Vec<Entry>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, origin: PlayerId, message: &GameMessage) {
        self.entries.push(Entry {
            at: Utc::now(),
            origin,
            message: message.public(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cards `player` has claimed through actions and blocks, oldest first.
    #[must_use]
    pub fn claims_by(&self, player: PlayerId) -> Vec<Card> {
        self.entries
            .iter()
            .map(|entry| &entry.message)
            .filter(|msg| msg.actor == player)
            .filter_map(|msg| match msg.command {
                Command::Act => msg.action().and_then(|action| action.claim()),
                Command::Block => msg.card(),
                _ => None,
            })
            .collect()
    }

    /// Write one JSON object per entry.
    pub fn write_json_lines<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for entry in &self.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Action;

    #[test]
    fn test_record_strips_private_cards() {
        let mut history = History::new();
        history.record(0, &GameMessage::deck(1, Some(Card::Duke)));
        assert_eq!(history.entries()[0].message, GameMessage::deck(1, None));
    }

    #[test]
    fn test_claims_by_player() {
        let mut history = History::new();
        history.record(1, &GameMessage::act(1, Action::Tax, None));
        history.record(1, &GameMessage::act(1, Action::Income, None));
        history.record(2, &GameMessage::block(2, 1, Card::Contessa));
        history.record(1, &GameMessage::block(1, 2, Card::Captain));
        assert_eq!(history.claims_by(1), vec![Card::Duke, Card::Captain]);
        assert_eq!(history.claims_by(2), vec![Card::Contessa]);
    }

    #[test]
    fn test_json_lines() {
        let mut history = History::new();
        history.record(0, &GameMessage::ok(0));
        history.record(1, &GameMessage::lose(1, Card::Assassin));
        let mut out = Vec::new();
        history.write_json_lines(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let entry: Entry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(entry.origin, 1);
        assert_eq!(entry.message, GameMessage::lose(1, Card::Assassin));
    }
}
