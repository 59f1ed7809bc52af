//! Text codec for the two wire message kinds.
//!
//! An envelope is one line, `MODE,ADDR[,payload]`, where `ADDR` is an id or
//! `*` for no address. A payload is `COMMAND,actor[,target[,operand]]`.
//! Trailing empty fields are omitted when encoding, so `ACT,1,,INCOME`,
//! `CHAL,2,1` and `OK,3` are all canonical. A frame is a run of envelope
//! lines, each decoded on its own.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::errors::{ParseError, Result};
use crate::game::entities::{Action, Card, Coins, PlayerId};

const WILDCARD: &str = "*";

const MAX_PAYLOAD_FIELDS: usize = 4;

/// Addressing mode of an envelope.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Mode {
    /// Everyone except the sender.
    All,
    /// Exactly the addressed connection.
    Single,
    /// Everyone except the sender and the addressed connection.
    Except,
    /// Connection teardown. From a client it asks the server to close the
    /// connection; from the server it tells root who left.
    Disconnect,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::All, Mode::Single, Mode::Except, Mode::Disconnect];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Single => "SINGLE",
            Self::Except => "EXCEPT",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ParseError::UnknownMode(s.to_string()))
    }
}

/// Game message command tag.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Command {
    Act,
    Ok,
    Chal,
    Block,
    Show,
    Lose,
    Coins,
    Deck,
    Choose,
    Keep,
    Hello,
    Player,
    Start,
    Ready,
    Turn,
    Exit,
    Illegal,
}

impl Command {
    pub const ALL: [Command; 17] = [
        Command::Act,
        Command::Ok,
        Command::Chal,
        Command::Block,
        Command::Show,
        Command::Lose,
        Command::Coins,
        Command::Deck,
        Command::Choose,
        Command::Keep,
        Command::Hello,
        Command::Player,
        Command::Start,
        Command::Ready,
        Command::Turn,
        Command::Exit,
        Command::Illegal,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Act => "ACT",
            Self::Ok => "OK",
            Self::Chal => "CHAL",
            Self::Block => "BLOCK",
            Self::Show => "SHOW",
            Self::Lose => "LOSE",
            Self::Coins => "COINS",
            Self::Deck => "DECK",
            Self::Choose => "CHOOSE",
            Self::Keep => "KEEP",
            Self::Hello => "HELLO",
            Self::Player => "PLAYER",
            Self::Start => "START",
            Self::Ready => "READY",
            Self::Turn => "TURN",
            Self::Exit => "EXIT",
            Self::Illegal => "ILLEGAL",
        }
    }

    /// Commands whose card operand is private to one recipient.
    #[must_use]
    pub const fn carries_secret(&self) -> bool {
        matches!(self, Self::Deck | Self::Choose | Self::Keep)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| ParseError::UnknownCommand(s.to_string()))
    }
}

/// The last payload field.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Operand {
    Action(Action),
    Card(Card),
    Amount(Coins),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Action(action) => write!(f, "{action}"),
            Self::Card(card) => write!(f, "{card}"),
            Self::Amount(amount) => write!(f, "{amount}"),
        }
    }
}

impl FromStr for Operand {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(Self::Amount)
                .map_err(|_| ParseError::UnknownOperand(s.to_string()));
        }
        s.parse::<Action>()
            .map(Self::Action)
            .or_else(|_| s.parse::<Card>().map(Self::Card))
    }
}

/// A game protocol message.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct GameMessage {
    pub command: Command,
    pub actor: PlayerId,
    pub target: Option<PlayerId>,
    pub operand: Option<Operand>,
}

impl GameMessage {
    const fn new(command: Command, actor: PlayerId) -> Self {
        Self {
            command,
            actor,
            target: None,
            operand: None,
        }
    }

    const fn with_card(command: Command, actor: PlayerId, card: Option<Card>) -> Self {
        let operand = match card {
            Some(card) => Some(Operand::Card(card)),
            None => None,
        };
        Self {
            command,
            actor,
            target: None,
            operand,
        }
    }

    #[must_use]
    pub const fn act(actor: PlayerId, action: Action, target: Option<PlayerId>) -> Self {
        Self {
            command: Command::Act,
            actor,
            target,
            operand: Some(Operand::Action(action)),
        }
    }

    #[must_use]
    pub const fn ok(responder: PlayerId) -> Self {
        Self::new(Command::Ok, responder)
    }

    #[must_use]
    pub const fn chal(challenger: PlayerId, claimant: PlayerId) -> Self {
        Self {
            command: Command::Chal,
            actor: challenger,
            target: Some(claimant),
            operand: None,
        }
    }

    #[must_use]
    pub const fn block(blocker: PlayerId, actor: PlayerId, card: Card) -> Self {
        Self {
            command: Command::Block,
            actor: blocker,
            target: Some(actor),
            operand: Some(Operand::Card(card)),
        }
    }

    #[must_use]
    pub const fn show(claimant: PlayerId, card: Card) -> Self {
        Self::with_card(Command::Show, claimant, Some(card))
    }

    #[must_use]
    pub const fn lose(player: PlayerId, card: Card) -> Self {
        Self::with_card(Command::Lose, player, Some(card))
    }

    #[must_use]
    pub const fn coins(player: PlayerId, amount: Coins) -> Self {
        Self {
            command: Command::Coins,
            actor: player,
            target: None,
            operand: Some(Operand::Amount(amount)),
        }
    }

    #[must_use]
    pub const fn deck(player: PlayerId, card: Option<Card>) -> Self {
        Self::with_card(Command::Deck, player, card)
    }

    #[must_use]
    pub const fn choose(player: PlayerId, card: Option<Card>) -> Self {
        Self::with_card(Command::Choose, player, card)
    }

    #[must_use]
    pub const fn keep(player: PlayerId, card: Option<Card>) -> Self {
        Self::with_card(Command::Keep, player, card)
    }

    #[must_use]
    pub const fn hello(player: PlayerId) -> Self {
        Self::new(Command::Hello, player)
    }

    #[must_use]
    pub const fn player(player: PlayerId) -> Self {
        Self::new(Command::Player, player)
    }

    #[must_use]
    pub const fn start(dealer: PlayerId) -> Self {
        Self::new(Command::Start, dealer)
    }

    #[must_use]
    pub const fn ready(player: PlayerId) -> Self {
        Self::new(Command::Ready, player)
    }

    #[must_use]
    pub const fn turn(player: PlayerId) -> Self {
        Self::new(Command::Turn, player)
    }

    #[must_use]
    pub const fn exit(player: PlayerId) -> Self {
        Self::new(Command::Exit, player)
    }

    #[must_use]
    pub const fn illegal(player: PlayerId) -> Self {
        Self::new(Command::Illegal, player)
    }

    #[must_use]
    pub const fn action(&self) -> Option<Action> {
        match self.operand {
            Some(Operand::Action(action)) => Some(action),
            _ => None,
        }
    }

    #[must_use]
    pub const fn card(&self) -> Option<Card> {
        match self.operand {
            Some(Operand::Card(card)) => Some(card),
            _ => None,
        }
    }

    #[must_use]
    pub const fn amount(&self) -> Option<Coins> {
        match self.operand {
            Some(Operand::Amount(amount)) => Some(amount),
            _ => None,
        }
    }

    /// The message as every participant but the card holder sees it.
    #[must_use]
    pub fn public(&self) -> Self {
        if self.command.carries_secret() {
            Self::new(self.command, self.actor)
        } else {
            *self
        }
    }

    fn validate(self) -> Result<Self> {
        let malformed = |reason| ParseError::Malformed {
            command: self.command.as_str(),
            reason,
        };
        match self.command {
            Command::Act => {
                let action = self.action().ok_or(ParseError::MissingField("action"))?;
                match (action.is_targeted(), self.target) {
                    (true, None) => return Err(malformed("action requires a target")),
                    (false, Some(_)) => return Err(malformed("action takes no target")),
                    _ => {}
                }
            }
            Command::Chal => {
                self.target.ok_or(ParseError::MissingField("target"))?;
                if self.operand.is_some() {
                    return Err(malformed("unexpected operand"));
                }
            }
            Command::Block => {
                self.target.ok_or(ParseError::MissingField("target"))?;
                self.card().ok_or(ParseError::MissingField("card"))?;
            }
            Command::Show | Command::Lose => {
                self.card().ok_or(ParseError::MissingField("card"))?;
            }
            Command::Coins => {
                self.amount().ok_or(ParseError::MissingField("amount"))?;
            }
            Command::Deck | Command::Choose | Command::Keep => {
                if self.operand.is_some() && self.card().is_none() {
                    return Err(malformed("operand must be a card"));
                }
            }
            Command::Ok
            | Command::Hello
            | Command::Player
            | Command::Start
            | Command::Ready
            | Command::Turn
            | Command::Exit
            | Command::Illegal => {
                if self.operand.is_some() {
                    return Err(malformed("unexpected operand"));
                }
            }
        }
        let takes_target = matches!(self.command, Command::Act | Command::Chal | Command::Block);
        if !takes_target && self.target.is_some() {
            return Err(malformed("unexpected target"));
        }
        Ok(self)
    }
}

impl fmt::Display for GameMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{}", self.command, self.actor)?;
        match (self.target, self.operand) {
            (None, None) => Ok(()),
            (Some(target), None) => write!(f, ",{target}"),
            (None, Some(operand)) => write!(f, ",,{operand}"),
            (Some(target), Some(operand)) => write!(f, ",{target},{operand}"),
        }
    }
}

impl FromStr for GameMessage {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        if fields.len() > MAX_PAYLOAD_FIELDS {
            return Err(ParseError::TooManyFields(fields.len()));
        }
        let command = match fields[0] {
            "" => return Err(ParseError::Empty),
            tag => tag.parse::<Command>()?,
        };
        let actor = match fields.get(1).copied() {
            None | Some("") => return Err(ParseError::MissingField("actor")),
            Some(id) => parse_id(id)?,
        };
        let target = match fields.get(2).copied() {
            None | Some("") => None,
            Some(id) => Some(parse_id(id)?),
        };
        let operand = match fields.get(3).copied() {
            None | Some("") => None,
            Some(operand) => Some(operand.parse()?),
        };
        GameMessage {
            command,
            actor,
            target,
            operand,
        }
        .validate()
    }
}

fn parse_id(s: &str) -> Result<PlayerId> {
    s.parse().map_err(|_| ParseError::InvalidId(s.to_string()))
}

/// One addressed line on the wire.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Envelope {
    pub mode: Mode,
    /// Target on the way to the server, origin on the way out.
    pub address: Option<PlayerId>,
    pub payload: Option<GameMessage>,
}

impl Envelope {
    #[must_use]
    pub const fn all(payload: GameMessage) -> Self {
        Self {
            mode: Mode::All,
            address: None,
            payload: Some(payload),
        }
    }

    #[must_use]
    pub const fn single(address: PlayerId, payload: GameMessage) -> Self {
        Self {
            mode: Mode::Single,
            address: Some(address),
            payload: Some(payload),
        }
    }

    #[must_use]
    pub const fn except(address: PlayerId, payload: GameMessage) -> Self {
        Self {
            mode: Mode::Except,
            address: Some(address),
            payload: Some(payload),
        }
    }

    #[must_use]
    pub const fn disconnect(address: Option<PlayerId>) -> Self {
        Self {
            mode: Mode::Disconnect,
            address,
            payload: None,
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},", self.mode)?;
        match self.address {
            Some(address) => write!(f, "{address}")?,
            None => write!(f, "{WILDCARD}")?,
        }
        if let Some(payload) = &self.payload {
            write!(f, ",{payload}")?;
        }
        Ok(())
    }
}

impl FromStr for Envelope {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.trim().splitn(3, ',');
        let mode = match fields.next().map(str::trim) {
            None | Some("") => return Err(ParseError::Empty),
            Some(mode) => mode.parse::<Mode>()?,
        };
        let address = match fields.next().map(str::trim) {
            None => return Err(ParseError::MissingField("address")),
            Some(WILDCARD) => None,
            Some(address) => Some(
                address
                    .parse()
                    .map_err(|_| ParseError::InvalidAddress(address.to_string()))?,
            ),
        };
        let payload = match fields.next().map(str::trim) {
            None | Some("") => None,
            Some(payload) => Some(payload.parse::<GameMessage>()?),
        };
        if mode == Mode::Disconnect && payload.is_some() {
            return Err(ParseError::UnexpectedPayload);
        }
        Ok(Self {
            mode,
            address,
            payload,
        })
    }
}

/// Decode every non-empty line of a frame. Each line succeeds or fails on
/// its own.
pub fn decode_frame(frame: &str) -> impl Iterator<Item = Result<Envelope>> + '_ {
    frame
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::parse)
}

/// Decode a raw frame as read off the wire. Lines are split before UTF-8
/// validation, so a line with bad bytes fails alone.
pub fn decode_frame_bytes(frame: &[u8]) -> impl Iterator<Item = Result<Envelope>> + '_ {
    frame
        .split(|byte| *byte == b'\n')
        .map(<[u8]>::trim_ascii)
        .filter(|line| !line.is_empty())
        .map(|line| {
            std::str::from_utf8(line)
                .map_err(|_| ParseError::NotUtf8)
                .and_then(str::parse)
        })
}

/// Encode envelopes as one newline-terminated frame.
#[must_use]
pub fn encode_frame(envelopes: &[Envelope]) -> String {
    let mut frame = String::new();
    for envelope in envelopes {
        frame.push_str(&envelope.to_string());
        frame.push('\n');
    }
    frame
}
