//! Decision agents.
//!
//! An agent is only ever asked to pick from the legal messages its machine
//! computed, so whatever it returns is a valid move. [`RandomAgent`] picks
//! uniformly. [`PriorityAgent`] follows a fixed preference order and
//! challenges claims it can disprove.

use enum_dispatch::enum_dispatch;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};

use super::models::{Beliefs, DecisionContext};
use crate::game::{
    PlayerState,
    entities::{Action, Card, PlayerId},
};
use crate::net::messages::{Command, GameMessage};

/// Chance that a [`PriorityAgent`] challenges a claim it merely doubts.
const DOUBT_CHALLENGE_PROBABILITY: f64 = 0.5;

#[enum_dispatch]
pub trait DecisionAgent {
    /// Pick one of `legal`. `None` only when `legal` is empty.
    fn choose(&mut self, legal: &[GameMessage], ctx: &DecisionContext) -> Option<GameMessage>;

    /// See every message applied to the game, own ones included.
    fn observe(&mut self, _message: &GameMessage, _ctx: &DecisionContext) {}
}

#[enum_dispatch(DecisionAgent)]
#[derive(Debug)]
pub enum Agent {
    RandomAgent,
    PriorityAgent,
}

impl Agent {
    #[must_use]
    pub fn random(seed: Option<u64>) -> Self {
        RandomAgent::new(seed).into()
    }

    #[must_use]
    pub fn priority(seed: Option<u64>) -> Self {
        PriorityAgent::new(seed).into()
    }
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Picks uniformly among the legal messages.
#[derive(Debug)]
pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: rng_from(seed),
        }
    }
}

impl DecisionAgent for RandomAgent {
    fn choose(&mut self, legal: &[GameMessage], _ctx: &DecisionContext) -> Option<GameMessage> {
        legal.choose(&mut self.rng).copied()
    }
}

/// Prefers COUP, then ASSASSINATE, then an honest BLOCK, then TAX, then
/// INCOME, and falls back to a random legal message.
#[derive(Debug)]
pub struct PriorityAgent {
    rng: StdRng,
    beliefs: Beliefs,
}

impl PriorityAgent {
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: rng_from(seed),
            beliefs: Beliefs::new(),
        }
    }

    #[must_use]
    pub fn beliefs(&self) -> &Beliefs {
        &self.beliefs
    }

    fn take_turn(&mut self, legal: &[GameMessage], ctx: &DecisionContext) -> Option<GameMessage> {
        for action in [Action::Coup, Action::Assassinate] {
            let targeted: Vec<_> = legal
                .iter()
                .filter(|msg| msg.command == Command::Act && msg.action() == Some(action))
                .copied()
                .collect();
            if let Some(best) = strongest_target(&targeted, ctx) {
                return Some(best);
            }
        }
        for action in [Action::Tax, Action::Income] {
            if let Some(msg) = legal.iter().find(|msg| msg.action() == Some(action)) {
                return Some(*msg);
            }
        }
        legal.choose(&mut self.rng).copied()
    }

    fn react(&mut self, legal: &[GameMessage], ctx: &DecisionContext) -> Option<GameMessage> {
        if let Some(block) = legal.iter().find(|msg| msg.command == Command::Block) {
            return Some(*block);
        }
        let challenge = legal.iter().find(|msg| msg.command == Command::Chal);
        if let (Some(challenge), Some(card)) = (challenge, contested_card(ctx.state)) {
            if let Some(claimant) = challenge.target {
                if self.should_challenge(claimant, card, ctx) {
                    return Some(*challenge);
                }
            }
        }
        legal
            .iter()
            .find(|msg| msg.command == Command::Ok)
            .or_else(|| legal.first())
            .copied()
    }

    fn should_challenge(&mut self, claimant: PlayerId, card: Card, ctx: &DecisionContext) -> bool {
        if ctx.impossible_claim(claimant, card) {
            return true;
        }
        self.beliefs.doubts(claimant, card, ctx)
            && self.rng.random_bool(DOUBT_CHALLENGE_PROBABILITY)
    }
}

impl DecisionAgent for PriorityAgent {
    fn choose(&mut self, legal: &[GameMessage], ctx: &DecisionContext) -> Option<GameMessage> {
        if legal.is_empty() {
            return None;
        }
        match ctx.state {
            PlayerState::MyTurn => self.take_turn(legal, ctx),
            PlayerState::AwaitShow => legal
                .iter()
                .find(|msg| msg.command == Command::Show)
                .copied()
                .or_else(|| least_valuable(legal)),
            PlayerState::AwaitLose => least_valuable(legal),
            PlayerState::ExchangeChoose => legal
                .iter()
                .max_by_key(|msg| msg.card().map_or(0, value))
                .copied(),
            _ => self.react(legal, ctx),
        }
    }

    fn observe(&mut self, message: &GameMessage, ctx: &DecisionContext) {
        self.beliefs.observe(message, ctx);
    }
}

/// The card a challenge would contest in `state`.
fn contested_card(state: PlayerState) -> Option<Card> {
    match state {
        PlayerState::PendingTax | PlayerState::BlockForeignAid => Some(Card::Duke),
        PlayerState::PendingExchange | PlayerState::BlockStealAmbassador => Some(Card::Ambassador),
        PlayerState::PendingAssassinateTarget | PlayerState::PendingAssassinateBystander => {
            Some(Card::Assassin)
        }
        PlayerState::PendingStealTarget
        | PlayerState::PendingStealBystander
        | PlayerState::BlockStealCaptain => Some(Card::Captain),
        PlayerState::BlockAssassinate => Some(Card::Contessa),
        _ => None,
    }
}

/// How much a card is worth holding on to.
const fn value(card: Card) -> u8 {
    match card {
        Card::Duke => 5,
        Card::Captain => 4,
        Card::Assassin => 3,
        Card::Contessa => 2,
        Card::Ambassador => 1,
    }
}

fn least_valuable(legal: &[GameMessage]) -> Option<GameMessage> {
    legal
        .iter()
        .filter(|msg| msg.command == Command::Lose)
        .min_by_key(|msg| msg.card().map_or(u8::MAX, value))
        .copied()
}

/// The targeted message aimed at the opponent with the most influence, then
/// the most coins.
fn strongest_target(targeted: &[GameMessage], ctx: &DecisionContext) -> Option<GameMessage> {
    targeted
        .iter()
        .max_by_key(|msg| {
            msg.target
                .and_then(|target| ctx.session.view(target))
                .map_or((0, 0), |view| (view.influence, view.coins))
        })
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameSession, history::History};

    fn session() -> GameSession {
        let mut session = GameSession::new();
        for id in 0..3 {
            session.add_player(id).unwrap();
            let view = session.view_mut(id).unwrap();
            view.gain(None);
            view.gain(None);
            view.earn(2);
        }
        session.view_mut(0).unwrap().deck = vec![Card::Duke, Card::Captain];
        session
    }

    fn ctx<'a>(
        session: &'a GameSession,
        history: &'a History,
        state: PlayerState,
    ) -> DecisionContext<'a> {
        DecisionContext {
            me: 0,
            state,
            session,
            history,
        }
    }

    #[test]
    fn test_random_agent_picks_a_legal_message() {
        let session = session();
        let history = History::new();
        let ctx = ctx(&session, &history, PlayerState::MyTurn);
        let legal = [
            GameMessage::act(0, Action::Income, None),
            GameMessage::act(0, Action::ForeignAid, None),
        ];
        let mut agent = Agent::random(Some(7));
        for _ in 0..20 {
            let choice = agent.choose(&legal, &ctx).unwrap();
            assert!(legal.contains(&choice));
        }
        assert_eq!(agent.choose(&[], &ctx), None);
    }

    #[test]
    fn test_priority_prefers_coup_at_strongest_opponent() {
        let mut session = session();
        session.view_mut(2).unwrap().earn(5);
        let history = History::new();
        let ctx = ctx(&session, &history, PlayerState::MyTurn);
        let legal = [
            GameMessage::act(0, Action::Income, None),
            GameMessage::act(0, Action::Tax, None),
            GameMessage::act(0, Action::Coup, Some(1)),
            GameMessage::act(0, Action::Coup, Some(2)),
        ];
        let mut agent = Agent::priority(Some(1));
        assert_eq!(
            agent.choose(&legal, &ctx),
            Some(GameMessage::act(0, Action::Coup, Some(2)))
        );
    }

    #[test]
    fn test_priority_prefers_tax_over_income() {
        let session = session();
        let history = History::new();
        let ctx = ctx(&session, &history, PlayerState::MyTurn);
        let legal = [
            GameMessage::act(0, Action::Income, None),
            GameMessage::act(0, Action::ForeignAid, None),
            GameMessage::act(0, Action::Tax, None),
        ];
        let mut agent = Agent::priority(Some(1));
        assert_eq!(
            agent.choose(&legal, &ctx),
            Some(GameMessage::act(0, Action::Tax, None))
        );
    }

    #[test]
    fn test_priority_blocks_when_it_can() {
        let session = session();
        let history = History::new();
        let ctx = ctx(&session, &history, PlayerState::PendingStealTarget);
        let legal = [
            GameMessage::ok(0),
            GameMessage::chal(0, 1),
            GameMessage::block(0, 1, Card::Captain),
        ];
        let mut agent = Agent::priority(Some(1));
        assert_eq!(
            agent.choose(&legal, &ctx),
            Some(GameMessage::block(0, 1, Card::Captain))
        );
    }

    #[test]
    fn test_priority_challenges_impossible_claims() {
        let mut session = session();
        session.view_mut(1).unwrap().lose(Card::Duke);
        session.view_mut(2).unwrap().lose(Card::Duke);
        let history = History::new();
        let ctx = ctx(&session, &history, PlayerState::PendingTax);
        let legal = [GameMessage::ok(0), GameMessage::chal(0, 1)];
        let mut agent = Agent::priority(Some(1));
        assert_eq!(agent.choose(&legal, &ctx), Some(GameMessage::chal(0, 1)));
    }

    #[test]
    fn test_priority_accepts_plausible_claims() {
        let session = session();
        let history = History::new();
        let ctx = ctx(&session, &history, PlayerState::PendingTax);
        let legal = [GameMessage::ok(0), GameMessage::chal(0, 1)];
        let mut agent = Agent::priority(Some(1));
        assert_eq!(agent.choose(&legal, &ctx), Some(GameMessage::ok(0)));
    }

    #[test]
    fn test_priority_shows_then_gives_up_least_valuable() {
        let session = session();
        let history = History::new();
        let legal = [
            GameMessage::show(0, Card::Duke),
            GameMessage::lose(0, Card::Captain),
            GameMessage::lose(0, Card::Duke),
        ];
        let mut agent = Agent::priority(Some(1));
        let show = ctx(&session, &history, PlayerState::AwaitShow);
        assert_eq!(
            agent.choose(&legal, &show),
            Some(GameMessage::show(0, Card::Duke))
        );
        let lose = ctx(&session, &history, PlayerState::AwaitLose);
        assert_eq!(
            agent.choose(&legal[1..], &lose),
            Some(GameMessage::lose(0, Card::Captain))
        );
    }

    #[test]
    fn test_priority_keeps_most_valuable() {
        let session = session();
        let history = History::new();
        let ctx = ctx(&session, &history, PlayerState::ExchangeChoose);
        let legal = [
            GameMessage::keep(0, Some(Card::Ambassador)),
            GameMessage::keep(0, Some(Card::Duke)),
            GameMessage::keep(0, Some(Card::Contessa)),
        ];
        let mut agent = Agent::priority(Some(1));
        assert_eq!(
            agent.choose(&legal, &ctx),
            Some(GameMessage::keep(0, Some(Card::Duke)))
        );
    }
}
