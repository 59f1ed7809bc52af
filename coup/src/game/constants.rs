use super::entities::Coins;

/// Fewest participants a game can start with.
pub const MIN_PLAYERS: usize = 2;

/// Most participants a single court can deal for. Six players hold twelve
/// cards, which leaves three in the court for exchanges.
pub const MAX_PLAYERS: usize = 6;

/// Copies of each character in the court.
pub const COPIES_PER_CARD: usize = 3;

/// Influence dealt to each participant.
pub const MAX_INFLUENCE: u8 = 2;

pub const STARTING_COINS: Coins = 2;

pub const COUP_COST: Coins = 7;

pub const ASSASSINATE_COST: Coins = 3;

/// Holding this many coins forces a coup.
pub const FORCED_COUP_COINS: Coins = 10;

/// Most coins a steal can take.
pub const STEAL_AMOUNT: Coins = 2;

/// Cards drawn from the court for an exchange.
pub const EXCHANGE_DRAW: u8 = 2;
