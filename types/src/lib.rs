//! Shared domain and wire types for the trix staked tic-tac-toe client.

pub mod account;
pub mod address;
pub mod amount;
pub mod api;
pub mod board;
pub mod events;
pub mod matches;

pub use account::{Account, Balances};
pub use address::Address;
pub use amount::{TokenAmount, TOKEN_DECIMALS};
pub use board::{Board, Cell, Symbol, BOARD_CELLS};
pub use matches::{GameResult, GameState, Match, MatchId, MatchStatus, OpenMatch};

use thiserror::Error;

/// Error type for parsing domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount overflow")]
    AmountOverflow,
    #[error("invalid match id: {0}")]
    InvalidMatchId(String),
}
