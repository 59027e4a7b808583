//! Connected account and its token balances.

use crate::{Address, TokenAmount};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Stable unit used to buy game tokens 1:1.
    pub stable: TokenAmount,
    /// Game token staked in matches.
    pub game: TokenAmount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balances: Balances,
}
