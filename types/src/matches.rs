//! Match records and outcomes.

use crate::{Address, Error, Symbol, TokenAmount};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier assigned by the match contract when a match is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MatchId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(MatchId)
            .map_err(|_| Error::InvalidMatchId(s.to_string()))
    }
}

// Serialized as a number; the API has been seen to send both forms.
impl Serialize for MatchId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

struct MatchIdVisitor;

impl<'de> Visitor<'de> for MatchIdVisitor {
    type Value = MatchId;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a match id as a number or numeric string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(MatchId(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u64::try_from(value)
            .map(MatchId)
            .map_err(|_| E::custom("negative match id"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for MatchId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(MatchIdVisitor)
    }
}

/// A joinable match as listed by discovery. `player1` is the creator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenMatch {
    pub match_id: MatchId,
    pub player1: Address,
    pub stake_amount: TokenAmount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Active,
    Finished,
}

/// A match the local account takes part in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub match_id: MatchId,
    pub player1: Address,
    pub player2: Option<Address>,
    pub stake_amount: TokenAmount,
    pub status: MatchStatus,
}

impl Match {
    /// The symbol `account` plays in this match, if it is a participant.
    pub fn symbol_of(&self, account: &Address) -> Option<Symbol> {
        if &self.player1 == account {
            Some(Symbol::X)
        } else if self.player2.as_ref() == Some(account) {
            Some(Symbol::O)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, account: &Address) -> Option<&Address> {
        match self.symbol_of(account)? {
            Symbol::X => self.player2.as_ref(),
            Symbol::O => Some(&self.player1),
        }
    }
}

/// Game state as reported by the match API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Finished,
    Tie,
    #[default]
    #[serde(rename = "active")]
    #[serde(other)]
    InProgress,
}

impl GameState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GameState::Finished | GameState::Tie)
    }
}

/// Treats an explicit `null` game state like a missing one.
pub mod serde_nullable_game_state {
    use super::GameState;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<GameState, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<GameState>::deserialize(deserializer)?.unwrap_or_default())
    }
}

/// Terminal outcome from the local player's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Lose,
    Tie,
}

impl GameResult {
    /// Resolve a terminal signal: the local account winning beats any other
    /// winner, and no winner at all is a tie.
    pub fn resolve(winner: Option<&Address>, local: &Address) -> Self {
        match winner {
            Some(winner) if winner == local => GameResult::Win,
            Some(_) => GameResult::Lose,
            None => GameResult::Tie,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Win => f.write_str("win"),
            GameResult::Lose => f.write_str("lose"),
            GameResult::Tie => f.write_str("tie"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::parse(&format!("0x{}", format!("{byte:02x}").repeat(20))).unwrap()
    }

    #[test]
    fn test_match_id_accepts_number_and_string() {
        assert_eq!(serde_json::from_str::<MatchId>("7").unwrap(), MatchId(7));
        assert_eq!(serde_json::from_str::<MatchId>("\"7\"").unwrap(), MatchId(7));
        assert!(serde_json::from_str::<MatchId>("\"x7\"").is_err());
        assert!(serde_json::from_str::<MatchId>("-7").is_err());
    }

    #[test]
    fn test_open_match_wire() {
        let raw = format!(
            r#"{{"matchId":"3","player1":"{}","stakeAmount":"5000000000000000000","status":"waiting"}}"#,
            addr(0xAA).as_str().to_uppercase().replacen("0X", "0x", 1)
        );
        let open: OpenMatch = serde_json::from_str(&raw).unwrap();
        assert_eq!(open.match_id, MatchId(3));
        assert_eq!(open.player1, addr(0xaa));
        assert_eq!(open.stake_amount, TokenAmount::from_whole(5));
    }

    #[test]
    fn test_game_state_unknown_is_in_progress() {
        assert_eq!(serde_json::from_str::<GameState>("\"finished\"").unwrap(), GameState::Finished);
        assert_eq!(serde_json::from_str::<GameState>("\"tie\"").unwrap(), GameState::Tie);
        assert_eq!(
            serde_json::from_str::<GameState>("\"playing\"").unwrap(),
            GameState::InProgress
        );
        assert!(!GameState::InProgress.is_terminal());
        assert!(GameState::Tie.is_terminal());
    }

    #[test]
    fn test_result_precedence() {
        let local = addr(1);
        let other = addr(2);
        assert_eq!(GameResult::resolve(Some(&local), &local), GameResult::Win);
        assert_eq!(GameResult::resolve(Some(&other), &local), GameResult::Lose);
        assert_eq!(GameResult::resolve(None, &local), GameResult::Tie);
    }

    #[test]
    fn test_symbols() {
        let creator = addr(1);
        let joiner = addr(2);
        let record = Match {
            match_id: MatchId(1),
            player1: creator.clone(),
            player2: Some(joiner.clone()),
            stake_amount: TokenAmount::from_whole(5),
            status: MatchStatus::Active,
        };
        assert_eq!(record.symbol_of(&creator), Some(Symbol::X));
        assert_eq!(record.symbol_of(&joiner), Some(Symbol::O));
        assert_eq!(record.symbol_of(&addr(3)), None);
        assert_eq!(record.opponent_of(&creator), Some(&joiner));
        assert_eq!(record.opponent_of(&joiner), Some(&creator));
    }
}
