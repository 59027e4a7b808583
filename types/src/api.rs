//! Request and response bodies of the match API.

use crate::address::serde_optional_address;
use crate::matches::serde_nullable_game_state;
use crate::{Address, Board, GameState, MatchId};
use serde::{Deserialize, Serialize};

/// `POST /api/matches/join`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub match_id: MatchId,
    pub player2: Address,
}

/// Body returned by a join registration. The server does not commit to a
/// schema beyond "non-null means accepted"; an explicit `success: false`
/// is honored as a refusal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinConfirmation {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub match_id: Option<MatchId>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JoinConfirmation {
    pub fn is_confirmed(&self) -> bool {
        self.success != Some(false)
    }
}

/// `POST /api/game/move`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub match_id: MatchId,
    pub player: Address,
    pub position: u8,
    pub board: Board,
}

/// Authoritative answer to a move submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
    pub success: bool,
    #[serde(default)]
    pub board: Option<Board>,
    #[serde(default, deserialize_with = "serde_nullable_game_state::deserialize")]
    pub game_state: GameState,
    #[serde(default, with = "serde_optional_address")]
    pub winner: Option<Address>,
    #[serde(default, with = "serde_optional_address")]
    pub current_player: Option<Address>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Leaderboard window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Period {
    #[default]
    All,
    Week,
    Month,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::All => "all",
            Period::Week => "week",
            Period::Month => "month",
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Period::All),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub address: Address,
    #[serde(default)]
    pub total_wins: u64,
    #[serde(default)]
    pub total_losses: u64,
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub total_earnings: f64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    #[serde(default)]
    pub rank: Option<u64>,
    #[serde(default)]
    pub total_wins: u64,
    #[serde(default)]
    pub total_losses: u64,
    #[serde(default)]
    pub total_matches: u64,
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub win_streak: u64,
    #[serde(default)]
    pub total_earnings: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cell, Symbol};

    const PLAYER: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn test_move_request_wire() {
        let request = MoveRequest {
            match_id: MatchId(9),
            player: Address::parse(PLAYER).unwrap(),
            position: 4,
            board: Board::empty().with_mark(4, Symbol::X).unwrap(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["matchId"], 9);
        assert_eq!(value["player"], PLAYER);
        assert_eq!(value["position"], 4);
        assert_eq!(value["board"][4], "X");
    }

    #[test]
    fn test_move_response_minimal() {
        let response: MoveResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!response.success);
        assert!(response.board.is_none());
        assert_eq!(response.game_state, GameState::InProgress);
        assert!(response.winner.is_none());
    }

    #[test]
    fn test_move_response_null_state() {
        let raw = r#"{"success":true,"board":["","","","","X","","","",""],"gameState":null,"winner":null,"currentPlayer":null}"#;
        let response: MoveResponse = serde_json::from_str(raw).unwrap();
        assert!(response.success);
        assert_eq!(response.game_state, GameState::InProgress);
        assert_eq!(response.board.unwrap().get(4), Some(Cell::X));
    }

    #[test]
    fn test_move_response_terminal() {
        let raw = format!(
            r#"{{"success":true,"board":["X","X","X","O","O","","","",""],"gameState":"finished","winner":"{PLAYER}","currentPlayer":null}}"#
        );
        let response: MoveResponse = serde_json::from_str(&raw).unwrap();
        assert!(response.game_state.is_terminal());
        assert_eq!(response.winner, Some(Address::parse(PLAYER).unwrap()));
        assert!(response.current_player.is_none());
    }

    #[test]
    fn test_join_confirmation() {
        let confirmation: JoinConfirmation = serde_json::from_str("{}").unwrap();
        assert!(confirmation.is_confirmed());
        let confirmation: JoinConfirmation =
            serde_json::from_str(r#"{"success": false, "message": "full"}"#).unwrap();
        assert!(!confirmation.is_confirmed());
    }

    #[test]
    fn test_stats_defaults() {
        let stats: PlayerStats = serde_json::from_str(r#"{"totalWins": 3}"#).unwrap();
        assert_eq!(stats.total_wins, 3);
        assert!(stats.rank.is_none());
        assert_eq!("WEEK".parse::<Period>().unwrap(), Period::Week);
    }
}
