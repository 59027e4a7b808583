//! Real-time channel messages.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

use crate::address::serde_optional_address;
use crate::matches::serde_nullable_game_state;
use crate::{Address, Board, GameState, MatchId, TokenAmount};
use serde::{Deserialize, Serialize};

/// Pushed by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A second player joined a match; delivered to the creator's room.
    MatchJoined(MatchJoined),
    /// Full authoritative board/turn state after a confirmed move.
    MoveUpdate(MoveUpdate),
    /// The opponent's confirmed move, relayed from their client.
    OpponentMove(OpponentMove),
    GameEnded(GameEnded),
    MatchCancelled(MatchCancelled),
}

impl ServerEvent {
    pub fn match_id(&self) -> MatchId {
        match self {
            ServerEvent::MatchJoined(event) => event.match_id,
            ServerEvent::MoveUpdate(event) => event.match_id,
            ServerEvent::OpponentMove(event) => event.match_id,
            ServerEvent::GameEnded(event) => event.match_id,
            ServerEvent::MatchCancelled(event) => event.match_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::MatchJoined(_) => "matchJoined",
            ServerEvent::MoveUpdate(_) => "moveUpdate",
            ServerEvent::OpponentMove(_) => "opponentMove",
            ServerEvent::GameEnded(_) => "gameEnded",
            ServerEvent::MatchCancelled(_) => "matchCancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchJoined {
    pub match_id: MatchId,
    pub player1: Address,
    pub player2: Address,
    #[serde(default)]
    pub stake_amount: Option<TokenAmount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveUpdate {
    pub match_id: MatchId,
    pub board: Board,
    #[serde(default, deserialize_with = "serde_nullable_game_state::deserialize")]
    pub game_state: GameState,
    #[serde(default, with = "serde_optional_address")]
    pub winner: Option<Address>,
    #[serde(default, with = "serde_optional_address")]
    pub current_player: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentMove {
    pub match_id: MatchId,
    /// The player who made the move.
    pub player: Address,
    #[serde(default)]
    pub position: Option<u8>,
    pub board: Board,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEnded {
    pub match_id: MatchId,
    #[serde(default, with = "serde_optional_address")]
    pub winner: Option<Address>,
    pub final_board: Board,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCancelled {
    pub match_id: MatchId,
}

/// Sent by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Subscribe to the account-scoped room (creator-joined notifications).
    JoinUserRoom(Address),
    /// Subscribe to a match-scoped room.
    JoinMatch(MatchId),
    MakeMove(MoveBroadcast),
    LeaveMatch(MatchId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveBroadcast {
    pub match_id: MatchId,
    pub player: Address,
    pub position: u8,
    pub board: Board,
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn test_decode_match_joined() {
        let raw = format!(
            r#"{{"event":"matchJoined","data":{{"matchId":1,"player1":"{A}","player2":"{B}","stakeAmount":"5"}}}}"#
        );
        let event: ServerEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.name(), "matchJoined");
        assert_eq!(event.match_id(), MatchId(1));
        let ServerEvent::MatchJoined(joined) = event else {
            panic!("expected matchJoined");
        };
        assert_eq!(joined.player2.as_str(), B);
        assert_eq!(joined.stake_amount, Some(TokenAmount::from_base_units(5)));
    }

    #[test]
    fn test_decode_move_update_with_empty_winner() {
        let raw = format!(
            r#"{{"event":"moveUpdate","data":{{"matchId":"2","board":["X","","","","","","","",""],"gameState":"active","winner":"","currentPlayer":"{B}"}}}}"#
        );
        let ServerEvent::MoveUpdate(update) = serde_json::from_str(&raw).unwrap() else {
            panic!("expected moveUpdate");
        };
        assert_eq!(update.match_id, MatchId(2));
        assert!(update.winner.is_none());
        assert_eq!(update.current_player.unwrap().as_str(), B);
    }

    #[test]
    fn test_decode_move_update_with_null_state() {
        let raw = r#"{"event":"moveUpdate","data":{"matchId":2,"board":["X","","","","","","","",""],"gameState":null}}"#;
        let ServerEvent::MoveUpdate(update) = serde_json::from_str(raw).unwrap() else {
            panic!("expected moveUpdate");
        };
        assert_eq!(update.game_state, GameState::InProgress);
        assert!(update.current_player.is_none());
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(serde_json::from_str::<ServerEvent>(r#"{"event":"chat","data":{}}"#).is_err());
    }

    #[test]
    fn test_encode_client_events() {
        let event = ClientEvent::JoinUserRoom(Address::parse(A).unwrap());
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            format!(r#"{{"event":"joinUserRoom","data":"{A}"}}"#)
        );
        let event = ClientEvent::LeaveMatch(MatchId(4));
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"event":"leaveMatch","data":4}"#
        );
    }
}
