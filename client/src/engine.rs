//! Move reconciliation.
//!
//! The engine is the single owner of the board, the turn flag and the game
//! result of an active match. It is mutated through two entry points only:
//! a local move ([`MoveEngine::begin_move`] followed by
//! [`MoveEngine::confirm`] or [`MoveEngine::rollback`]) and an authoritative
//! snapshot ([`MoveEngine::apply`]), which covers both API responses and
//! real-time pushes.
//!
//! Every authoritative snapshot overwrites local state unconditionally, so
//! the order in which API responses and channel events arrive only decides
//! which authoritative value is shown last.

use crate::{Error, Result};
use tracing::debug;
use trix_types::{
    api::{MoveRequest, MoveResponse},
    events::{GameEnded, MoveBroadcast, MoveUpdate, OpponentMove},
    Address, Board, GameResult, MatchId, Symbol,
};

/// Who moves next according to an authoritative signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Turn {
    /// The named player moves next.
    Of(Address),
    /// The named player just moved, so the other one is next.
    After(Address),
    Unknown,
}

impl Turn {
    fn is_local(&self, local: &Address) -> bool {
        match self {
            Turn::Of(player) => player == local,
            Turn::After(player) => player != local,
            Turn::Unknown => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ongoing(Turn),
    Finished { winner: Option<Address> },
}

/// Authoritative board state, whatever channel it arrived on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub board: Board,
    pub outcome: Outcome,
}

impl Snapshot {
    /// `None` when the response carries no board to apply.
    pub fn from_response(response: &MoveResponse) -> Option<Self> {
        let board = response.board?;
        let outcome = if response.game_state.is_terminal() {
            Outcome::Finished {
                winner: response.winner.clone(),
            }
        } else {
            Outcome::Ongoing(
                response
                    .current_player
                    .clone()
                    .map(Turn::Of)
                    .unwrap_or(Turn::Unknown),
            )
        };
        Some(Self { board, outcome })
    }
}

impl From<&MoveUpdate> for Snapshot {
    fn from(update: &MoveUpdate) -> Self {
        let outcome = if update.game_state.is_terminal() {
            Outcome::Finished {
                winner: update.winner.clone(),
            }
        } else {
            Outcome::Ongoing(
                update
                    .current_player
                    .clone()
                    .map(Turn::Of)
                    .unwrap_or(Turn::Unknown),
            )
        };
        Self {
            board: update.board,
            outcome,
        }
    }
}

impl From<&OpponentMove> for Snapshot {
    fn from(event: &OpponentMove) -> Self {
        Self {
            board: event.board,
            outcome: Outcome::Ongoing(Turn::After(event.player.clone())),
        }
    }
}

impl From<&GameEnded> for Snapshot {
    fn from(event: &GameEnded) -> Self {
        Self {
            board: event.final_board,
            outcome: Outcome::Finished {
                winner: event.winner.clone(),
            },
        }
    }
}

/// A local move that has been applied optimistically and awaits the
/// authoritative answer. Holds everything needed to undo it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMove {
    pub match_id: MatchId,
    pub cell: u8,
    /// Board with the local mark written in.
    pub board: Board,
    previous_board: Board,
    previous_turn: bool,
    revision: u64,
}

impl PendingMove {
    pub fn request(&self, player: &Address) -> MoveRequest {
        MoveRequest {
            match_id: self.match_id,
            player: player.clone(),
            position: self.cell,
            board: self.board,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MoveEngine {
    match_id: MatchId,
    local: Address,
    symbol: Symbol,
    board: Board,
    local_turn: bool,
    result: Option<GameResult>,
    /// Bumped on every authoritative application.
    revision: u64,
}

impl MoveEngine {
    /// Fresh engine for a newly activated match. `X` always moves first.
    pub fn new(match_id: MatchId, local: Address, symbol: Symbol) -> Self {
        Self {
            match_id,
            local,
            symbol,
            board: Board::empty(),
            local_turn: symbol == Symbol::X,
            result: None,
            revision: 0,
        }
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn is_local_turn(&self) -> bool {
        self.local_turn
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    /// Optimistically place the local mark. Returns `None` (and changes
    /// nothing) when the move is not allowed right now: occupied or
    /// out-of-range cell, opponent's turn, or a finished game.
    pub fn begin_move(&mut self, cell: usize) -> Option<PendingMove> {
        if self.result.is_some() || !self.local_turn {
            return None;
        }
        let board = self.board.with_mark(cell, self.symbol)?;
        let pending = PendingMove {
            match_id: self.match_id,
            cell: cell as u8,
            board,
            previous_board: self.board,
            previous_turn: self.local_turn,
            revision: self.revision,
        };
        self.board = board;
        self.local_turn = false;
        Some(pending)
    }

    /// Reconcile a pending move with the API's answer. A refused or
    /// malformed answer rolls the move back and is reported as an error.
    pub fn confirm(
        &mut self,
        pending: &PendingMove,
        response: &MoveResponse,
    ) -> Result<Option<GameResult>> {
        if !response.success {
            self.rollback(pending);
            return Err(Error::MoveRejected(
                response
                    .message
                    .clone()
                    .unwrap_or_else(|| "move not accepted".to_string()),
            ));
        }
        let Some(snapshot) = Snapshot::from_response(response) else {
            self.rollback(pending);
            return Err(Error::UnexpectedResponse);
        };
        Ok(self.apply(&snapshot))
    }

    /// Undo an optimistic move. If an authoritative snapshot landed while
    /// the move was in flight, that snapshot already replaced the guess and
    /// is kept.
    pub fn rollback(&mut self, pending: &PendingMove) {
        if self.revision != pending.revision {
            debug!(
                match_id = %self.match_id,
                cell = pending.cell,
                "optimistic move superseded by authoritative state"
            );
            return;
        }
        self.board = pending.previous_board;
        self.local_turn = pending.previous_turn;
    }

    /// Overwrite local state with an authoritative snapshot. Returns the
    /// game result if this snapshot is the one that ended the game.
    pub fn apply(&mut self, snapshot: &Snapshot) -> Option<GameResult> {
        self.revision += 1;
        self.board = snapshot.board;
        match &snapshot.outcome {
            Outcome::Finished { winner } => {
                self.local_turn = false;
                if self.result.is_some() {
                    return None;
                }
                let result = GameResult::resolve(winner.as_ref(), &self.local);
                self.result = Some(result);
                Some(result)
            }
            Outcome::Ongoing(turn) => {
                self.local_turn = self.result.is_none() && turn.is_local(&self.local);
                None
            }
        }
    }

    /// The message announcing a confirmed move to the opponent.
    pub fn broadcast(&self, pending: &PendingMove) -> MoveBroadcast {
        MoveBroadcast {
            match_id: self.match_id,
            player: self.local.clone(),
            position: pending.cell,
            board: self.board,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use trix_types::{Cell, GameState, BOARD_CELLS};

    fn addr(byte: u8) -> Address {
        Address::parse(&format!("0x{}", format!("{byte:02x}").repeat(20))).unwrap()
    }

    fn creator() -> MoveEngine {
        MoveEngine::new(MatchId(1), addr(0xa), Symbol::X)
    }

    fn response(
        board: Board,
        state: GameState,
        winner: Option<Address>,
        next: Option<Address>,
    ) -> MoveResponse {
        MoveResponse {
            success: true,
            board: Some(board),
            game_state: state,
            winner,
            current_player: next,
            message: None,
        }
    }

    #[test]
    fn test_creator_moves_first() {
        let engine = creator();
        assert!(engine.is_local_turn());
        assert_eq!(engine.symbol(), Symbol::X);
        assert!(engine.board().is_clear());

        let joiner = MoveEngine::new(MatchId(1), addr(0xb), Symbol::O);
        assert!(!joiner.is_local_turn());
    }

    #[test]
    fn test_optimistic_then_confirmed() {
        let mut engine = creator();
        let pending = engine.begin_move(4).unwrap();
        assert_eq!(engine.board().get(4), Some(Cell::X));
        assert!(!engine.is_local_turn());

        let result = engine
            .confirm(
                &pending,
                &response(pending.board, GameState::InProgress, None, Some(addr(0xb))),
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(engine.board(), &pending.board);
        assert!(!engine.is_local_turn());
    }

    #[test]
    fn test_authoritative_board_wins_over_guess() {
        let mut engine = creator();
        let pending = engine.begin_move(4).unwrap();
        let server_board = Board::empty().with_mark(0, Symbol::X).unwrap();
        engine
            .confirm(
                &pending,
                &response(server_board, GameState::InProgress, None, Some(addr(0xa))),
            )
            .unwrap();
        assert_eq!(engine.board(), &server_board);
        assert!(engine.is_local_turn());
    }

    #[test]
    fn test_rejected_move_rolls_back() {
        let mut engine = creator();
        let pending = engine.begin_move(2).unwrap();
        let refused = MoveResponse {
            success: false,
            board: None,
            game_state: GameState::InProgress,
            winner: None,
            current_player: None,
            message: Some("not your turn".into()),
        };
        let err = engine.confirm(&pending, &refused).unwrap_err();
        assert!(matches!(err, Error::MoveRejected(ref msg) if msg == "not your turn"));
        assert!(engine.board().is_clear());
        assert!(engine.is_local_turn());
    }

    #[test]
    fn test_success_without_board_rolls_back() {
        let mut engine = creator();
        let pending = engine.begin_move(2).unwrap();
        let mut malformed = response(Board::empty(), GameState::InProgress, None, None);
        malformed.board = None;
        assert!(matches!(
            engine.confirm(&pending, &malformed),
            Err(Error::UnexpectedResponse)
        ));
        assert!(engine.board().is_clear());
        assert!(engine.is_local_turn());
    }

    #[test]
    fn test_rollback_keeps_newer_authoritative_state() {
        let mut engine = creator();
        let pending = engine.begin_move(4).unwrap();
        let pushed = Board::empty()
            .with_mark(4, Symbol::X)
            .and_then(|b| b.with_mark(0, Symbol::O))
            .unwrap();
        engine.apply(&Snapshot {
            board: pushed,
            outcome: Outcome::Ongoing(Turn::Of(addr(0xa))),
        });
        engine.rollback(&pending);
        assert_eq!(engine.board(), &pushed);
        assert!(engine.is_local_turn());
    }

    #[test]
    fn test_guards_are_silent() {
        let mut engine = MoveEngine::new(MatchId(1), addr(0xb), Symbol::O);
        assert!(engine.begin_move(0).is_none(), "out of turn");

        let mut engine = creator();
        assert!(engine.begin_move(BOARD_CELLS).is_none(), "out of range");
        engine.apply(&Snapshot {
            board: Board::empty(),
            outcome: Outcome::Finished { winner: None },
        });
        assert!(engine.begin_move(0).is_none(), "after result");
        assert_eq!(engine.result(), Some(GameResult::Tie));
    }

    #[test]
    fn test_result_precedence() {
        let local = addr(0xa);
        for (winner, expected) in [
            (Some(local.clone()), GameResult::Win),
            (Some(addr(0xb)), GameResult::Lose),
            (None, GameResult::Tie),
        ] {
            let mut engine = creator();
            let pending = engine.begin_move(0).unwrap();
            let state = if winner.is_some() { GameState::Finished } else { GameState::Tie };
            let result = engine
                .confirm(&pending, &response(pending.board, state, winner, None))
                .unwrap();
            assert_eq!(result, Some(expected));
            assert_eq!(engine.result(), Some(expected));
            assert!(!engine.is_local_turn());
        }
    }

    #[test]
    fn test_terminal_result_is_sticky() {
        let mut engine = creator();
        let won = Snapshot {
            board: Board::empty(),
            outcome: Outcome::Finished { winner: Some(addr(0xa)) },
        };
        assert_eq!(engine.apply(&won), Some(GameResult::Win));
        assert_eq!(engine.apply(&won), None);

        let lost = Snapshot {
            board: Board::empty(),
            outcome: Outcome::Finished { winner: Some(addr(0xb)) },
        };
        engine.apply(&lost);
        engine.apply(&Snapshot {
            board: Board::empty(),
            outcome: Outcome::Ongoing(Turn::Of(addr(0xa))),
        });
        assert_eq!(engine.result(), Some(GameResult::Win));
        assert!(!engine.is_local_turn());
    }

    #[test]
    fn test_opponent_move_hands_turn_back() {
        let mut engine = MoveEngine::new(MatchId(1), addr(0xb), Symbol::O);
        let board = Board::empty().with_mark(4, Symbol::X).unwrap();
        engine.apply(&Snapshot::from(&OpponentMove {
            match_id: MatchId(1),
            player: addr(0xa),
            position: Some(4),
            board,
        }));
        assert!(engine.is_local_turn());
        assert_eq!(engine.board(), &board);
    }

    #[test]
    fn test_broadcast_carries_authoritative_board() {
        let mut engine = creator();
        let pending = engine.begin_move(4).unwrap();
        let server_board = Board::empty().with_mark(4, Symbol::X).unwrap();
        engine
            .confirm(
                &pending,
                &response(server_board, GameState::InProgress, None, Some(addr(0xb))),
            )
            .unwrap();
        let broadcast = engine.broadcast(&pending);
        assert_eq!(broadcast.position, 4);
        assert_eq!(broadcast.board, server_board);
        assert_eq!(broadcast.player, addr(0xa));
    }

    fn arb_cell() -> impl Strategy<Value = Cell> {
        prop_oneof![Just(Cell::Empty), Just(Cell::X), Just(Cell::O)]
    }

    fn arb_board() -> impl Strategy<Value = Board> {
        proptest::array::uniform9(arb_cell()).prop_map(Board::from_cells)
    }

    proptest! {
        #[test]
        fn test_occupied_cell_is_noop(
            board in arb_board(),
            cell in 0usize..BOARD_CELLS,
            turn in any::<bool>(),
        ) {
            let mut engine = creator();
            engine.apply(&Snapshot {
                board,
                outcome: Outcome::Ongoing(Turn::Of(if turn { addr(0xa) } else { addr(0xb) })),
            });
            prop_assume!(board.get(cell) != Some(Cell::Empty));
            let before = engine.clone();
            prop_assert!(engine.begin_move(cell).is_none());
            prop_assert_eq!(engine.board(), before.board());
            prop_assert_eq!(engine.is_local_turn(), before.is_local_turn());
        }

        #[test]
        fn test_failed_submission_restores(board in arb_board(), cell in 0usize..BOARD_CELLS) {
            let mut engine = creator();
            engine.apply(&Snapshot { board, outcome: Outcome::Ongoing(Turn::Of(addr(0xa))) });
            let board_before = *engine.board();
            let turn_before = engine.is_local_turn();
            if let Some(pending) = engine.begin_move(cell) {
                engine.rollback(&pending);
            }
            prop_assert_eq!(engine.board(), &board_before);
            prop_assert_eq!(engine.is_local_turn(), turn_before);
        }

        #[test]
        fn test_snapshot_idempotent(
            board in arb_board(),
            local_next in any::<bool>(),
            finished in any::<bool>(),
        ) {
            let snapshot = Snapshot {
                board,
                outcome: if finished {
                    Outcome::Finished { winner: Some(addr(0xb)) }
                } else if local_next {
                    Outcome::Ongoing(Turn::Of(addr(0xa)))
                } else {
                    Outcome::Ongoing(Turn::After(addr(0xa)))
                },
            };
            let mut once = creator();
            once.apply(&snapshot);
            let mut twice = creator();
            twice.apply(&snapshot);
            twice.apply(&snapshot);
            prop_assert_eq!(once.board(), twice.board());
            prop_assert_eq!(once.is_local_turn(), twice.is_local_turn());
            prop_assert_eq!(once.result(), twice.result());
        }
    }
}
