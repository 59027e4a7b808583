//! Match lifecycle: `Idle -> Waiting -> Active -> Idle`.
//!
//! The controller makes every decision synchronously. Wallet and API calls
//! are split into a `prepare_*` step that validates and marks the controller
//! busy, and a completion step that consumes the call's result.

use crate::engine::{MoveEngine, PendingMove, Snapshot};
use crate::{Error, Result};
use tracing::{debug, info};
use trix_types::{
    api::{JoinConfirmation, MoveResponse},
    events::{MoveBroadcast, ServerEvent},
    Address, Balances, GameResult, Match, MatchId, MatchStatus, OpenMatch, Symbol, TokenAmount,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitingMatch {
    pub match_id: MatchId,
    pub stake: TokenAmount,
}

#[derive(Clone, Debug)]
pub struct ActiveMatch {
    pub record: Match,
    pub engine: MoveEngine,
}

impl ActiveMatch {
    fn new(record: Match, local: &Address, symbol: Symbol) -> Self {
        let engine = MoveEngine::new(record.match_id, local.clone(), symbol);
        Self { record, engine }
    }
}

#[derive(Clone, Debug, Default)]
pub enum Phase {
    #[default]
    Idle,
    Waiting(WaitingMatch),
    Active(ActiveMatch),
}

/// What happened to a completed move submission.
#[derive(Debug)]
pub enum MoveOutcome {
    /// Accepted; `broadcast` should be relayed to the opponent.
    Confirmed {
        broadcast: MoveBroadcast,
        finished: Option<GameResult>,
    },
    /// Refused or failed; the optimistic mark has been rolled back.
    Rejected(Error),
    /// The match the move belonged to is no longer tracked.
    Stale,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    /// A waiting match was joined by an opponent.
    Activated(MatchId),
    Updated { finished: Option<GameResult> },
    Cancelled(MatchId),
}

#[derive(Debug)]
pub struct MatchController {
    local: Address,
    phase: Phase,
    busy: bool,
}

impl MatchController {
    pub fn new(local: Address) -> Self {
        Self {
            local,
            phase: Phase::Idle,
            busy: false,
        }
    }

    pub fn local(&self) -> &Address {
        &self.local
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Id of the match currently tracked, waiting or active.
    pub fn tracked_match(&self) -> Option<MatchId> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Waiting(waiting) => Some(waiting.match_id),
            Phase::Active(active) => Some(active.record.match_id),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.busy || !self.is_idle() {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Validate a create request before the wallet is touched.
    pub fn prepare_create(&mut self, stake: &str, balances: &Balances) -> Result<TokenAmount> {
        self.ensure_ready()?;
        let stake = TokenAmount::parse_units(stake)?;
        if stake.is_zero() {
            return Err(Error::InvalidAmount("stake must be positive".into()));
        }
        ensure_funds("game", stake, balances.game)?;
        self.busy = true;
        Ok(stake)
    }

    /// Consume the wallet's answer to a create request. On success the
    /// caller subscribes the channel to the returned match.
    pub fn created(&mut self, stake: TokenAmount, result: Result<MatchId>) -> Result<MatchId> {
        self.busy = false;
        let match_id = result?;
        info!(%match_id, %stake, "match created, waiting for opponent");
        self.phase = Phase::Waiting(WaitingMatch { match_id, stake });
        Ok(match_id)
    }

    pub fn prepare_join(&mut self, open: &OpenMatch, balances: &Balances) -> Result<()> {
        self.ensure_ready()?;
        if open.player1 == self.local {
            return Err(Error::JoinRejected("cannot join your own match".into()));
        }
        ensure_funds("game", open.stake_amount, balances.game)?;
        self.busy = true;
        Ok(())
    }

    /// Consume the combined result of the wallet join and the API
    /// registration. Any failure leaves the controller idle.
    pub fn joined(
        &mut self,
        open: &OpenMatch,
        result: Result<JoinConfirmation>,
    ) -> Result<MatchId> {
        self.busy = false;
        let confirmation = result?;
        if !confirmation.is_confirmed() {
            return Err(Error::JoinRejected(
                confirmation
                    .message
                    .unwrap_or_else(|| "join not accepted".to_string()),
            ));
        }
        let record = Match {
            match_id: open.match_id,
            player1: open.player1.clone(),
            player2: Some(self.local.clone()),
            stake_amount: open.stake_amount,
            status: MatchStatus::Active,
        };
        info!(match_id = %open.match_id, "joined match");
        self.phase = Phase::Active(ActiveMatch::new(record, &self.local, Symbol::O));
        Ok(open.match_id)
    }

    pub fn cancel_wait(&mut self) -> Option<MatchId> {
        let Phase::Waiting(waiting) = &self.phase else {
            return None;
        };
        let match_id = waiting.match_id;
        self.phase = Phase::Idle;
        Some(match_id)
    }

    pub fn leave(&mut self) -> Option<MatchId> {
        let Phase::Active(active) = &self.phase else {
            return None;
        };
        let match_id = active.record.match_id;
        self.phase = Phase::Idle;
        Some(match_id)
    }

    /// Return to the lobby once the result has been shown.
    pub fn acknowledge_result(&mut self) -> Option<MatchId> {
        match &self.phase {
            Phase::Active(active) if active.engine.result().is_some() => self.leave(),
            _ => None,
        }
    }

    pub fn begin_move(&mut self, cell: usize) -> Option<PendingMove> {
        let Phase::Active(active) = &mut self.phase else {
            return None;
        };
        active.engine.begin_move(cell)
    }

    pub fn finish_move(
        &mut self,
        pending: &PendingMove,
        result: Result<MoveResponse>,
    ) -> MoveOutcome {
        let Some(active) = self.active_mut(pending.match_id) else {
            debug!(match_id = %pending.match_id, "move completed for untracked match");
            return MoveOutcome::Stale;
        };
        let confirmed = match result {
            Ok(response) => active.engine.confirm(pending, &response),
            Err(err) => {
                active.engine.rollback(pending);
                Err(err)
            }
        };
        match confirmed {
            Ok(finished) => {
                if finished.is_some() {
                    active.record.status = MatchStatus::Finished;
                }
                MoveOutcome::Confirmed {
                    broadcast: active.engine.broadcast(pending),
                    finished,
                }
            }
            Err(err) => MoveOutcome::Rejected(err),
        }
    }

    pub fn handle_event(&mut self, event: &ServerEvent) -> EventOutcome {
        match event {
            ServerEvent::MatchJoined(joined) => {
                let Phase::Waiting(waiting) = &self.phase else {
                    return EventOutcome::Ignored;
                };
                if waiting.match_id != joined.match_id || joined.player1 != self.local {
                    return EventOutcome::Ignored;
                }
                let record = Match {
                    match_id: joined.match_id,
                    player1: self.local.clone(),
                    player2: Some(joined.player2.clone()),
                    stake_amount: waiting.stake,
                    status: MatchStatus::Active,
                };
                info!(match_id = %joined.match_id, opponent = %joined.player2, "opponent joined");
                self.phase = Phase::Active(ActiveMatch::new(record, &self.local, Symbol::X));
                EventOutcome::Activated(joined.match_id)
            }
            ServerEvent::MoveUpdate(update) => self.apply(update.match_id, Snapshot::from(update)),
            ServerEvent::OpponentMove(moved) => self.apply(moved.match_id, Snapshot::from(moved)),
            ServerEvent::GameEnded(ended) => self.apply(ended.match_id, Snapshot::from(ended)),
            ServerEvent::MatchCancelled(cancelled) => {
                if self.tracked_match() != Some(cancelled.match_id) {
                    return EventOutcome::Ignored;
                }
                info!(match_id = %cancelled.match_id, "match cancelled");
                self.phase = Phase::Idle;
                EventOutcome::Cancelled(cancelled.match_id)
            }
        }
    }

    fn apply(&mut self, match_id: MatchId, snapshot: Snapshot) -> EventOutcome {
        let Some(active) = self.active_mut(match_id) else {
            return EventOutcome::Ignored;
        };
        let finished = active.engine.apply(&snapshot);
        if finished.is_some() {
            active.record.status = MatchStatus::Finished;
        }
        EventOutcome::Updated { finished }
    }

    fn active_mut(&mut self, match_id: MatchId) -> Option<&mut ActiveMatch> {
        match &mut self.phase {
            Phase::Active(active) if active.record.match_id == match_id => Some(active),
            _ => None,
        }
    }
}

fn ensure_funds(token: &'static str, needed: TokenAmount, available: TokenAmount) -> Result<()> {
    if available < needed {
        return Err(Error::InsufficientBalance {
            token,
            needed,
            available,
        });
    }
    Ok(())
}
