//! In-memory collaborators for driving the client without a chain, an API
//! server or a websocket.

use crate::{
    channel::{Connection, Publisher, Realtime},
    http::MatchApi,
    wallet::Wallet,
    Error, Result,
};
use async_trait::async_trait;
use futures::{channel::mpsc, StreamExt};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;
use trix_types::{
    api::{JoinConfirmation, JoinRequest, MoveRequest, MoveResponse},
    events::{ClientEvent, ServerEvent},
    Address, Balances, GameState, MatchId, OpenMatch, TokenAmount,
};

#[derive(Debug)]
struct WalletState {
    balances: Balances,
    next_match_id: u64,
    fail_next: Option<String>,
    calls: Vec<&'static str>,
}

/// Wallet that moves balances around in memory.
#[derive(Debug)]
pub struct MockWallet {
    account: Address,
    state: Mutex<WalletState>,
}

impl MockWallet {
    pub fn new(account: Address, balances: Balances) -> Self {
        Self {
            account,
            state: Mutex::new(WalletState {
                balances,
                next_match_id: 1,
                fail_next: None,
                calls: Vec::new(),
            }),
        }
    }

    /// Id handed out by the next `create_match`.
    pub fn set_next_match_id(&self, match_id: u64) {
        self.state.lock().unwrap().next_match_id = match_id;
    }

    /// Make the next mutating call fail as if the user rejected it.
    pub fn fail_next(&self, reason: &str) {
        self.state.lock().unwrap().fail_next = Some(reason.to_string());
    }

    pub fn balances_now(&self) -> Balances {
        self.state.lock().unwrap().balances
    }

    /// Names of the mutating calls made so far.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    fn mutate<T>(
        &self,
        call: &'static str,
        apply: impl FnOnce(&mut WalletState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(reason) = state.fail_next.take() {
            return Err(Error::Wallet(reason));
        }
        apply(&mut state)
    }
}

fn debit(balance: &mut TokenAmount, amount: TokenAmount) -> Result<()> {
    *balance = balance
        .checked_sub(amount)
        .ok_or_else(|| Error::Wallet("execution reverted: insufficient balance".into()))?;
    Ok(())
}

fn credit(balance: &mut TokenAmount, amount: TokenAmount) -> Result<()> {
    *balance = balance
        .checked_add(amount)
        .ok_or_else(|| Error::Wallet("execution reverted: overflow".into()))?;
    Ok(())
}

#[async_trait]
impl Wallet for MockWallet {
    async fn connect(&self) -> Result<Address> {
        Ok(self.account.clone())
    }

    async fn balances(&self, account: &Address) -> Result<Balances> {
        if account != &self.account {
            return Ok(Balances::default());
        }
        Ok(self.state.lock().unwrap().balances)
    }

    async fn mint_stable(&self, amount: TokenAmount) -> Result<()> {
        self.mutate("mint_stable", |state| credit(&mut state.balances.stable, amount))
    }

    async fn buy_game_token(&self, amount: TokenAmount) -> Result<()> {
        self.mutate("buy_game_token", |state| {
            debit(&mut state.balances.stable, amount)?;
            credit(&mut state.balances.game, amount)
        })
    }

    async fn create_match(&self, stake: TokenAmount) -> Result<MatchId> {
        self.mutate("create_match", |state| {
            debit(&mut state.balances.game, stake)?;
            let match_id = MatchId(state.next_match_id);
            state.next_match_id += 1;
            Ok(match_id)
        })
    }

    async fn join_match(&self, _match_id: MatchId, stake: TokenAmount) -> Result<()> {
        self.mutate("join_match", |state| debit(&mut state.balances.game, stake))
    }
}

#[derive(Default)]
struct ApiState {
    open: Vec<OpenMatch>,
    polls: usize,
    joins: Vec<JoinRequest>,
    join_responses: VecDeque<Result<JoinConfirmation>>,
    moves: Vec<MoveRequest>,
    move_responses: VecDeque<Result<MoveResponse>>,
}

/// Scripted match API. Unscripted moves are accepted with the submitted
/// board and no turn information; unscripted joins are confirmed.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<ApiState>,
    move_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockApi {
    pub fn set_open_matches(&self, open: Vec<OpenMatch>) {
        self.state.lock().unwrap().open = open;
    }

    pub fn push_join_response(&self, response: Result<JoinConfirmation>) {
        self.state.lock().unwrap().join_responses.push_back(response);
    }

    pub fn push_move_response(&self, response: Result<MoveResponse>) {
        self.state.lock().unwrap().move_responses.push_back(response);
    }

    /// Hold move submissions until [`MockApi::release_move`] is called.
    pub fn hold_moves(&self) {
        *self.move_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    /// Let one held move submission answer.
    pub fn release_move(&self) {
        if let Some(gate) = self.move_gate.lock().unwrap().as_ref() {
            gate.notify_one();
        }
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    pub fn joins(&self) -> Vec<JoinRequest> {
        self.state.lock().unwrap().joins.clone()
    }

    pub fn moves(&self) -> Vec<MoveRequest> {
        self.state.lock().unwrap().moves.clone()
    }
}

#[async_trait]
impl MatchApi for MockApi {
    async fn available_matches(&self) -> Result<Vec<OpenMatch>> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        Ok(state.open.clone())
    }

    async fn register_join(&self, request: &JoinRequest) -> Result<JoinConfirmation> {
        let mut state = self.state.lock().unwrap();
        state.joins.push(request.clone());
        state
            .join_responses
            .pop_front()
            .unwrap_or_else(|| Ok(JoinConfirmation::default()))
    }

    async fn submit_move(&self, request: &MoveRequest) -> Result<MoveResponse> {
        self.state.lock().unwrap().moves.push(request.clone());
        let gate = self.move_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let scripted = self.state.lock().unwrap().move_responses.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(MoveResponse {
                success: true,
                board: Some(request.board),
                game_state: GameState::InProgress,
                winner: None,
                current_player: None,
                message: None,
            })
        })
    }
}

struct RecordingPublisher {
    published: Arc<Mutex<Vec<ClientEvent>>>,
}

impl Publisher for RecordingPublisher {
    fn publish(&self, event: ClientEvent) -> Result<()> {
        self.published.lock().unwrap().push(event);
        Ok(())
    }
}

/// In-memory real-time channel. Events pushed by the test are delivered on
/// the most recent connection.
#[derive(Default)]
pub struct MockRealtime {
    sender: Mutex<Option<mpsc::UnboundedSender<Result<ServerEvent>>>>,
    published: Arc<Mutex<Vec<ClientEvent>>>,
    connects: Mutex<Vec<Address>>,
    connect_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockRealtime {
    pub fn push(&self, event: ServerEvent) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.unbounded_send(Ok(event));
        }
    }

    /// End the current connection's event stream.
    pub fn hang_up(&self) {
        self.sender.lock().unwrap().take();
    }

    /// Hold connection attempts until [`MockRealtime::release_connect`] is
    /// called.
    pub fn hold_connects(&self) {
        *self.connect_gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release_connect(&self) {
        if let Some(gate) = self.connect_gate.lock().unwrap().as_ref() {
            gate.notify_one();
        }
    }

    pub fn published(&self) -> Vec<ClientEvent> {
        self.published.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<Address> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Realtime for MockRealtime {
    async fn connect(&self, account: &Address) -> Result<Connection> {
        self.connects.lock().unwrap().push(account.clone());
        let gate = self.connect_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let (sender, receiver) = mpsc::unbounded();
        *self.sender.lock().unwrap() = Some(sender);
        Ok(Connection {
            publisher: Arc::new(RecordingPublisher {
                published: self.published.clone(),
            }),
            events: receiver.boxed(),
        })
    }
}
