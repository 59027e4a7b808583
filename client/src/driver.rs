//! The client event loop.
//!
//! The [`Driver`] owns the session, the lifecycle controller, discovery and
//! the real-time channel, and runs them from a single task. Every input
//! (user intent, channel event, finished wallet or API call, discovery tick)
//! is handled to completion before the next one is looked at. Wallet and
//! API calls are never awaited inline: they are queued as futures and their
//! results come back as [`Completion`]s.
//!
//! Each completion carries the session epoch it was started in. The epoch
//! changes whenever the account goes away, so results for a previous account
//! are dropped on arrival.

use crate::{
    channel::{Channel, ConnectionState, Connection, Realtime},
    discovery::Discovery,
    engine::PendingMove,
    http::MatchApi,
    lifecycle::{EventOutcome, MatchController, MoveOutcome, Phase},
    session::{self, SessionContext},
    wallet::Wallet,
    Config, Error, Result,
};
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};
use trix_types::{
    api::{JoinConfirmation, JoinRequest, MoveResponse},
    events::ServerEvent,
    Account, Address, Balances, Board, GameResult, MatchId, OpenMatch, Symbol, TokenAmount,
};

/// A user request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    Connect,
    Disconnect,
    /// Reload balances and the open match listing, and reopen the
    /// real-time channel if it dropped.
    Refresh,
    MintStable(String),
    BuyGameToken(String),
    CreateMatch(String),
    JoinMatch(MatchId),
    Cell(usize),
    CancelWait,
    Leave,
    /// Leave a finished match.
    BackToLobby,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A transient message for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameView {
    pub match_id: MatchId,
    pub stake: TokenAmount,
    pub opponent: Option<Address>,
    pub symbol: Symbol,
    pub board: Board,
    pub local_turn: bool,
    pub result: Option<GameResult>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PhaseView {
    #[default]
    Lobby,
    Waiting {
        match_id: MatchId,
        stake: TokenAmount,
    },
    Playing(GameView),
}

/// Everything a front end needs to render.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchView {
    pub account: Option<Account>,
    /// A create or join is in flight.
    pub busy: bool,
    pub connection: ConnectionState,
    pub open_matches: Vec<OpenMatch>,
    pub phase: PhaseView,
}

/// Result of an external call, fed back into the loop.
enum Completion {
    Connected(Result<Account>),
    Balances(Address, Result<Balances>),
    Realtime(Address, Result<Connection>),
    Minted(Result<()>),
    Bought(Result<()>),
    Created {
        stake: TokenAmount,
        result: Result<MatchId>,
    },
    Joined {
        open: OpenMatch,
        result: Result<JoinConfirmation>,
    },
    Moved {
        pending: PendingMove,
        result: Result<MoveResponse>,
    },
    Discovered {
        generation: u64,
        result: Result<Vec<OpenMatch>>,
    },
}

/// Front-end side of a running [`Driver`].
pub struct DriverHandle {
    pub intents: mpsc::UnboundedSender<Intent>,
    pub views: watch::Receiver<MatchView>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub session: SessionContext,
}

pub struct Driver<W: Wallet, A: MatchApi, R: Realtime> {
    wallet: Arc<W>,
    api: Arc<A>,
    realtime: Arc<R>,
    session: SessionContext,
    controller: Option<MatchController>,
    discovery: Discovery,
    channel: Channel,
    pending: FuturesUnordered<BoxFuture<'static, (u64, Completion)>>,
    epoch: u64,
    connecting: bool,
    channel_connecting: bool,
    discovery_interval: Duration,
    intents: mpsc::UnboundedReceiver<Intent>,
    views: watch::Sender<MatchView>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl<W: Wallet, A: MatchApi, R: Realtime> Driver<W, A, R> {
    pub fn new(
        wallet: Arc<W>,
        api: Arc<A>,
        realtime: Arc<R>,
        config: &Config,
    ) -> (Self, DriverHandle) {
        let (intent_tx, intents) = mpsc::unbounded_channel();
        let (views, view_rx) = watch::channel(MatchView::default());
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let session = SessionContext::new();
        let driver = Self {
            wallet,
            api,
            realtime,
            session: session.clone(),
            controller: None,
            discovery: Discovery::default(),
            channel: Channel::default(),
            pending: FuturesUnordered::new(),
            epoch: 0,
            connecting: false,
            channel_connecting: false,
            discovery_interval: config.discovery_interval(),
            intents,
            views,
            notices,
        };
        let handle = DriverHandle {
            intents: intent_tx,
            views: view_rx,
            notices: notice_rx,
            session,
        };
        (driver, handle)
    }

    /// Run until [`Intent::Shutdown`] or until every intent sender is gone.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.discovery_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                intent = self.intents.recv() => match intent {
                    None | Some(Intent::Shutdown) => break,
                    Some(intent) => {
                        if let Err(err) = self.handle_intent(intent) {
                            self.notify(Notice::error(err.to_string()));
                        }
                    }
                },
                event = self.channel.next_event() => self.handle_channel(event),
                Some((epoch, completion)) = self.pending.next(), if !self.pending.is_empty() => {
                    if epoch == self.epoch {
                        self.handle_completion(completion);
                    } else {
                        debug!(
                            epoch,
                            current = self.epoch,
                            "dropping completion from previous session"
                        );
                    }
                }
                _ = ticker.tick() => self.poll_discovery(),
            }
            self.publish_view();
        }
        self.channel.close();
        info!("driver stopped");
    }

    fn spawn(&mut self, call: impl Future<Output = Completion> + Send + 'static) {
        let epoch = self.epoch;
        self.pending.push(async move { (epoch, call.await) }.boxed());
    }

    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => warn!(message = %notice.message, "notice"),
            _ => debug!(message = %notice.message, "notice"),
        }
        let _ = self.notices.send(notice);
    }

    fn account(&self) -> Result<Arc<Account>> {
        self.session.snapshot().ok_or(Error::NotConnected)
    }

    fn controller_mut(&mut self) -> Result<&mut MatchController> {
        self.controller.as_mut().ok_or(Error::NotConnected)
    }

    fn handle_intent(&mut self, intent: Intent) -> Result<()> {
        debug!(?intent, "intent");
        match intent {
            Intent::Connect => {
                if self.connecting || self.session.snapshot().is_some() {
                    self.notify(Notice::info("Wallet already connected"));
                    return Ok(());
                }
                self.connecting = true;
                let wallet = self.wallet.clone();
                self.spawn(async move {
                    let account = match wallet.connect().await {
                        Ok(address) => session::load_account(wallet.as_ref(), address).await,
                        Err(err) => Err(err),
                    };
                    Completion::Connected(account)
                });
            }
            Intent::Disconnect => {
                self.reset();
                self.notify(Notice::info("Wallet disconnected"));
            }
            Intent::Refresh => {
                let account = self.account()?;
                self.refresh_balances(account.address.clone());
                if !self.channel.is_connected() && !self.channel_connecting {
                    self.open_channel(account.address.clone());
                }
                self.poll_discovery();
            }
            Intent::MintStable(amount) => {
                self.account()?;
                let amount = session::validate_mint(&amount)?;
                let wallet = self.wallet.clone();
                self.spawn(async move { Completion::Minted(wallet.mint_stable(amount).await) });
            }
            Intent::BuyGameToken(amount) => {
                let account = self.account()?;
                let amount = session::validate_buy(&amount, &account.balances)?;
                let wallet = self.wallet.clone();
                self.spawn(async move { Completion::Bought(wallet.buy_game_token(amount).await) });
            }
            Intent::CreateMatch(stake) => {
                let account = self.account()?;
                let stake = self.controller_mut()?.prepare_create(&stake, &account.balances)?;
                let wallet = self.wallet.clone();
                self.spawn(async move {
                    Completion::Created {
                        stake,
                        result: wallet.create_match(stake).await,
                    }
                });
            }
            Intent::JoinMatch(match_id) => {
                let account = self.account()?;
                let open = self
                    .discovery
                    .find(match_id)
                    .cloned()
                    .ok_or(Error::UnknownMatch(match_id))?;
                self.controller_mut()?.prepare_join(&open, &account.balances)?;
                let wallet = self.wallet.clone();
                let api = self.api.clone();
                let request = JoinRequest {
                    match_id,
                    player2: account.address.clone(),
                };
                self.spawn(async move {
                    let result = match wallet.join_match(open.match_id, open.stake_amount).await {
                        Ok(()) => api.register_join(&request).await,
                        Err(err) => Err(err),
                    };
                    Completion::Joined { open, result }
                });
            }
            Intent::Cell(cell) => {
                let Some(controller) = self.controller.as_mut() else {
                    return Ok(());
                };
                let Some(pending) = controller.begin_move(cell) else {
                    debug!(cell, "move not allowed");
                    return Ok(());
                };
                let request = pending.request(controller.local());
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.submit_move(&request).await;
                    Completion::Moved { pending, result }
                });
            }
            Intent::CancelWait => {
                if let Some(match_id) = self.controller_mut()?.cancel_wait() {
                    self.channel.leave(match_id);
                    self.notify(Notice::info(format!("Match {match_id} cancelled")));
                    self.enter_lobby();
                }
            }
            Intent::Leave => {
                if let Some(match_id) = self.controller_mut()?.leave() {
                    self.channel.leave(match_id);
                    self.notify(Notice::info(format!("Left match {match_id}")));
                    self.enter_lobby();
                }
            }
            Intent::BackToLobby => {
                if let Some(match_id) = self.controller_mut()?.acknowledge_result() {
                    self.channel.leave(match_id);
                    self.enter_lobby();
                }
            }
            Intent::Shutdown => {}
        }
        Ok(())
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connected(result) => {
                self.connecting = false;
                match result {
                    Ok(account) => {
                        let address = account.address.clone();
                        info!(account = %address, "wallet connected");
                        self.session.set(account);
                        self.controller = Some(MatchController::new(address.clone()));
                        self.open_channel(address.clone());
                        self.notify(Notice::success(format!("Connected {}", address.short())));
                        self.poll_discovery();
                    }
                    Err(err) => {
                        self.notify(Notice::error(format!("Failed to connect wallet: {err}")))
                    }
                }
            }
            Completion::Balances(address, result) => match result {
                Ok(balances) => {
                    self.session.update_balances(&address, balances);
                }
                Err(err) => warn!(account = %address, ?err, "failed to refresh balances"),
            },
            Completion::Realtime(address, result) => {
                self.channel_connecting = false;
                if self.session.address().as_ref() != Some(&address) {
                    return;
                }
                match result {
                    Ok(connection) => {
                        self.channel.attach(address, connection);
                        // Rejoin the match room after a reconnect.
                        let tracked = self.controller.as_ref().and_then(|c| c.tracked_match());
                        if let Some(match_id) = tracked {
                            self.channel.subscribe(match_id);
                        }
                    }
                    Err(err) => self.notify(Notice::error(format!(
                        "Real-time channel unavailable: {err}"
                    ))),
                }
            }
            Completion::Minted(result) => {
                match result {
                    Ok(()) => self.notify(Notice::success("Stable tokens minted")),
                    Err(err) => self.notify(Notice::error(format!("Mint failed: {err}"))),
                }
                self.refresh_current_balances();
            }
            Completion::Bought(result) => {
                match result {
                    Ok(()) => self.notify(Notice::success("Game tokens purchased")),
                    Err(err) => self.notify(Notice::error(format!("Purchase failed: {err}"))),
                }
                self.refresh_current_balances();
            }
            Completion::Created { stake, result } => {
                let Some(controller) = self.controller.as_mut() else {
                    return;
                };
                match controller.created(stake, result) {
                    Ok(match_id) => {
                        self.discovery.clear();
                        self.channel.subscribe(match_id);
                        self.notify(Notice::success(format!(
                            "Match {match_id} created, waiting for an opponent"
                        )));
                    }
                    Err(err) => {
                        self.notify(Notice::error(format!("Failed to create match: {err}")))
                    }
                }
                self.refresh_current_balances();
            }
            Completion::Joined { open, result } => {
                let Some(controller) = self.controller.as_mut() else {
                    return;
                };
                match controller.joined(&open, result) {
                    Ok(match_id) => {
                        self.discovery.clear();
                        self.channel.subscribe(match_id);
                        self.notify(Notice::success(format!("Joined match {match_id}")));
                    }
                    Err(err) => self.notify(Notice::error(format!("Failed to join match: {err}"))),
                }
                self.refresh_current_balances();
            }
            Completion::Moved { pending, result } => {
                let Some(controller) = self.controller.as_mut() else {
                    return;
                };
                match controller.finish_move(&pending, result) {
                    MoveOutcome::Confirmed { broadcast, finished } => {
                        self.channel.publish_move(broadcast);
                        if let Some(result) = finished {
                            self.announce(result);
                        }
                    }
                    MoveOutcome::Rejected(err) => {
                        self.notify(Notice::error(format!("Move failed: {err}")));
                    }
                    MoveOutcome::Stale => {}
                }
            }
            Completion::Discovered { generation, result } => {
                let Some(controller) = self.controller.as_ref() else {
                    return;
                };
                if !controller.is_idle() {
                    debug!("discarding discovery result outside the lobby");
                    return;
                }
                let local = controller.local().clone();
                self.discovery.finish_poll(generation, result, &local);
            }
        }
    }

    fn handle_channel(&mut self, event: Option<Result<ServerEvent>>) {
        let event = match event {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                warn!(?err, "real-time channel error");
                return;
            }
            None => {
                self.notify(Notice::error("Real-time channel disconnected"));
                return;
            }
        };
        debug!(event = event.name(), match_id = %event.match_id(), "real-time event");
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        match controller.handle_event(&event) {
            EventOutcome::Activated(match_id) => {
                self.notify(Notice::success(format!("Opponent joined match {match_id}")));
            }
            EventOutcome::Updated { finished } => {
                if let Some(result) = finished {
                    self.announce(result);
                }
            }
            EventOutcome::Cancelled(match_id) => {
                self.channel.leave(match_id);
                self.notify(Notice::info(format!("Match {match_id} was cancelled")));
                self.enter_lobby();
            }
            EventOutcome::Ignored => debug!(event = event.name(), "event ignored"),
        }
    }

    fn announce(&mut self, result: GameResult) {
        let notice = match result {
            GameResult::Win => Notice::success("You won!"),
            GameResult::Lose => Notice::info("You lost"),
            GameResult::Tie => Notice::info("It's a tie"),
        };
        self.notify(notice);
        self.refresh_current_balances();
    }

    /// Forget the account and everything derived from it.
    fn reset(&mut self) {
        self.epoch += 1;
        self.connecting = false;
        self.channel_connecting = false;
        self.session.clear();
        self.controller = None;
        self.discovery.clear();
        self.channel.close();
    }

    fn enter_lobby(&mut self) {
        self.discovery.clear();
        self.poll_discovery();
    }

    fn open_channel(&mut self, address: Address) {
        self.channel_connecting = true;
        let realtime = self.realtime.clone();
        self.spawn(async move {
            let result = realtime.connect(&address).await;
            Completion::Realtime(address, result)
        });
    }

    fn refresh_balances(&mut self, address: Address) {
        let wallet = self.wallet.clone();
        self.spawn(async move {
            let result = wallet.balances(&address).await;
            Completion::Balances(address, result)
        });
    }

    fn refresh_current_balances(&mut self) {
        if let Some(address) = self.session.address() {
            self.refresh_balances(address);
        }
    }

    fn poll_discovery(&mut self) {
        if !self.controller.as_ref().is_some_and(MatchController::is_idle) {
            return;
        }
        let Some(generation) = self.discovery.begin_poll() else {
            return;
        };
        let api = self.api.clone();
        self.spawn(async move {
            Completion::Discovered {
                generation,
                result: api.available_matches().await,
            }
        });
    }

    fn publish_view(&self) {
        let next = self.view();
        self.views.send_if_modified(|view| {
            if *view == next {
                return false;
            }
            *view = next;
            true
        });
    }

    fn view(&self) -> MatchView {
        let controller = self.controller.as_ref();
        let phase = match controller.map(MatchController::phase) {
            None | Some(Phase::Idle) => PhaseView::Lobby,
            Some(Phase::Waiting(waiting)) => PhaseView::Waiting {
                match_id: waiting.match_id,
                stake: waiting.stake,
            },
            Some(Phase::Active(active)) => PhaseView::Playing(GameView {
                match_id: active.record.match_id,
                stake: active.record.stake_amount,
                opponent: controller
                    .and_then(|c| active.record.opponent_of(c.local()))
                    .cloned(),
                symbol: active.engine.symbol(),
                board: *active.engine.board(),
                local_turn: active.engine.is_local_turn(),
                result: active.engine.result(),
            }),
        };
        MatchView {
            account: self.session.snapshot().map(|account| (*account).clone()),
            busy: controller.is_some_and(MatchController::is_busy),
            connection: self.channel.state(),
            open_matches: self.discovery.matches().to_vec(),
            phase,
        }
    }
}
