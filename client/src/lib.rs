//! Match synchronization client for trix staked tic-tac-toe.
//!
//! The client reconciles three asynchronous sources of truth into one match
//! state: wallet transaction results ([`Wallet`]), the authoritative match
//! API ([`MatchApi`]) and the real-time channel ([`Realtime`]). The
//! [`Driver`] owns the state machine and runs it as a single event loop.

pub mod channel;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod session;
pub mod wallet;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use channel::{Channel, Connection, Publisher, Realtime, WsConnector};
pub use config::Config;
pub use driver::{Driver, DriverHandle, Intent, MatchView, Notice, NoticeLevel};
pub use http::{ApiClient, MatchApi};
pub use session::SessionContext;
pub use wallet::{EvmWallet, Wallet};

use thiserror::Error;
use trix_types::{MatchId, TokenAmount};

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("insufficient {token} balance: need {needed}, have {available}")]
    InsufficientBalance {
        token: &'static str,
        needed: TokenAmount,
        available: TokenAmount,
    },
    #[error("wallet not connected")]
    NotConnected,
    #[error("another match operation is in progress")]
    Busy,
    #[error("unknown match: {0}")]
    UnknownMatch(MatchId),
    #[error("wallet error: {0}")]
    Wallet(String),
    #[error("move rejected: {0}")]
    MoveRejected(String),
    #[error("join rejected: {0}")]
    JoinRejected(String),
    #[error("unexpected response")]
    UnexpectedResponse,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0}")]
    InvalidScheme(String),
    #[error("invalid config: {0}")]
    Config(String),
}

impl From<trix_types::Error> for Error {
    fn from(err: trix_types::Error) -> Self {
        match err {
            trix_types::Error::InvalidAmount(input) => Error::InvalidAmount(input),
            trix_types::Error::AmountOverflow => Error::InvalidAmount("amount too large".into()),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
