//! Wallet and chain access.

use crate::{Config, Error, Result};
use async_trait::async_trait;
use ethers::{
    abi::{Detokenize, RawLog},
    contract::{abigen, ContractCall, EthEvent},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address as EvmAddress, TransactionReceipt, U256, U64},
};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, info};
use trix_types::{Address, Balances, MatchId, TokenAmount};

abigen!(
    TokenContract,
    r#"[
        function mint(address to, uint256 amount) external
        function approve(address spender, uint256 amount) external returns (bool)
        function balanceOf(address owner) external view returns (uint256)
    ]"#
);

abigen!(
    TokenStoreContract,
    r#"[
        function buyTokens(uint256 amount) external
    ]"#
);

abigen!(
    MatchContract,
    r#"[
        event MatchCreated(uint256 indexed matchId, address indexed player1, uint256 stake)
        function createMatch(uint256 stake) external returns (uint256)
        function joinMatch(uint256 matchId) external
    ]"#
);

/// The wallet/chain provider. Every call is a single attempt.
#[async_trait]
pub trait Wallet: Send + Sync + 'static {
    /// Account controlled by this wallet.
    async fn connect(&self) -> Result<Address>;

    async fn balances(&self, account: &Address) -> Result<Balances>;

    async fn mint_stable(&self, amount: TokenAmount) -> Result<()>;

    /// Exchange stable units for game units 1:1.
    async fn buy_game_token(&self, amount: TokenAmount) -> Result<()>;

    /// Lock `stake` in a new match and return its id.
    async fn create_match(&self, stake: TokenAmount) -> Result<MatchId>;

    async fn join_match(&self, match_id: MatchId, stake: TokenAmount) -> Result<()>;
}

type EvmClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// [`Wallet`] backed by a local signing key and JSON-RPC.
pub struct EvmWallet {
    client: Arc<EvmClient>,
    chain_id: u64,
    stable: TokenContract<EvmClient>,
    game: TokenContract<EvmClient>,
    store: TokenStoreContract<EvmClient>,
    matches: MatchContract<EvmClient>,
}

impl EvmWallet {
    pub fn new(config: &Config) -> Result<Self> {
        let private_key = config
            .private_key
            .as_deref()
            .ok_or_else(|| Error::Config("missing TRIX_PRIVATE_KEY".into()))?;
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|err| Error::Config(format!("invalid RPC URL: {err}")))?;
        let signer: LocalWallet = private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|err| Error::Config(format!("invalid private key: {err}")))?;
        let signer = signer.with_chain_id(config.chain_id);
        let client = Arc::new(SignerMiddleware::new(provider, signer));

        let stable = contract_address("stable token", &config.stable_token)?;
        let game = contract_address("game token", &config.game_token)?;
        let store = contract_address("token store", &config.token_store)?;
        let matches = contract_address("match contract", &config.match_contract)?;

        Ok(Self {
            stable: TokenContract::new(stable, client.clone()),
            game: TokenContract::new(game, client.clone()),
            store: TokenStoreContract::new(store, client.clone()),
            matches: MatchContract::new(matches, client.clone()),
            chain_id: config.chain_id,
            client,
        })
    }

    async fn approve(
        &self,
        token: &TokenContract<EvmClient>,
        spender: EvmAddress,
        amount: U256,
    ) -> Result<()> {
        send(token.approve(spender, amount), "approve").await?;
        Ok(())
    }
}

#[async_trait]
impl Wallet for EvmWallet {
    async fn connect(&self) -> Result<Address> {
        let chain_id = self
            .client
            .get_chainid()
            .await
            .map_err(|err| Error::Wallet(format!("failed to reach chain: {err}")))?;
        if chain_id != U256::from(self.chain_id) {
            return Err(Error::Wallet(format!(
                "wrong network: expected chain {}, got {chain_id}",
                self.chain_id
            )));
        }
        from_evm_address(self.client.address())
    }

    async fn balances(&self, account: &Address) -> Result<Balances> {
        let owner = to_evm_address(account)?;
        let stable = self
            .stable
            .balance_of(owner)
            .call()
            .await
            .map_err(|err| Error::Wallet(format!("balanceOf: {err}")))?;
        let game = self
            .game
            .balance_of(owner)
            .call()
            .await
            .map_err(|err| Error::Wallet(format!("balanceOf: {err}")))?;
        Ok(Balances {
            stable: from_u256(stable)?,
            game: from_u256(game)?,
        })
    }

    async fn mint_stable(&self, amount: TokenAmount) -> Result<()> {
        send(self.stable.mint(self.client.address(), to_u256(amount)), "mint").await?;
        Ok(())
    }

    async fn buy_game_token(&self, amount: TokenAmount) -> Result<()> {
        let amount = to_u256(amount);
        self.approve(&self.stable, self.store.address(), amount).await?;
        send(self.store.buy_tokens(amount), "buyTokens").await?;
        Ok(())
    }

    async fn create_match(&self, stake: TokenAmount) -> Result<MatchId> {
        let stake = to_u256(stake);
        self.approve(&self.game, self.matches.address(), stake).await?;
        let receipt = send(self.matches.create_match(stake), "createMatch").await?;
        match_created(&receipt, self.matches.address())
    }

    async fn join_match(&self, match_id: MatchId, stake: TokenAmount) -> Result<()> {
        self.approve(&self.game, self.matches.address(), to_u256(stake)).await?;
        send(self.matches.join_match(U256::from(match_id.0)), "joinMatch").await?;
        Ok(())
    }
}

/// Submit a transaction and wait for a successful receipt.
async fn send<D: Detokenize>(
    call: ContractCall<EvmClient, D>,
    action: &'static str,
) -> Result<TransactionReceipt> {
    let pending_tx = call
        .send()
        .await
        .map_err(|err| Error::Wallet(format!("{action}: {err}")))?;
    let tx_hash = pending_tx.tx_hash();
    debug!(action, tx_hash = %format!("{:#x}", tx_hash), "transaction submitted");
    let receipt = pending_tx
        .await
        .map_err(|err| Error::Wallet(format!("{action}: {err}")))?
        .ok_or_else(|| Error::Wallet(format!("{action}: transaction dropped")))?;
    if receipt.status == Some(U64::zero()) {
        return Err(Error::Wallet(format!(
            "{action}: transaction {:#x} reverted",
            tx_hash
        )));
    }
    info!(action, tx_hash = %format!("{:#x}", tx_hash), "transaction confirmed");
    Ok(receipt)
}

fn contract_address(name: &str, raw: &str) -> Result<EvmAddress> {
    EvmAddress::from_str(raw).map_err(|_| Error::Config(format!("invalid {name} address: {raw}")))
}

fn to_evm_address(address: &Address) -> Result<EvmAddress> {
    EvmAddress::from_str(address.as_str()).map_err(|err| Error::Wallet(err.to_string()))
}

fn from_evm_address(address: EvmAddress) -> Result<Address> {
    Ok(Address::parse(&format!("{:#x}", address))?)
}

pub(crate) fn to_u256(amount: TokenAmount) -> U256 {
    U256::from(amount.base_units())
}

pub(crate) fn from_u256(value: U256) -> Result<TokenAmount> {
    if value > U256::from(u128::MAX) {
        return Err(Error::InvalidAmount(format!("{value} exceeds supported range")));
    }
    Ok(TokenAmount::from_base_units(value.as_u128()))
}

/// Id of the match created by `receipt`, taken from its `MatchCreated` log.
fn match_created(receipt: &TransactionReceipt, contract: EvmAddress) -> Result<MatchId> {
    let event = receipt
        .logs
        .iter()
        .filter(|log| log.address == contract)
        .find_map(|log| {
            MatchCreatedFilter::decode_log(&RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            })
            .ok()
        })
        .ok_or_else(|| Error::Wallet("createMatch: no MatchCreated event in receipt".into()))?;
    if event.match_id > U256::from(u64::MAX) {
        return Err(Error::Wallet(format!(
            "createMatch: match id {} out of range",
            event.match_id
        )));
    }
    Ok(MatchId(event.match_id.as_u64()))
}
