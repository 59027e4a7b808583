//! Connected account and balances, shared as immutable snapshots.

use crate::{wallet::Wallet, Error, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use trix_types::{Account, Address, Balances, TokenAmount};

/// Process-wide session context. Cloning yields another handle to the same
/// session; readers never observe a partially updated account.
#[derive(Clone, Debug)]
pub struct SessionContext {
    sender: Arc<watch::Sender<Option<Arc<Account>>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Account>>> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> Option<Arc<Account>> {
        self.sender.borrow().clone()
    }

    pub fn address(&self) -> Option<Address> {
        self.sender
            .borrow()
            .as_ref()
            .map(|account| account.address.clone())
    }

    pub fn set(&self, account: Account) {
        debug!(account = %account.address, "session account set");
        self.sender.send_replace(Some(Arc::new(account)));
    }

    /// Replace the balances of `address` if it is still the connected
    /// account. Returns whether anything changed.
    pub fn update_balances(&self, address: &Address, balances: Balances) -> bool {
        self.sender.send_if_modified(|current| match current {
            Some(account) if &account.address == address && account.balances != balances => {
                *current = Some(Arc::new(Account {
                    address: address.clone(),
                    balances,
                }));
                true
            }
            _ => false,
        })
    }

    pub fn clear(&self) {
        self.sender.send_replace(None);
    }
}

/// Fetch the account's balances and build a fresh session account.
pub async fn load_account<W: Wallet + ?Sized>(wallet: &W, address: Address) -> Result<Account> {
    let balances = wallet.balances(&address).await?;
    Ok(Account { address, balances })
}

/// Parse a mint request. Minting only requires a positive amount.
pub fn validate_mint(amount: &str) -> Result<TokenAmount> {
    positive(amount)
}

/// Parse a game token purchase, which spends the same amount of stable
/// units.
pub fn validate_buy(amount: &str, balances: &Balances) -> Result<TokenAmount> {
    let amount = positive(amount)?;
    if balances.stable < amount {
        return Err(Error::InsufficientBalance {
            token: "stable",
            needed: amount,
            available: balances.stable,
        });
    }
    Ok(amount)
}

fn positive(amount: &str) -> Result<TokenAmount> {
    let amount = TokenAmount::parse_units(amount)?;
    if amount.is_zero() {
        return Err(Error::InvalidAmount("amount must be positive".into()));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::parse(&format!("0x{}", format!("{byte:02x}").repeat(20))).unwrap()
    }

    #[tokio::test]
    async fn test_snapshots_and_updates() {
        let session = SessionContext::new();
        let mut receiver = session.subscribe();
        assert!(session.snapshot().is_none());

        session.set(Account {
            address: addr(1),
            balances: Balances::default(),
        });
        receiver.changed().await.unwrap();
        let before = receiver.borrow_and_update().clone().unwrap();

        let balances = Balances {
            stable: TokenAmount::from_whole(3),
            game: TokenAmount::from_whole(1),
        };
        assert!(session.update_balances(&addr(1), balances));
        assert!(!session.update_balances(&addr(1), balances), "unchanged");
        assert!(!session.update_balances(&addr(2), Balances::default()), "other account");

        // Earlier snapshots are unaffected.
        assert_eq!(before.balances, Balances::default());
        assert_eq!(session.snapshot().unwrap().balances, balances);

        session.clear();
        assert!(session.address().is_none());
    }

    #[test]
    fn test_token_validation() {
        assert_eq!(validate_mint("10").unwrap(), TokenAmount::from_whole(10));
        assert!(matches!(validate_mint("0"), Err(Error::InvalidAmount(_))));
        assert!(matches!(validate_mint("ten"), Err(Error::InvalidAmount(_))));

        let balances = Balances {
            stable: TokenAmount::from_whole(2),
            game: TokenAmount::ZERO,
        };
        assert_eq!(validate_buy("2", &balances).unwrap(), TokenAmount::from_whole(2));
        assert!(matches!(
            validate_buy("2.5", &balances),
            Err(Error::InsufficientBalance { token: "stable", .. })
        ));
    }
}
