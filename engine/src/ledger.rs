//! Virtual-coin ledger gating the recompose action.

use doppel_types::{CoinPack, STARTING_COINS, WizardError};

/// A non-negative coin balance.
///
/// The balance is a `u32` and every debit is guarded, so no operation can
/// drive it negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditLedger {
    balance: u32,
}

impl CreditLedger {
    /// Fresh ledger with the session starting bonus.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            balance: STARTING_COINS,
        }
    }

    /// Ledger opened with an explicit balance, for configured starting
    /// bonuses.
    #[must_use]
    pub const fn with_balance(balance: u32) -> Self {
        Self { balance }
    }

    #[must_use]
    pub const fn balance(&self) -> u32 {
        self.balance
    }

    /// Credit a purchased pack. Purchases always succeed immediately.
    pub fn purchase(&mut self, pack: CoinPack) {
        self.balance = self.balance.saturating_add(pack.coins());
        tracing::debug!(pack = ?pack, balance = self.balance, "Coins purchased");
    }

    /// Check whether a spend of `cost` would succeed, without mutating.
    pub fn authorize(&self, cost: u32) -> Result<(), WizardError> {
        if self.balance >= cost {
            Ok(())
        } else {
            Err(WizardError::InsufficientCredits {
                needed: cost,
                balance: self.balance,
            })
        }
    }

    /// Spend `cost` coins. On failure the balance is unchanged.
    pub fn debit(&mut self, cost: u32) -> Result<(), WizardError> {
        self.authorize(cost)?;
        self.balance -= cost;
        tracing::debug!(cost, balance = self.balance, "Coins debited");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_balance(&mut self, balance: u32) {
        self.balance = balance;
    }
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new()
    }
}
