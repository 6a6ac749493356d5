//! In-process ledger with deterministic hashes and failure injection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::transaction::keccak256;
use super::{BookingRef, LedgerCall, LedgerError, Receipt, Signer, TxHash};
use crate::domain::{WalletAddress, Wei};

/// Funds held in escrow for one booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holding {
    /// Account that deposited.
    pub payer: WalletAddress,
    /// Agent the funds are released to.
    pub agent: WalletAddress,
    /// Amount held.
    pub value: Wei,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<WalletAddress, Wei>,
    holdings: HashMap<BookingRef, Holding>,
    receipts: HashMap<TxHash, Receipt>,
    calls: Vec<LedgerCall>,
    fail_next_submit: Option<LedgerError>,
    revert_next: bool,
    block: u64,
}

impl LedgerState {
    fn debit(&mut self, account: WalletAddress, value: Wei) -> Result<(), LedgerError> {
        let available = self.balances.get(&account).copied().unwrap_or_default();
        let remaining = available
            .checked_sub(value)
            .ok_or(LedgerError::InsufficientFunds { needed: value, available })?;
        self.balances.insert(account, remaining);
        Ok(())
    }

    fn credit(&mut self, account: WalletAddress, value: Wei) -> Result<(), LedgerError> {
        let current = self.balances.get(&account).copied().unwrap_or_default();
        let updated = current
            .checked_add(value)
            .ok_or_else(|| LedgerError::Rejected(format!("balance overflow for {account}")))?;
        self.balances.insert(account, updated);
        Ok(())
    }

    fn apply(&mut self, sender: WalletAddress, call: &LedgerCall) -> Result<(), LedgerError> {
        match call {
            LedgerCall::Deposit { booking, agent, value } => {
                if self.holdings.contains_key(booking) {
                    return Err(LedgerError::Rejected(format!("booking {booking} already funded")));
                }
                self.debit(sender, *value)?;
                self.holdings.insert(
                    *booking,
                    Holding {
                        payer: sender,
                        agent: *agent,
                        value: *value,
                    },
                );
            }
            LedgerCall::Release { booking } => {
                let holding = self
                    .holdings
                    .remove(booking)
                    .ok_or_else(|| LedgerError::UnknownBooking(booking.to_string()))?;
                self.credit(holding.agent, holding.value)?;
            }
            LedgerCall::Refund { booking } => {
                let holding = self
                    .holdings
                    .remove(booking)
                    .ok_or_else(|| LedgerError::UnknownBooking(booking.to_string()))?;
                self.credit(holding.payer, holding.value)?;
            }
            LedgerCall::Transfer { to, value } => {
                self.debit(sender, *value)?;
                self.credit(*to, *value)?;
            }
        }
        Ok(())
    }
}

/// A [`Signer`] over a shared in-memory ledger.
///
/// Clones share state. [`InMemoryLedger::as_account`] returns a handle
/// signing as a different account on the same ledger, so a customer
/// wallet and the escrow wallet can be modelled side by side.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    address: WalletAddress,
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger signing as `address`.
    #[must_use]
    pub fn new(address: WalletAddress) -> Self {
        Self {
            address,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    /// Handle on the same ledger signing as `address`.
    #[must_use]
    pub fn as_account(&self, address: WalletAddress) -> Self {
        Self {
            address,
            state: Arc::clone(&self.state),
        }
    }

    /// Adds `value` to `account`'s balance.
    pub async fn fund(&self, account: WalletAddress, value: Wei) {
        let mut state = self.state.lock().await;
        let current = state.balances.get(&account).copied().unwrap_or_default();
        state
            .balances
            .insert(account, current.checked_add(value).unwrap_or(Wei(u128::MAX)));
    }

    /// Current balance of `account`.
    pub async fn balance_of(&self, account: &WalletAddress) -> Wei {
        self.state
            .lock()
            .await
            .balances
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    /// Funds held for `booking`, if any.
    pub async fn holding(&self, booking: BookingRef) -> Option<Holding> {
        self.state.lock().await.holdings.get(&booking).copied()
    }

    /// Every call submitted so far, including rejected ones.
    pub async fn calls(&self) -> Vec<LedgerCall> {
        self.state.lock().await.calls.clone()
    }

    /// Makes the next `submit` fail with `error`.
    pub async fn fail_next_submit(&self, error: LedgerError) {
        self.state.lock().await.fail_next_submit = Some(error);
    }

    /// Makes the next submitted transaction mine as reverted.
    pub async fn revert_next(&self) {
        self.state.lock().await.revert_next = true;
    }
}

#[async_trait]
impl Signer for InMemoryLedger {
    fn address(&self) -> WalletAddress {
        self.address
    }

    async fn submit(&self, call: LedgerCall) -> Result<TxHash, LedgerError> {
        let mut state = self.state.lock().await;
        state.calls.push(call.clone());

        if let Some(error) = state.fail_next_submit.take() {
            tracing::debug!(kind = call.kind(), %error, "injected submit failure");
            return Err(error);
        }

        state.block = state.block.saturating_add(1);
        let block = state.block;
        let mut preimage = block.to_be_bytes().to_vec();
        preimage.extend_from_slice(self.address.as_bytes());
        let tx_hash = TxHash::from_bytes(keccak256(&preimage));

        let success = if std::mem::take(&mut state.revert_next) {
            false
        } else {
            state.apply(self.address, &call)?;
            true
        };

        state.receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                block_number: Some(block),
                success,
            },
        );
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
        self.state
            .lock()
            .await
            .receipts
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| LedgerError::ConfirmationTimeout(tx_hash.to_string()))
    }

    async fn escrow_balance(&self) -> Result<Wei, LedgerError> {
        let state = self.state.lock().await;
        state
            .holdings
            .values()
            .try_fold(Wei::ZERO, |acc, holding| acc.checked_add(holding.value))
            .ok_or_else(|| LedgerError::Encoding("escrow balance overflow".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ledger::submit_and_confirm;

    const CUSTOMER: WalletAddress = WalletAddress::from_bytes([1; 20]);
    const AGENT: WalletAddress = WalletAddress::from_bytes([2; 20]);

    #[tokio::test]
    async fn deposit_then_release_pays_agent() {
        let ledger = InMemoryLedger::new(CUSTOMER);
        ledger.fund(CUSTOMER, Wei(100)).await;
        let booking = BookingRef::new(9);

        let deposit = LedgerCall::Deposit {
            booking,
            agent: AGENT,
            value: Wei(60),
        };
        let Ok(_) = submit_and_confirm(&ledger, deposit).await else {
            panic!("deposit must confirm");
        };
        assert_eq!(ledger.balance_of(&CUSTOMER).await, Wei(40));
        assert_eq!(ledger.escrow_balance().await, Ok(Wei(60)));

        let Ok(_) = submit_and_confirm(&ledger, LedgerCall::Release { booking }).await else {
            panic!("release must confirm");
        };
        assert_eq!(ledger.balance_of(&AGENT).await, Wei(60));
        assert_eq!(ledger.escrow_balance().await, Ok(Wei::ZERO));
    }

    #[tokio::test]
    async fn refund_returns_to_payer_and_cannot_repeat() {
        let ledger = InMemoryLedger::new(CUSTOMER);
        ledger.fund(CUSTOMER, Wei(10)).await;
        let booking = BookingRef::new(1);
        let Ok(_) = submit_and_confirm(
            &ledger,
            LedgerCall::Deposit {
                booking,
                agent: AGENT,
                value: Wei(10),
            },
        )
        .await
        else {
            panic!("deposit must confirm");
        };

        let Ok(_) = submit_and_confirm(&ledger, LedgerCall::Refund { booking }).await else {
            panic!("refund must confirm");
        };
        assert_eq!(ledger.balance_of(&CUSTOMER).await, Wei(10));

        let second = submit_and_confirm(&ledger, LedgerCall::Refund { booking }).await;
        assert!(matches!(second, Err(LedgerError::UnknownBooking(_))));
    }

    #[tokio::test]
    async fn insufficient_funds_are_rejected() {
        let ledger = InMemoryLedger::new(CUSTOMER);
        let result = ledger
            .submit(LedgerCall::Transfer {
                to: AGENT,
                value: Wei(1),
            })
            .await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
    }

    #[tokio::test]
    async fn injected_failures_leave_balances_untouched() {
        let ledger = InMemoryLedger::new(CUSTOMER);
        ledger.fund(CUSTOMER, Wei(5)).await;
        let transfer = LedgerCall::Transfer {
            to: AGENT,
            value: Wei(5),
        };

        ledger.fail_next_submit(LedgerError::Rejected("user denied".to_string())).await;
        assert!(ledger.submit(transfer.clone()).await.is_err());

        ledger.revert_next().await;
        let reverted = submit_and_confirm(&ledger, transfer.clone()).await;
        assert!(matches!(reverted, Err(LedgerError::Reverted(_))));
        assert_eq!(ledger.balance_of(&CUSTOMER).await, Wei(5));

        assert!(submit_and_confirm(&ledger, transfer).await.is_ok());
        assert_eq!(ledger.balance_of(&AGENT).await, Wei(5));
        assert_eq!(ledger.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn accounts_share_one_ledger() {
        let customer = InMemoryLedger::new(CUSTOMER);
        let escrow = customer.as_account(AGENT);
        customer.fund(AGENT, Wei(3)).await;
        assert_eq!(escrow.balance_of(&AGENT).await, Wei(3));
        assert_eq!(escrow.address(), AGENT);
    }
}
