//! The bank account aggregate.
//!
//! Grounded on `examples/original_source/bankaccounts/domainmodel.py` and
//! `exceptions.py`: a balance, an overdraft limit, and an open/closed flag,
//! mutated only through `append_transaction`, `set_overdraft_limit`, `close`
//! and `record_error`.
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateState};
use crate::event::{AggregateId, Event};
use crate::money::Money;

/// A business-rule violation raised while applying a transaction to an
/// account. Unlike [`crate::error::Error`] this is never returned from a
/// [`crate::process::Policy`] — it is caught at the point it is raised and
/// turned into a [`BankAccountEvent::ErrorRecorded`] event (§4.5).
///
/// Equality is defined by variant and carried `account_id`, not by identity,
/// so a `TransactionError` that has round-tripped through JSON still
/// compares equal to the value that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "topic", content = "args")]
pub enum TransactionError {
    #[error("account {account_id} is closed")]
    AccountClosed { account_id: AggregateId },
    #[error("account {account_id} has insufficient funds")]
    InsufficientFunds { account_id: AggregateId },
}

impl TransactionError {
    pub fn account_id(&self) -> AggregateId {
        match self {
            TransactionError::AccountClosed { account_id }
            | TransactionError::InsufficientFunds { account_id } => *account_id,
        }
    }

    fn topic(&self) -> &'static str {
        match self {
            TransactionError::AccountClosed { .. } => "AccountClosed",
            TransactionError::InsufficientFunds { .. } => "InsufficientFunds",
        }
    }
}

impl PartialEq for TransactionError {
    fn eq(&self, other: &Self) -> bool {
        self.topic() == other.topic() && self.account_id() == other.account_id()
    }
}

impl Eq for TransactionError {}

/// Events raised against a bank account stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BankAccountEvent {
    /// Marks the stream as an existing account with a zero balance,
    /// distinguishing "account with no activity yet" from "no such
    /// account" (§3.6).
    Created,
    TransactionAppended {
        amount: Money,
        transaction_id: Option<AggregateId>,
    },
    OverdraftLimitSet {
        limit: Money,
    },
    Closed,
    /// Records a [`TransactionError`] without mutating the balance. Carries
    /// the same `transaction_id` the rejected transaction would have, so a
    /// saga watching this account can find its way back to the originating
    /// saga (§4.6).
    ErrorRecorded {
        error: TransactionError,
        transaction_id: Option<AggregateId>,
    },
}

impl Event for BankAccountEvent {
    fn event_type(&self) -> String {
        match self {
            BankAccountEvent::Created => "BankAccount.Created",
            BankAccountEvent::TransactionAppended { .. } => "BankAccount.TransactionAppended",
            BankAccountEvent::OverdraftLimitSet { .. } => "BankAccount.OverdraftLimitSet",
            BankAccountEvent::Closed => "BankAccount.Closed",
            BankAccountEvent::ErrorRecorded { .. } => "BankAccount.ErrorRecorded",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BankAccountState {
    pub balance: Money,
    pub overdraft_limit: Money,
    pub is_closed: bool,
}

impl AggregateState<BankAccountEvent> for BankAccountState {
    fn apply(&self, event: &BankAccountEvent) -> Self {
        match event {
            BankAccountEvent::Created => self.clone(),
            BankAccountEvent::TransactionAppended { amount, .. } => BankAccountState {
                balance: self.balance + *amount,
                ..self.clone()
            },
            BankAccountEvent::OverdraftLimitSet { limit } => BankAccountState {
                overdraft_limit: *limit,
                ..self.clone()
            },
            BankAccountEvent::Closed => BankAccountState {
                is_closed: true,
                ..self.clone()
            },
            BankAccountEvent::ErrorRecorded { .. } => self.clone(),
        }
    }
}

pub type BankAccount = Aggregate<BankAccountState, BankAccountEvent>;

impl Aggregate<BankAccountState, BankAccountEvent> {
    /// Creates a brand-new account stream with a zero balance.
    pub fn create(id: AggregateId) -> Self {
        let mut account = Aggregate::new(id);
        account.trigger(BankAccountEvent::Created);
        account
    }

    /// Appends a signed transaction to the account, rejecting it (without
    /// staging any event) if the account is closed or the resulting balance
    /// would fall below `-overdraft_limit`.
    pub fn append_transaction(
        &mut self,
        amount: Money,
        transaction_id: Option<AggregateId>,
    ) -> Result<(), TransactionError> {
        if self.state.is_closed {
            return Err(TransactionError::AccountClosed {
                account_id: self.id,
            });
        }
        if self.state.balance + amount < -self.state.overdraft_limit {
            return Err(TransactionError::InsufficientFunds {
                account_id: self.id,
            });
        }
        self.trigger(BankAccountEvent::TransactionAppended {
            amount,
            transaction_id,
        });
        Ok(())
    }

    /// Sets the overdraft limit. `limit` must be strictly positive — this is
    /// a programmer contract, not a domain error, and a violation panics.
    pub fn set_overdraft_limit(&mut self, limit: Money) -> Result<(), TransactionError> {
        assert!(limit.is_positive(), "overdraft limit must be positive");
        if self.state.is_closed {
            return Err(TransactionError::AccountClosed {
                account_id: self.id,
            });
        }
        self.trigger(BankAccountEvent::OverdraftLimitSet { limit });
        Ok(())
    }

    /// Closes the account. Idempotent: closing an already-closed account
    /// stages another `Closed` event but leaves `is_closed` unchanged.
    pub fn close(&mut self) {
        self.trigger(BankAccountEvent::Closed);
    }

    pub fn record_error(&mut self, error: TransactionError, transaction_id: Option<AggregateId>) {
        self.trigger(BankAccountEvent::ErrorRecorded {
            error,
            transaction_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn deposits_increase_balance() {
        let mut account: BankAccount = Aggregate::new(AggregateId::new());
        account.append_transaction(cents(20_000), None).unwrap();
        assert_eq!(account.state.balance, cents(20_000));
    }

    #[test]
    fn withdrawals_beyond_overdraft_are_rejected() {
        let mut account: BankAccount = Aggregate::new(AggregateId::new());
        account.set_overdraft_limit(cents(5_000)).unwrap();
        let version_before = account.version();
        let err = account.append_transaction(cents(-5_001), None).unwrap_err();
        assert!(matches!(err, TransactionError::InsufficientFunds { .. }));
        assert_eq!(account.version(), version_before, "a rejected transaction stages nothing");
    }

    #[test]
    fn closed_accounts_reject_transactions() {
        let mut account: BankAccount = Aggregate::new(AggregateId::new());
        account.close();
        let err = account.append_transaction(cents(100), None).unwrap_err();
        assert!(matches!(err, TransactionError::AccountClosed { .. }));
    }

    #[test]
    fn transaction_errors_survive_serialization_round_trip() {
        let original = TransactionError::AccountClosed {
            account_id: AggregateId::new(),
        };
        let encoded = serde_json::to_value(&original).unwrap();
        let decoded: TransactionError = serde_json::from_value(encoded).unwrap();
        assert_eq!(original, decoded);
    }
}
