//! Command aggregates: the entry point client calls stage as durable
//! requests before anything downstream reacts to them.
//!
//! Grounded on `examples/original_source/bankaccounts/system/commands.py`.
//! A command aggregate never mutates after creation — the original's
//! `Command` base class exists only to assign an id and persist a single
//! `Created` event, so here a command is an [`Aggregate`] whose state is the
//! unit type: nothing downstream ever reads it back, only the `Created`
//! event's payload is consumed, by the `Sagas` policy.
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::event::{AggregateId, Event};
use crate::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DepositFundsCommandEvent {
    Created {
        credit_account_id: AggregateId,
        amount: Money,
    },
}

impl Event for DepositFundsCommandEvent {
    fn event_type(&self) -> String {
        "DepositFundsCommand.Created".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WithdrawFundsCommandEvent {
    Created {
        debit_account_id: AggregateId,
        amount: Money,
    },
}

impl Event for WithdrawFundsCommandEvent {
    fn event_type(&self) -> String {
        "WithdrawFundsCommand.Created".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransferFundsCommandEvent {
    Created {
        debit_account_id: AggregateId,
        credit_account_id: AggregateId,
        amount: Money,
    },
}

impl Event for TransferFundsCommandEvent {
    fn event_type(&self) -> String {
        "TransferFundsCommand.Created".to_string()
    }
}

pub type DepositFundsCommand = Aggregate<(), DepositFundsCommandEvent>;
pub type WithdrawFundsCommand = Aggregate<(), WithdrawFundsCommandEvent>;
pub type TransferFundsCommand = Aggregate<(), TransferFundsCommandEvent>;

/// Client-facing operations of the `Commands` process application (§6.3).
///
/// `Commands` has no upstream of its own — it is modeled as a
/// [`crate::process::ProcessApplication`] with nothing to drain, kept for
/// symmetry with `Sagas` and `Accounts` so it shares the same event store
/// and notification-log machinery those two consume from.
pub mod client {
    use super::*;
    use crate::error::Error;
    use crate::process::ProcessApplication;

    pub async fn deposit_funds(
        app: &ProcessApplication,
        credit_account_id: AggregateId,
        amount: Money,
    ) -> Result<AggregateId, Error> {
        let id = AggregateId::new();
        let mut command: DepositFundsCommand = Aggregate::new(id);
        command.trigger(DepositFundsCommandEvent::Created {
            credit_account_id,
            amount,
        });
        app.runtime().save(&mut command).await?;
        Ok(id)
    }

    pub async fn withdraw_funds(
        app: &ProcessApplication,
        debit_account_id: AggregateId,
        amount: Money,
    ) -> Result<AggregateId, Error> {
        let id = AggregateId::new();
        let mut command: WithdrawFundsCommand = Aggregate::new(id);
        command.trigger(WithdrawFundsCommandEvent::Created {
            debit_account_id,
            amount,
        });
        app.runtime().save(&mut command).await?;
        Ok(id)
    }

    pub async fn transfer_funds(
        app: &ProcessApplication,
        debit_account_id: AggregateId,
        credit_account_id: AggregateId,
        amount: Money,
    ) -> Result<AggregateId, Error> {
        let id = AggregateId::new();
        let mut command: TransferFundsCommand = Aggregate::new(id);
        command.trigger(TransferFundsCommandEvent::Created {
            debit_account_id,
            credit_account_id,
            amount,
        });
        app.runtime().save(&mut command).await?;
        Ok(id)
    }
}
