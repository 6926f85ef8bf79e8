//! Saga aggregates and the `Sagas` process application.
//!
//! Grounded on `examples/original_source/bankaccounts/system/sagas.py`. A
//! saga tracks one command's outcome across one or more bank account
//! transactions, recording whether it has succeeded, errored, or (for a
//! transfer) needs to run its compensating refund leg (§4.6).
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateState};
use crate::domain::bank_account::{BankAccountEvent, TransactionError};
use crate::domain::commands::{
    DepositFundsCommandEvent, TransferFundsCommandEvent, WithdrawFundsCommandEvent,
};
use crate::error::Error;
use crate::event::{AggregateId, Event, RawEvent};
use crate::money::Money;
use crate::process::{Policy, ProcessApplication};
use crate::runtime::AggregateRuntime;

/// Bookkeeping shared by every saga kind: whether it has reached a terminal
/// state, and every domain error recorded against it along the way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaOutcome {
    pub has_succeeded: bool,
    pub has_errored: bool,
    pub errors: Vec<TransactionError>,
}

impl SagaOutcome {
    fn succeed(&mut self) {
        self.has_succeeded = true;
    }

    fn error(&mut self, error: Option<TransactionError>) {
        self.has_errored = true;
        if let Some(error) = error {
            self.errors.push(error);
        }
    }
}

// ---------------------------------------------------------------------
// DepositFundsSaga
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DepositFundsSagaEvent {
    Created {
        credit_account_id: AggregateId,
        amount: Money,
    },
    Succeeded,
    Errored {
        error: Option<TransactionError>,
    },
}

impl Event for DepositFundsSagaEvent {
    fn event_type(&self) -> String {
        match self {
            DepositFundsSagaEvent::Created { .. } => "DepositFundsSaga.Created",
            DepositFundsSagaEvent::Succeeded => "DepositFundsSaga.Succeeded",
            DepositFundsSagaEvent::Errored { .. } => "DepositFundsSaga.Errored",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DepositFundsSagaState {
    pub credit_account_id: Option<AggregateId>,
    pub amount: Money,
    pub outcome: SagaOutcome,
}

impl AggregateState<DepositFundsSagaEvent> for DepositFundsSagaState {
    fn apply(&self, event: &DepositFundsSagaEvent) -> Self {
        let mut next = self.clone();
        match event {
            DepositFundsSagaEvent::Created {
                credit_account_id,
                amount,
            } => {
                next.credit_account_id = Some(*credit_account_id);
                next.amount = *amount;
            }
            DepositFundsSagaEvent::Succeeded => next.outcome.succeed(),
            DepositFundsSagaEvent::Errored { error } => next.outcome.error(error.clone()),
        }
        next
    }
}

pub type DepositFundsSaga = Aggregate<DepositFundsSagaState, DepositFundsSagaEvent>;

impl Aggregate<DepositFundsSagaState, DepositFundsSagaEvent> {
    pub fn on_bank_account_transaction_appended(&mut self) {
        self.trigger(DepositFundsSagaEvent::Succeeded);
    }

    pub fn on_bank_account_error_recorded(&mut self, error: TransactionError) {
        self.trigger(DepositFundsSagaEvent::Errored { error: Some(error) });
    }
}

// ---------------------------------------------------------------------
// WithdrawFundsSaga
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WithdrawFundsSagaEvent {
    Created {
        debit_account_id: AggregateId,
        amount: Money,
    },
    Succeeded,
    Errored {
        error: Option<TransactionError>,
    },
}

impl Event for WithdrawFundsSagaEvent {
    fn event_type(&self) -> String {
        match self {
            WithdrawFundsSagaEvent::Created { .. } => "WithdrawFundsSaga.Created",
            WithdrawFundsSagaEvent::Succeeded => "WithdrawFundsSaga.Succeeded",
            WithdrawFundsSagaEvent::Errored { .. } => "WithdrawFundsSaga.Errored",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct WithdrawFundsSagaState {
    pub debit_account_id: Option<AggregateId>,
    pub amount: Money,
    pub outcome: SagaOutcome,
}

impl AggregateState<WithdrawFundsSagaEvent> for WithdrawFundsSagaState {
    fn apply(&self, event: &WithdrawFundsSagaEvent) -> Self {
        let mut next = self.clone();
        match event {
            WithdrawFundsSagaEvent::Created {
                debit_account_id,
                amount,
            } => {
                next.debit_account_id = Some(*debit_account_id);
                next.amount = *amount;
            }
            WithdrawFundsSagaEvent::Succeeded => next.outcome.succeed(),
            WithdrawFundsSagaEvent::Errored { error } => next.outcome.error(error.clone()),
        }
        next
    }
}

pub type WithdrawFundsSaga = Aggregate<WithdrawFundsSagaState, WithdrawFundsSagaEvent>;

impl Aggregate<WithdrawFundsSagaState, WithdrawFundsSagaEvent> {
    pub fn on_bank_account_transaction_appended(&mut self) {
        self.trigger(WithdrawFundsSagaEvent::Succeeded);
    }

    pub fn on_bank_account_error_recorded(&mut self, error: TransactionError) {
        self.trigger(WithdrawFundsSagaEvent::Errored { error: Some(error) });
    }
}

// ---------------------------------------------------------------------
// TransferFundsSaga
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransferFundsSagaEvent {
    Created {
        debit_account_id: AggregateId,
        credit_account_id: AggregateId,
        amount: Money,
    },
    /// Raised once the debit leg has posted; carries the payload the
    /// `Accounts` policy needs to credit the other account, since the event
    /// is all that policy ever sees (§9, tagged-variant dispatch).
    CreditAccountCreditRequired {
        credit_account_id: AggregateId,
        amount: Money,
    },
    /// Raised once the credit leg has errored, to compensate by refunding
    /// the debit leg.
    DebitAccountRefundRequired {
        debit_account_id: AggregateId,
        amount: Money,
        credit_account_error: TransactionError,
    },
    Succeeded,
    /// Terminal error state. Carries no payload even though the credit
    /// leg's error is already recorded in `outcome.errors` by the preceding
    /// `DebitAccountRefundRequired` — the refund-path error is attributed to
    /// the leg that actually failed, not duplicated onto the terminal event.
    Errored {
        error: Option<TransactionError>,
    },
}

impl Event for TransferFundsSagaEvent {
    fn event_type(&self) -> String {
        match self {
            TransferFundsSagaEvent::Created { .. } => "TransferFundsSaga.Created",
            TransferFundsSagaEvent::CreditAccountCreditRequired { .. } => {
                "TransferFundsSaga.CreditAccountCreditRequired"
            }
            TransferFundsSagaEvent::DebitAccountRefundRequired { .. } => {
                "TransferFundsSaga.DebitAccountRefundRequired"
            }
            TransferFundsSagaEvent::Succeeded => "TransferFundsSaga.Succeeded",
            TransferFundsSagaEvent::Errored { .. } => "TransferFundsSaga.Errored",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferFundsSagaState {
    pub debit_account_id: Option<AggregateId>,
    pub credit_account_id: Option<AggregateId>,
    pub amount: Money,
    pub has_debit_account_debited: bool,
    pub outcome: SagaOutcome,
}

impl AggregateState<TransferFundsSagaEvent> for TransferFundsSagaState {
    fn apply(&self, event: &TransferFundsSagaEvent) -> Self {
        let mut next = self.clone();
        match event {
            TransferFundsSagaEvent::Created {
                debit_account_id,
                credit_account_id,
                amount,
            } => {
                next.debit_account_id = Some(*debit_account_id);
                next.credit_account_id = Some(*credit_account_id);
                next.amount = *amount;
            }
            TransferFundsSagaEvent::CreditAccountCreditRequired { .. } => {
                next.has_debit_account_debited = true;
            }
            TransferFundsSagaEvent::DebitAccountRefundRequired {
                credit_account_error,
                ..
            } => {
                next.outcome.errors.push(credit_account_error.clone());
            }
            TransferFundsSagaEvent::Succeeded => next.outcome.succeed(),
            TransferFundsSagaEvent::Errored { error } => next.outcome.error(error.clone()),
        }
        next
    }
}

pub type TransferFundsSaga = Aggregate<TransferFundsSagaState, TransferFundsSagaEvent>;

impl Aggregate<TransferFundsSagaState, TransferFundsSagaEvent> {
    /// §4.6.1's transition table for `TransactionAppended`: S0 -> S1 when
    /// the debit leg posts, S1 -> Done{success} when the credit leg posts,
    /// S2 -> Done{error} when the compensating refund posts.
    pub fn on_bank_account_transaction_appended(&mut self, originator_id: AggregateId, amount: Money) {
        let debit_id = self.state.debit_account_id;
        let credit_id = self.state.credit_account_id;

        if !self.state.has_debit_account_debited
            && Some(originator_id) == debit_id
            && amount == -self.state.amount
        {
            self.trigger(TransferFundsSagaEvent::CreditAccountCreditRequired {
                credit_account_id: credit_id.expect("saga created before any transaction arrives"),
                amount: self.state.amount,
            });
        } else if self.state.has_debit_account_debited
            && Some(originator_id) == credit_id
            && amount == self.state.amount
        {
            self.trigger(TransferFundsSagaEvent::Succeeded);
        } else if self.state.has_debit_account_debited
            && Some(originator_id) == debit_id
            && amount == self.state.amount
        {
            self.trigger(TransferFundsSagaEvent::Errored { error: None });
        }
    }

    /// §4.6.1's transition table for `ErrorRecorded`: an error on the debit
    /// leg before it has posted ends the saga directly; an error on the
    /// credit leg requires refunding the debit leg (S1 -> S2).
    pub fn on_bank_account_error_recorded(&mut self, originator_id: AggregateId, error: TransactionError) {
        if Some(originator_id) == self.state.debit_account_id {
            self.trigger(TransferFundsSagaEvent::Errored {
                error: Some(error),
            });
        } else if Some(originator_id) == self.state.credit_account_id {
            self.trigger(TransferFundsSagaEvent::DebitAccountRefundRequired {
                debit_account_id: self
                    .state
                    .debit_account_id
                    .expect("saga created before any error arrives"),
                amount: self.state.amount,
                credit_account_error: error,
            });
        }
    }
}

// ---------------------------------------------------------------------
// The typed registry over saga streams
// ---------------------------------------------------------------------

/// A loaded saga of unknown kind, recovered by inspecting its stream's
/// `Created` event topic — the "typed registry per stream kind" design note
/// (§9): since `Sagas` must route a bare `transaction_id` back to the right
/// saga type without being told which kind it is, the kind has to be
/// recoverable from the stream itself.
pub enum Saga {
    Deposit(DepositFundsSaga),
    Withdraw(WithdrawFundsSaga),
    Transfer(TransferFundsSaga),
}

impl Saga {
    pub async fn load(runtime: &AggregateRuntime, id: AggregateId) -> Result<Self, Error> {
        let raw = runtime.store().load(id).await?;
        match raw.first().map(|event| event.topic.as_str()) {
            Some("DepositFundsSaga.Created") => Ok(Saga::Deposit(Aggregate::replay(
                id,
                decode_all::<DepositFundsSagaEvent>(&raw)?,
            ))),
            Some("WithdrawFundsSaga.Created") => Ok(Saga::Withdraw(Aggregate::replay(
                id,
                decode_all::<WithdrawFundsSagaEvent>(&raw)?,
            ))),
            Some("TransferFundsSaga.Created") => Ok(Saga::Transfer(Aggregate::replay(
                id,
                decode_all::<TransferFundsSagaEvent>(&raw)?,
            ))),
            _ => Err(Error::NotFound(id)),
        }
    }

    pub fn drain_pending(&mut self) -> Result<Vec<RawEvent>, Error> {
        match self {
            Saga::Deposit(saga) => saga.drain_pending(),
            Saga::Withdraw(saga) => saga.drain_pending(),
            Saga::Transfer(saga) => saga.drain_pending(),
        }
    }

    pub fn outcome(&self) -> &SagaOutcome {
        match self {
            Saga::Deposit(saga) => &saga.state.outcome,
            Saga::Withdraw(saga) => &saga.state.outcome,
            Saga::Transfer(saga) => &saga.state.outcome,
        }
    }
}

fn decode_all<E: Event>(raw: &[RawEvent]) -> Result<Vec<E>, Error> {
    raw.iter().map(|event| event.decode::<E>()).collect()
}

/// Client-facing operations of the `Sagas` process application (§6.3).
pub mod client {
    use super::*;

    /// Returns the current state of the saga started for `transaction_id`,
    /// regardless of which command kind started it.
    pub async fn get_saga(app: &ProcessApplication, transaction_id: AggregateId) -> Result<Saga, Error> {
        Saga::load(&app.runtime(), transaction_id).await
    }
}

// ---------------------------------------------------------------------
// The Sagas process application
// ---------------------------------------------------------------------

/// Reacts to `Commands.*.Created` by starting a saga, and to
/// `BankAccount.TransactionAppended` / `BankAccount.ErrorRecorded` by
/// advancing whatever saga the event's `transaction_id` names. Subscribes to
/// both `Commands` and `Accounts` in the pipeline (§6.2).
pub struct SagasPolicy;

#[async_trait::async_trait]
impl Policy for SagasPolicy {
    async fn handle(
        &self,
        runtime: &AggregateRuntime,
        event: &RawEvent,
    ) -> Result<Vec<RawEvent>, Error> {
        match event.topic.as_str() {
            "DepositFundsCommand.Created" => {
                let DepositFundsCommandEvent::Created {
                    credit_account_id,
                    amount,
                } = event.decode::<DepositFundsCommandEvent>()?;
                let mut saga: DepositFundsSaga = Aggregate::new(event.originator_id);
                saga.trigger(DepositFundsSagaEvent::Created {
                    credit_account_id,
                    amount,
                });
                saga.drain_pending()
            }
            "WithdrawFundsCommand.Created" => {
                let WithdrawFundsCommandEvent::Created {
                    debit_account_id,
                    amount,
                } = event.decode::<WithdrawFundsCommandEvent>()?;
                let mut saga: WithdrawFundsSaga = Aggregate::new(event.originator_id);
                saga.trigger(WithdrawFundsSagaEvent::Created {
                    debit_account_id,
                    amount,
                });
                saga.drain_pending()
            }
            "TransferFundsCommand.Created" => {
                let TransferFundsCommandEvent::Created {
                    debit_account_id,
                    credit_account_id,
                    amount,
                } = event.decode::<TransferFundsCommandEvent>()?;
                let mut saga: TransferFundsSaga = Aggregate::new(event.originator_id);
                saga.trigger(TransferFundsSagaEvent::Created {
                    debit_account_id,
                    credit_account_id,
                    amount,
                });
                saga.drain_pending()
            }
            "BankAccount.TransactionAppended" => {
                let BankAccountEvent::TransactionAppended {
                    amount,
                    transaction_id,
                } = event.decode::<BankAccountEvent>()?
                else {
                    unreachable!("topic dispatch guarantees this variant");
                };
                let Some(transaction_id) = transaction_id else {
                    return Ok(vec![]);
                };
                let mut saga = Saga::load(runtime, transaction_id).await?;
                match &mut saga {
                    Saga::Deposit(s) => s.on_bank_account_transaction_appended(),
                    Saga::Withdraw(s) => s.on_bank_account_transaction_appended(),
                    Saga::Transfer(s) => {
                        s.on_bank_account_transaction_appended(event.originator_id, amount)
                    }
                }
                saga.drain_pending()
            }
            "BankAccount.ErrorRecorded" => {
                let BankAccountEvent::ErrorRecorded {
                    error,
                    transaction_id,
                } = event.decode::<BankAccountEvent>()?
                else {
                    unreachable!("topic dispatch guarantees this variant");
                };
                let Some(transaction_id) = transaction_id else {
                    return Ok(vec![]);
                };
                let mut saga = Saga::load(runtime, transaction_id).await?;
                match &mut saga {
                    Saga::Deposit(s) => s.on_bank_account_error_recorded(error),
                    Saga::Withdraw(s) => s.on_bank_account_error_recorded(error),
                    Saga::Transfer(s) => {
                        s.on_bank_account_error_recorded(event.originator_id, error)
                    }
                }
                saga.drain_pending()
            }
            _ => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEventStore;
    use std::sync::Arc;

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn transfer_saga_debit_then_credit_succeeds() {
        let debit_id = AggregateId::new();
        let credit_id = AggregateId::new();
        let mut saga: TransferFundsSaga = Aggregate::new(AggregateId::new());
        saga.trigger(TransferFundsSagaEvent::Created {
            debit_account_id: debit_id,
            credit_account_id: credit_id,
            amount: cents(10_000),
        });

        saga.on_bank_account_transaction_appended(debit_id, cents(-10_000));
        assert!(saga.state.has_debit_account_debited);
        assert!(!saga.state.outcome.has_succeeded);

        saga.on_bank_account_transaction_appended(credit_id, cents(10_000));
        assert!(saga.state.outcome.has_succeeded);
    }

    #[test]
    fn transfer_saga_credit_leg_error_triggers_refund_then_errors() {
        let debit_id = AggregateId::new();
        let credit_id = AggregateId::new();
        let mut saga: TransferFundsSaga = Aggregate::new(AggregateId::new());
        saga.trigger(TransferFundsSagaEvent::Created {
            debit_account_id: debit_id,
            credit_account_id: credit_id,
            amount: cents(10_000),
        });
        saga.on_bank_account_transaction_appended(debit_id, cents(-10_000));

        let error = TransactionError::AccountClosed {
            account_id: credit_id,
        };
        saga.on_bank_account_error_recorded(credit_id, error.clone());
        assert_eq!(saga.state.outcome.errors, vec![error]);
        assert!(!saga.state.outcome.has_errored);

        saga.on_bank_account_transaction_appended(debit_id, cents(10_000));
        assert!(saga.state.outcome.has_errored);
        assert!(!saga.state.outcome.has_succeeded);
    }

    #[test]
    fn transfer_saga_debit_leg_error_ends_immediately() {
        let debit_id = AggregateId::new();
        let credit_id = AggregateId::new();
        let mut saga: TransferFundsSaga = Aggregate::new(AggregateId::new());
        saga.trigger(TransferFundsSagaEvent::Created {
            debit_account_id: debit_id,
            credit_account_id: credit_id,
            amount: cents(10_000),
        });

        let error = TransactionError::InsufficientFunds {
            account_id: debit_id,
        };
        saga.on_bank_account_error_recorded(debit_id, error);
        assert!(saga.state.outcome.has_errored);
        assert!(!saga.state.has_debit_account_debited);
    }

    #[tokio::test]
    async fn policy_starts_a_deposit_saga_from_a_command_created_event() {
        let store: Arc<InMemoryEventStore> = Arc::new(InMemoryEventStore::new());
        let runtime = AggregateRuntime::new(store.clone());
        let credit_account_id = AggregateId::new();
        let command_id = AggregateId::new();
        let raw = RawEvent::encode(
            command_id,
            0,
            chrono::Utc::now(),
            &DepositFundsCommandEvent::Created {
                credit_account_id,
                amount: cents(5_000),
            },
        )
        .unwrap();

        let staged = SagasPolicy.handle(&runtime, &raw).await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].topic, "DepositFundsSaga.Created");
        assert_eq!(staged[0].originator_id, command_id);
    }
}
