//! The `Accounts` process application: reacts to saga events by posting the
//! transaction each one names, and exposes the account client operations
//! (§6.3).
//!
//! Grounded on `examples/original_source/bankaccounts/system/accounts.py`.
use crate::aggregate::Aggregate;
use crate::domain::bank_account::BankAccount;
use crate::domain::sagas::DepositFundsSagaEvent;
use crate::domain::sagas::{TransferFundsSagaEvent, WithdrawFundsSagaEvent};
use crate::error::Error;
use crate::event::{AggregateId, RawEvent};
use crate::money::Money;
use crate::process::{Policy, ProcessApplication};
use crate::runtime::AggregateRuntime;

pub struct AccountsPolicy;

#[async_trait::async_trait]
impl Policy for AccountsPolicy {
    async fn handle(
        &self,
        runtime: &AggregateRuntime,
        event: &RawEvent,
    ) -> Result<Vec<RawEvent>, Error> {
        let transaction_id = event.originator_id;
        match event.topic.as_str() {
            "DepositFundsSaga.Created" => {
                let DepositFundsSagaEvent::Created {
                    credit_account_id,
                    amount,
                } = event.decode::<DepositFundsSagaEvent>()?
                else {
                    unreachable!("topic dispatch guarantees this variant");
                };
                apply_transaction(runtime, credit_account_id, amount, transaction_id).await
            }
            "WithdrawFundsSaga.Created" => {
                let WithdrawFundsSagaEvent::Created {
                    debit_account_id,
                    amount,
                } = event.decode::<WithdrawFundsSagaEvent>()?
                else {
                    unreachable!("topic dispatch guarantees this variant");
                };
                apply_transaction(runtime, debit_account_id, -amount, transaction_id).await
            }
            "TransferFundsSaga.Created" => {
                let TransferFundsSagaEvent::Created {
                    debit_account_id,
                    amount,
                    ..
                } = event.decode::<TransferFundsSagaEvent>()?
                else {
                    unreachable!("topic dispatch guarantees this variant");
                };
                apply_transaction(runtime, debit_account_id, -amount, transaction_id).await
            }
            "TransferFundsSaga.CreditAccountCreditRequired" => {
                let TransferFundsSagaEvent::CreditAccountCreditRequired {
                    credit_account_id,
                    amount,
                } = event.decode::<TransferFundsSagaEvent>()?
                else {
                    unreachable!("topic dispatch guarantees this variant");
                };
                apply_transaction(runtime, credit_account_id, amount, transaction_id).await
            }
            "TransferFundsSaga.DebitAccountRefundRequired" => {
                let TransferFundsSagaEvent::DebitAccountRefundRequired {
                    debit_account_id,
                    amount,
                    ..
                } = event.decode::<TransferFundsSagaEvent>()?
                else {
                    unreachable!("topic dispatch guarantees this variant");
                };
                apply_transaction(runtime, debit_account_id, amount, transaction_id).await
            }
            _ => Ok(vec![]),
        }
    }
}

/// Posts `amount` against `account_id`, catching any [`TransactionError`]
/// and recording it against the account instead of propagating it — a
/// domain error is never a process application failure (§4.3.3, §4.5).
async fn apply_transaction(
    runtime: &AggregateRuntime,
    account_id: AggregateId,
    amount: Money,
    transaction_id: AggregateId,
) -> Result<Vec<RawEvent>, Error> {
    let mut account: BankAccount = runtime.get(account_id).await?;
    if let Err(error) = account.append_transaction(amount, Some(transaction_id)) {
        account.record_error(error, Some(transaction_id));
    }
    account.drain_pending()
}

/// Client-facing operations of the `Accounts` process application (§6.3).
pub mod client {
    use super::*;

    pub async fn create_account(app: &ProcessApplication) -> Result<AggregateId, Error> {
        let id = AggregateId::new();
        let mut account: BankAccount = Aggregate::create(id);
        app.runtime().save(&mut account).await?;
        Ok(id)
    }

    pub async fn get_account(app: &ProcessApplication, account_id: AggregateId) -> Result<BankAccount, Error> {
        let account: BankAccount = app.runtime().get(account_id).await?;
        if account.committed_version() == 0 {
            return Err(Error::NotFound(account_id));
        }
        Ok(account)
    }

    pub async fn get_balance(app: &ProcessApplication, account_id: AggregateId) -> Result<Money, Error> {
        Ok(get_account(app, account_id).await?.state.balance)
    }

    /// Retries on concurrency conflict (re-reading the account fresh each
    /// attempt) via the execute-style single-aggregate command path, rather
    /// than a single unretried `save` — a direct client op against an
    /// existing, possibly-contended account.
    pub async fn set_overdraft_limit(
        app: &ProcessApplication,
        account_id: AggregateId,
        limit: Money,
    ) -> Result<(), Error> {
        app.runtime()
            .execute::<_, _, _>(account_id, &app.execute_config(), move |account: &mut BankAccount| {
                if account.committed_version() == 0 {
                    return Err(Error::NotFound(account_id));
                }
                account.set_overdraft_limit(limit)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_overdraft_limit(app: &ProcessApplication, account_id: AggregateId) -> Result<Money, Error> {
        Ok(get_account(app, account_id).await?.state.overdraft_limit)
    }

    pub async fn close_account(app: &ProcessApplication, account_id: AggregateId) -> Result<(), Error> {
        app.runtime()
            .execute::<_, _, _>(account_id, &app.execute_config(), move |account: &mut BankAccount| {
                if account.committed_version() == 0 {
                    return Err(Error::NotFound(account_id));
                }
                account.close();
                Ok(())
            })
            .await?;
        Ok(())
    }
}
