//! Wires `Commands -> Sagas -> Accounts -> Sagas` into one running system
//! (§6.2), grounded on
//! `examples/original_source/bankaccounts/system/definition.py`'s
//! `Commands | Sagas | Accounts | Sagas` pipe notation.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::accounts_app::AccountsPolicy;
use crate::domain::sagas::SagasPolicy;
use crate::error::Error;
use crate::process::{ProcessApplication, RunConfig, Upstream};
use crate::store::{EventStoreBackend, InMemoryEventStore};

/// The three process applications of the bank account system, wired
/// together: `Sagas` consumes from both `Commands` and `Accounts`;
/// `Accounts` consumes from `Sagas`.
pub struct System {
    pub commands: ProcessApplication,
    pub sagas: ProcessApplication,
    pub accounts: ProcessApplication,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl System {
    /// Builds a system backed by three independent in-memory stores — one
    /// per process application, matching §4.1's "each application owns its
    /// own notification log".
    pub fn new() -> Self {
        Self::with_config(RunConfig::default())
    }

    pub fn with_config(config: RunConfig) -> Self {
        Self {
            commands: ProcessApplication::new(
                "Commands",
                Arc::new(InMemoryEventStore::new()),
                config.clone(),
            ),
            sagas: ProcessApplication::new(
                "Sagas",
                Arc::new(InMemoryEventStore::new()),
                config.clone(),
            ),
            accounts: ProcessApplication::new(
                "Accounts",
                Arc::new(InMemoryEventStore::new()),
                config,
            ),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Looks up one of the system's applications by name, for dispatch by
    /// configuration or test harnesses.
    pub fn get(&self, application_name: &str) -> Option<&ProcessApplication> {
        match application_name {
            "Commands" => Some(&self.commands),
            "Sagas" => Some(&self.sagas),
            "Accounts" => Some(&self.accounts),
            _ => None,
        }
    }

    /// Drains every pending notification through the pipeline once,
    /// repeating until a full pass produces no further work — the
    /// cooperative single-thread dispatcher of §5.3, useful for tests and
    /// for driving the system to quiescence deterministically.
    pub async fn pump(&self) -> Result<usize, Error> {
        let mut total = 0;
        loop {
            let from_commands = self
                .sagas
                .drain_upstream(
                    &Upstream::new("Commands", self.commands.store().clone()),
                    &SagasPolicy,
                )
                .await?;
            let from_sagas = self
                .accounts
                .drain_upstream(
                    &Upstream::new("Sagas", self.sagas.store().clone()),
                    &AccountsPolicy,
                )
                .await?;
            let from_accounts = self
                .sagas
                .drain_upstream(
                    &Upstream::new("Accounts", self.accounts.store().clone()),
                    &SagasPolicy,
                )
                .await?;

            let advanced = from_commands + from_sagas + from_accounts;
            total += advanced;
            if advanced == 0 {
                return Ok(total);
            }
        }
    }

    /// Starts a background task that calls [`System::pump`] on a fixed
    /// interval, for a system meant to run continuously rather than be
    /// pumped by its caller. Returns immediately; call [`System::close`] to
    /// stop it.
    pub fn start(self: &Arc<Self>, poll_interval: Duration) {
        let system = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = system.pump().await {
                    warn!(%err, "system pump failed; retrying after interval");
                }
                tokio::time::sleep(poll_interval).await;
            }
        });
        self.background
            .lock()
            .expect("background task list mutex poisoned")
            .push(handle);
        info!("system started");
    }

    /// Stops every background task started by [`System::start`].
    pub fn close(&self) {
        for handle in self
            .background
            .lock()
            .expect("background task list mutex poisoned")
            .drain(..)
        {
            handle.abort();
        }
        info!("system closed");
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accounts_app::client as accounts;
    use crate::domain::commands::client as commands;
    use crate::money::Money;

    #[tokio::test]
    async fn deposit_flows_through_the_whole_pipeline() {
        let system = System::new();
        let account_id = accounts::create_account(&system.accounts).await.unwrap();
        let transaction_id = commands::deposit_funds(
            &system.commands,
            account_id,
            Money::from_cents(20_000),
        )
        .await
        .unwrap();

        system.pump().await.unwrap();

        assert_eq!(
            accounts::get_balance(&system.accounts, account_id)
                .await
                .unwrap(),
            Money::from_cents(20_000)
        );

        let saga = crate::domain::sagas::Saga::load(&system.sagas.runtime(), transaction_id)
            .await
            .unwrap();
        assert!(saga.outcome().has_succeeded);
    }

    #[tokio::test]
    async fn transfer_with_closed_credit_account_refunds_the_debit_leg() {
        let system = System::new();
        let debit_id = accounts::create_account(&system.accounts).await.unwrap();
        let credit_id = accounts::create_account(&system.accounts).await.unwrap();
        system.pump().await.unwrap();

        accounts::close_account(&system.accounts, credit_id)
            .await
            .unwrap();

        let transaction_id = commands::transfer_funds(
            &system.commands,
            debit_id,
            credit_id,
            Money::from_cents(10_000),
        )
        .await
        .unwrap();

        system.pump().await.unwrap();

        assert_eq!(
            accounts::get_balance(&system.accounts, debit_id)
                .await
                .unwrap(),
            Money::ZERO,
            "the debit leg must be refunded once the credit leg fails"
        );

        let saga = crate::domain::sagas::Saga::load(&system.sagas.runtime(), transaction_id)
            .await
            .unwrap();
        assert!(saga.outcome().has_errored);
        assert_eq!(saga.outcome().errors.len(), 1);
    }
}
