//! # ledgersaga
//!
//! `ledgersaga` is an event-sourced, saga-orchestrated bank account ledger.
//! Every state change is an immutable event; aggregates are rebuilt by
//! replaying their stream, and cross-account transfers are coordinated by a
//! saga that compensates with a refund if the credit leg fails partway
//! through.
//!
//! ## Core concepts
//!
//! ### Events and aggregates
//!
//! An [`Event`] is an immutable fact; an [`AggregateState`] folds a sequence
//! of them into the current state of one aggregate, via [`Aggregate`].
//!
//! ```rust
//! use ledgersaga::{AggregateState, Event};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum WidgetEvent {
//!     Named { name: String },
//! }
//!
//! impl Event for WidgetEvent {
//!     fn event_type(&self) -> String {
//!         "WidgetNamed".to_string()
//!     }
//! }
//!
//! #[derive(Debug, Clone, Default)]
//! struct Widget {
//!     name: Option<String>,
//! }
//!
//! impl AggregateState<WidgetEvent> for Widget {
//!     fn apply(&self, event: &WidgetEvent) -> Self {
//!         match event {
//!             WidgetEvent::Named { name } => Widget { name: Some(name.clone()) },
//!         }
//!     }
//! }
//! ```
//!
//! ### Storage and the runtime
//!
//! An [`EventStoreBackend`] durably holds streams and a per-application
//! notification log; [`AggregateRuntime`] loads and saves aggregates against
//! one. Two backends ship with the crate: [`InMemoryEventStore`] for tests,
//! and [`PostgresEventStore`] for production.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), ledgersaga::Error> {
//! use ledgersaga::{AggregateRuntime, InMemoryEventStore};
//! use std::sync::Arc;
//!
//! let runtime = AggregateRuntime::new(Arc::new(InMemoryEventStore::new()));
//! # Ok(())
//! # }
//! ```
//!
//! ### Process applications and sagas
//!
//! A [`ProcessApplication`] durably consumes another application's
//! notification log and reacts through a [`Policy`], committing whatever it
//! stages atomically with its advanced tracking cursor. The bank account
//! system wires three of them — `Commands`, `Sagas`, `Accounts` — into the
//! pipeline `Commands -> Sagas -> Accounts -> Sagas`, exposed as [`System`].
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), ledgersaga::Error> {
//! use ledgersaga::domain::accounts_app::client as accounts;
//! use ledgersaga::domain::commands::client as commands;
//! use ledgersaga::{Money, System};
//!
//! let system = System::new();
//! let account_id = accounts::create_account(&system.accounts).await?;
//! commands::deposit_funds(&system.commands, account_id, Money::from_cents(20_000)).await?;
//! system.pump().await?;
//!
//! let balance = accounts::get_balance(&system.accounts, account_id).await?;
//! assert_eq!(balance, Money::from_cents(20_000));
//! # Ok(())
//! # }
//! ```
pub mod aggregate;
pub mod delay;
pub mod domain;
pub mod error;
pub mod event;
pub mod money;
pub mod process;
pub mod runner;
pub mod runtime;
pub mod store;

pub use aggregate::{Aggregate, AggregateState};
pub use error::Error;
pub use event::{AggregateId, Event, RawEvent};
pub use money::Money;
pub use process::{Policy, ProcessApplication, RunConfig, Upstream};
pub use runner::System;
pub use runtime::{AggregateRuntime, ExecuteConfig};
pub use store::{EventStoreBackend, InMemoryEventStore, PostgresEventStore, TrackingUpdate};
