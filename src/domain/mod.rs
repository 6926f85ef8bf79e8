//! Domain logic for the bank account system: the `BankAccount` aggregate,
//! the three command families, the saga state machines, and the
//! `Accounts`/`Sagas` process application policies built on top of the
//! generic substrate in the crate root.
pub mod accounts_app;
pub mod bank_account;
pub mod commands;
pub mod sagas;
