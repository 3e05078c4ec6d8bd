//! # ctlprog-core
//!
//! Batch creation of account control programs.
//!
//! A single call carries an ordered list of sub-requests. The [`Dispatcher`]
//! runs every sub-request on its own Tokio task, contains any failure
//! (including a panic) to the slot of the item that caused it, and returns the
//! responses in request order. A partially failed batch is still a successful
//! call: failed items carry a [`WireError`] in their slot.
//!
//! ```rust,no_run
//! use ctlprog_core::{Dispatcher, MemoryAccounts, TraceContext, SubRequest, AccountRequest};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let accounts = Arc::new(MemoryAccounts::from_pairs([("alice", "acc-1")]));
//! let dispatcher = Dispatcher::new(accounts);
//!
//! let responses = dispatcher
//!     .dispatch(
//!         &TraceContext::new_root(),
//!         vec![SubRequest::Account(AccountRequest::by_alias("alice"))],
//!     )
//!     .await;
//! assert_eq!(responses.len(), 1);
//! # }
//! ```
//!
//! The crate also ships the bounded retry helper used by the deploy tooling,
//! see [`retry`].

pub mod accounts;
mod common;
pub mod dispatch;
pub mod retry;

pub use accounts::{AccountService, MemoryAccounts};
pub use common::*;
pub use dispatch::Dispatcher;
