//! Account service boundary.
//!
//! The dispatcher does not know how accounts are stored or how control
//! programs are derived; it only needs the two operations of
//! [`AccountService`]. [`MemoryAccounts`] is a process-local implementation
//! used by the server binary and by tests.

use crate::common::{error::Error, error::Result, types::ControlProgram};
use core::fmt::Write;
use core::future::Future;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// The resource-creation service consumed by the dispatcher.
///
/// Implementations are shared across all concurrently running batch items and
/// must handle their own synchronization.
pub trait AccountService: Send + Sync + 'static {
    /// Resolves an account alias to its account id.
    fn resolve_account_id(&self, alias: &str) -> impl Future<Output = Result<String>> + Send;

    /// Creates a new control program for `account_id`.
    ///
    /// `exclusive` requests a program that is not shared with other
    /// receivers of the same account.
    fn create_control_program(
        &self,
        account_id: &str,
        exclusive: bool,
    ) -> impl Future<Output = Result<ControlProgram>> + Send;
}

/// In-memory account registry.
///
/// Programs are derived from the account id and a process-wide counter, so two
/// calls for the same account never return the same program.
#[derive(Debug, Default)]
pub struct MemoryAccounts {
    aliases: RwLock<HashMap<String, String>>,
    ids: RwLock<HashSet<String>>,
    next_program: AtomicU64,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `(alias, account_id)` pairs.
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let accounts = Self::new();
        for (alias, id) in pairs {
            accounts.insert(alias, id);
        }
        accounts
    }

    /// Registers `account_id` under `alias`, replacing any previous mapping of
    /// the alias.
    pub fn insert(&self, alias: impl Into<String>, account_id: impl Into<String>) {
        let account_id = account_id.into();
        self.ids.write().insert(account_id.clone());
        self.aliases.write().insert(alias.into(), account_id);
    }

    /// Registers an account that has no alias.
    pub fn insert_id(&self, account_id: impl Into<String>) {
        self.ids.write().insert(account_id.into());
    }

    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }
}

impl AccountService for MemoryAccounts {
    async fn resolve_account_id(&self, alias: &str) -> Result<String> {
        self.aliases
            .read()
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                resource: "account alias",
                key: alias.to_string(),
            })
    }

    async fn create_control_program(
        &self,
        account_id: &str,
        exclusive: bool,
    ) -> Result<ControlProgram> {
        if !self.ids.read().contains(account_id) {
            return Err(Error::NotFound {
                resource: "account",
                key: account_id.to_string(),
            });
        }

        let seq = self.next_program.fetch_add(1, Ordering::Relaxed);
        let prefix = if exclusive { "ctlx" } else { "ctl" };
        let raw = format!("{prefix}:{account_id}:{seq}");

        Ok(ControlProgram {
            account_id: account_id.to_string(),
            program: to_hex(raw.as_bytes()),
        })
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{b:02x}");
    }
    out
}
