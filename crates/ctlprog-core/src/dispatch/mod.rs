//! Concurrent batch dispatch.
//!
//! [`Dispatcher::dispatch`] fans a batch out to one Tokio task per item and
//! waits for all of them before returning. Each task:
//!
//! - derives a child [`TraceContext`] and runs inside a `batch_item` span,
//! - runs its sub-request inside the recovery boundary of
//!   [`isolate::run_isolated`],
//! - returns its [`SubResponse`] through its own join handle.
//!
//! Join handles are kept in request order, so the response at index `i` is
//! always the outcome of request `i`, whatever order the tasks finish in.
//! Slots are never shared between tasks and no lock guards them.
//!
//! Item tasks never outlive the call. If the `dispatch` future is dropped
//! before it completes (e.g. the HTTP client went away), every task still
//! running is aborted.
//!
//! ## Structure
//!
//! - [`account`] - handler for [`SubRequest::Account`].
//! - [`isolate`] - panic recovery boundary.

pub mod account;
pub mod isolate;
#[cfg(test)]
mod tests;

use crate::{
    accounts::AccountService,
    common::{
        error::{Error, ErrorKind, Result},
        trace::TraceContext,
        types::{ControlProgram, SubRequest, SubResponse},
    },
};
use futures::future::join_all;
use isolate::{panic_message, run_isolated};
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::Instrument;

/// Batch dispatcher over an [`AccountService`].
///
/// Cheap to clone; clones share the same account service.
pub struct Dispatcher<A> {
    accounts: Arc<A>,
}

impl<A> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            accounts: Arc::clone(&self.accounts),
        }
    }
}

impl<A: AccountService> Dispatcher<A> {
    pub const fn new(accounts: Arc<A>) -> Self {
        Self { accounts }
    }

    /// Executes every sub-request concurrently and returns one response per
    /// request, in request order.
    ///
    /// This never fails as a whole: failures of individual items, including
    /// panics inside the account service, are reported in their own slot.
    /// An empty batch returns immediately without spawning anything.
    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(trace_id = %parent.id, items = requests.len())
    )]
    pub async fn dispatch(
        &self,
        parent: &TraceContext,
        requests: Vec<SubRequest>,
    ) -> Vec<SubResponse> {
        if requests.is_empty() {
            return Vec::new();
        }

        let mut handles: Vec<JoinHandle<SubResponse>> = Vec::with_capacity(requests.len());
        let mut guard = AbortOnDrop(Vec::with_capacity(requests.len()));
        for (index, request) in requests.into_iter().enumerate() {
            let ctx = parent.child();
            let span = tracing::info_span!(
                "batch_item",
                index,
                kind = request.kind(),
                trace_id = %ctx.id,
                parent_trace_id = %parent.id
            );
            let accounts = Arc::clone(&self.accounts);
            let handle = tokio::spawn(run_item(accounts, ctx, request).instrument(span));
            guard.0.push(handle.abort_handle());
            handles.push(handle);
        }

        let responses: Vec<SubResponse> = join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(index, joined)| match joined {
                Ok(response) => response,
                // Only reachable if the runtime cancels the task or a panic
                // escapes the recovery boundary.
                Err(e) => {
                    tracing::error!(index, "batch item task did not complete: {e}");
                    SubResponse::Error(
                        Error::Internal {
                            context: format!("batch item {index} did not complete: {e}"),
                        }
                        .into(),
                    )
                }
            })
            .collect();
        // Every task has finished; aborting them now is a no-op.
        drop(guard);

        let failed = responses.iter().filter(|r| !r.is_success()).count();
        tracing::debug!(failed, "batch complete");

        responses
    }
}

/// Aborts the batch's item tasks when dropped.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Body of one batch item task.
async fn run_item<A: AccountService>(
    accounts: Arc<A>,
    ctx: TraceContext,
    request: SubRequest,
) -> SubResponse {
    let result = run_isolated(execute(&*accounts, &request), |payload| {
        let message = panic_message(&payload);
        tracing::error!(trace_id = %ctx.id, "batch item panicked: {message}");
        Err(Error::from_panic(message))
    })
    .await;

    if let Err(e) = &result {
        match e.kind() {
            ErrorKind::Internal | ErrorKind::Upstream => {
                tracing::warn!(trace_id = %ctx.id, "batch item failed: {e}");
            }
            _ => tracing::debug!(trace_id = %ctx.id, "batch item rejected: {e}"),
        }
    }

    SubResponse::from(result)
}

async fn execute<A: AccountService>(accounts: &A, request: &SubRequest) -> Result<ControlProgram> {
    match request {
        SubRequest::Account(req) => account::create_account_control_program(accounts, req).await,
        SubRequest::Unsupported => Err(Error::Unsupported {
            operation: "unrecognized request type".to_string(),
        }),
    }
}
