use super::*;
use crate::{AccountRequest, MemoryAccounts, WireError};
use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Barrier;
use tokio::time::{sleep, timeout};

/// Account service double.
///
/// - ids starting with `panic` make the service panic,
/// - `slow-<ms>-...` ids sleep for `<ms>` before answering,
/// - `upstream-down` fails with an upstream error,
/// - everything else is delegated to a [`MemoryAccounts`].
///
/// With a barrier set, every `create_control_program` call waits on it first,
/// which only completes if all items run at the same time.
///
/// `created` counts the programs handed out.
struct ScriptedAccounts {
    inner: MemoryAccounts,
    barrier: Option<Barrier>,
    created: AtomicUsize,
}

impl ScriptedAccounts {
    fn new(inner: MemoryAccounts) -> Self {
        Self {
            inner,
            barrier: None,
            created: AtomicUsize::new(0),
        }
    }

    fn with_barrier(inner: MemoryAccounts, parties: usize) -> Self {
        Self {
            inner,
            barrier: Some(Barrier::new(parties)),
            created: AtomicUsize::new(0),
        }
    }
}

impl AccountService for ScriptedAccounts {
    async fn resolve_account_id(&self, alias: &str) -> Result<String> {
        self.inner.resolve_account_id(alias).await
    }

    async fn create_control_program(
        &self,
        account_id: &str,
        exclusive: bool,
    ) -> Result<ControlProgram> {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if account_id.starts_with("panic") {
            panic!("account service crashed on {account_id}");
        }
        if let Some(rest) = account_id.strip_prefix("slow-") {
            let ms: u64 = rest
                .split('-')
                .next()
                .and_then(|ms| ms.parse().ok())
                .unwrap_or(0);
            sleep(Duration::from_millis(ms)).await;
        }
        if account_id == "upstream-down" {
            return Err(Error::Upstream {
                context: "connection reset".to_string(),
            });
        }
        let program = self.inner.create_control_program(account_id, exclusive).await?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(program)
    }
}

fn by_id(id: &str) -> SubRequest {
    SubRequest::Account(AccountRequest::by_id(id))
}

fn by_alias(alias: &str) -> SubRequest {
    SubRequest::Account(AccountRequest::by_alias(alias))
}

fn dispatcher(accounts: ScriptedAccounts) -> Dispatcher<ScriptedAccounts> {
    Dispatcher::new(Arc::new(accounts))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_batch_returns_empty() {
    let d = dispatcher(ScriptedAccounts::new(MemoryAccounts::new()));
    let responses = d.dispatch(&TraceContext::new_root(), Vec::new()).await;
    assert!(responses.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_batch_of_three() {
    let inner = MemoryAccounts::new();
    inner.insert_id("acc-1");
    let d = dispatcher(ScriptedAccounts::new(inner));

    let responses = d
        .dispatch(
            &TraceContext::new_root(),
            vec![by_id("acc-1"), by_alias("missing"), by_id("panic-now")],
        )
        .await;

    assert_eq!(responses.len(), 3);

    let program = responses[0].control_program().expect("slot 0 succeeds");
    assert_eq!(program.account_id, "acc-1");
    assert!(responses[0].error().is_none());

    let not_found = responses[1].error().expect("slot 1 fails");
    assert_eq!(not_found.kind, ErrorKind::NotFound);
    assert_eq!(not_found.message, "account alias not found");

    let crashed = responses[2].error().expect("slot 2 fails");
    assert_eq!(crashed.kind, ErrorKind::Internal);
    assert!(responses[2].control_program().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panic_matches_declared_internal_error() {
    let d = dispatcher(ScriptedAccounts::new(MemoryAccounts::new()));
    let responses = d
        .dispatch(&TraceContext::new_root(), vec![by_id("panic-1")])
        .await;

    let declared = WireError::from(Error::Internal {
        context: "anything".to_string(),
    });
    assert_eq!(responses, vec![SubResponse::Error(declared)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn order_is_kept_when_completion_is_reversed() {
    const N: usize = 32;
    let inner = MemoryAccounts::new();
    let mut requests = Vec::with_capacity(N);
    for i in 0..N {
        // Earlier items sleep longer, so they finish last.
        let id = format!("slow-{}-{i}", (N - i) * 5);
        inner.insert_id(id.clone());
        requests.push(by_id(&id));
    }
    let d = dispatcher(ScriptedAccounts::new(inner));

    let responses = d.dispatch(&TraceContext::new_root(), requests).await;

    assert_eq!(responses.len(), N);
    for (i, response) in responses.iter().enumerate() {
        let program = response.control_program().expect("every item succeeds");
        assert_eq!(program.account_id, format!("slow-{}-{i}", (N - i) * 5));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panics_do_not_leak_into_siblings() {
    const N: usize = 20;
    let inner = MemoryAccounts::new();
    let mut requests = Vec::with_capacity(N);
    for i in 0..N {
        if i % 2 == 0 {
            let id = format!("acc-{i}");
            inner.insert_id(id.clone());
            requests.push(by_id(&id));
        } else {
            requests.push(by_id(&format!("panic-{i}")));
        }
    }
    let d = dispatcher(ScriptedAccounts::new(inner));

    let responses = d.dispatch(&TraceContext::new_root(), requests).await;

    assert_eq!(responses.len(), N);
    for (i, response) in responses.iter().enumerate() {
        if i % 2 == 0 {
            assert_eq!(
                response.control_program().map(|p| p.account_id.as_str()),
                Some(format!("acc-{i}").as_str())
            );
        } else {
            assert_eq!(response.error().map(|e| e.kind), Some(ErrorKind::Internal));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn items_run_concurrently() {
    const N: usize = 16;
    let inner = MemoryAccounts::new();
    let mut requests = Vec::with_capacity(N);
    for i in 0..N {
        let id = format!("acc-{i}");
        inner.insert_id(id.clone());
        requests.push(by_id(&id));
    }
    // Every item blocks until all N have reached the service.
    let d = dispatcher(ScriptedAccounts::with_barrier(inner, N));

    let responses = timeout(
        Duration::from_secs(10),
        d.dispatch(&TraceContext::new_root(), requests),
    )
    .await
    .expect("items did not run concurrently");

    assert!(responses.iter().all(SubResponse::is_success));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_item_does_not_change_other_results() {
    let inner = MemoryAccounts::from_pairs([("treasury", "acc-1")]);
    inner.insert_id("slow-200-a");
    let d = dispatcher(ScriptedAccounts::new(inner));

    let responses = d
        .dispatch(
            &TraceContext::new_root(),
            vec![by_id("slow-200-a"), by_alias("treasury"), by_id("upstream-down")],
        )
        .await;

    assert!(responses[0].is_success());
    assert_eq!(
        responses[1].control_program().map(|p| p.account_id.as_str()),
        Some("acc-1")
    );
    let upstream = responses[2].error().expect("upstream failure");
    assert_eq!(upstream.kind, ErrorKind::Upstream);
    assert!(upstream.temporary);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unsupported_item_gets_explicit_error() {
    let inner = MemoryAccounts::new();
    inner.insert_id("acc-1");
    let d = dispatcher(ScriptedAccounts::new(inner));

    let responses = d
        .dispatch(
            &TraceContext::new_root(),
            vec![SubRequest::Unsupported, by_id("acc-1")],
        )
        .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(
        responses[0].error().map(|e| e.kind),
        Some(ErrorKind::Unsupported)
    );
    assert!(responses[1].is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_account_selector_is_invalid() {
    let d = dispatcher(ScriptedAccounts::new(MemoryAccounts::new()));
    let responses = d
        .dispatch(
            &TraceContext::new_root(),
            vec![SubRequest::Account(AccountRequest::default())],
        )
        .await;

    assert_eq!(
        responses[0].error().map(|e| e.kind),
        Some(ErrorKind::InvalidRequest)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropped_call_aborts_its_items() {
    const N: usize = 8;
    let inner = MemoryAccounts::new();
    let mut requests = Vec::with_capacity(N);
    for i in 0..N {
        let id = format!("slow-200-{i}");
        inner.insert_id(id.clone());
        requests.push(by_id(&id));
    }
    let accounts = Arc::new(ScriptedAccounts::new(inner));
    let d = Dispatcher::new(Arc::clone(&accounts));

    let cut_short = timeout(
        Duration::from_millis(50),
        d.dispatch(&TraceContext::new_root(), requests),
    )
    .await;
    assert!(cut_short.is_err());

    // Long enough for any surviving item to finish its sleep.
    sleep(Duration::from_millis(400)).await;
    assert_eq!(accounts.created.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completed_call_creates_every_program() {
    const N: usize = 8;
    let inner = MemoryAccounts::new();
    let mut requests = Vec::with_capacity(N);
    for i in 0..N {
        let id = format!("slow-20-{i}");
        inner.insert_id(id.clone());
        requests.push(by_id(&id));
    }
    let accounts = Arc::new(ScriptedAccounts::new(inner));
    let d = Dispatcher::new(Arc::clone(&accounts));

    let responses = d.dispatch(&TraceContext::new_root(), requests).await;

    assert!(responses.iter().all(SubResponse::is_success));
    assert_eq!(accounts.created.load(Ordering::SeqCst), N);
}
