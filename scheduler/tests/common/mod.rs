//! Shared fixtures for scheduler black-box tests
//!
//! Boots a scheduler over the in-process bus and store, with stub tasks
//! standing in for the user, file and catalog services the way they answer
//! on the real bus (echoing the correlation identity back).

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

use scheduler::services::{InProcessBus, MemoryStore};
use scheduler::{BusEvent, JobStore, Scheduler, SchedulerConfig, Transport};
use shared::{JobId, JobStatus};

/// How long a test waits for an expected event before failing
pub const RECV_WINDOW: Duration = Duration::from_millis(500);

pub struct Harness {
    pub bus: Arc<InProcessBus>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    /// Boot a scheduler whose sweeps are pushed far out, so scenarios see
    /// only the events they trigger themselves.
    pub async fn start() -> Self {
        Self::start_with(SchedulerConfig {
            sweep_interval: Duration::from_secs(3600),
            probe_grace: Duration::from_secs(3600),
            rpc_timeout: Some(Duration::from_millis(250)),
        })
        .await
    }

    pub async fn start_with(config: SchedulerConfig) -> Self {
        let bus = Arc::new(InProcessBus::new());
        let store = Arc::new(MemoryStore::new());

        let mut scheduler = Scheduler::new(config, Arc::clone(&store), Arc::clone(&bus));
        scheduler.initialize().await.expect("scheduler init");
        tokio::spawn(async move {
            let _ = scheduler.run().await;
        });

        Self { bus, store }
    }

    /// Subscribe to bus events; call before triggering them
    pub async fn listen(&self, events: &[&str]) -> mpsc::UnboundedReceiver<BusEvent> {
        self.bus
            .subscribe(events.iter().map(|e| e.to_string()).collect())
            .await
            .expect("subscribe")
    }

    pub async fn publish(&self, event: &str, payload: Value) {
        self.bus.publish(event, payload).await.expect("publish");
    }

    /// Announce an idle solver worker to the scheduler
    pub async fn announce_solver(&self, id: &str) {
        self.publish(
            "solver-pong-response",
            json!({"solverID": id, "problemID": -1, "respond": false}),
        )
        .await;
    }

    /// Submit a job with the given part specs
    pub async fn submit_job(&self, user: i64, solvers: Value) {
        self.publish(
            "add-job",
            json!({"userID": user, "dataID": 10, "modelID": 11, "solvers": solvers}),
        )
        .await;
    }

    /// Stub of the user service answering every lookup with the given limit
    pub async fn stub_user_service(&self, solver_limit: u32) {
        self.stub_rpc("getUser", "getUser-response", move |request| {
            json!({"data": {"id": request["id"], "solverLimit": solver_limit}})
        })
        .await;
    }

    /// Stub of the file service answering with canned content per file id
    pub async fn stub_file_service(&self) {
        self.stub_rpc("read-file", "read-file-response", |request| {
            json!({"error": false, "data": format!("content-of-{}", request["fileId"])})
        })
        .await;
    }

    /// Stub of the catalog service listing the given solver types
    pub async fn stub_catalog_service(&self, entries: Value) {
        self.stub_rpc("list-solvers", "list-solvers-response", move |_| {
            json!({"data": entries.clone()})
        })
        .await;
    }

    /// Generic RPC stub: answers every request on `request_event`, echoing
    /// the correlation identity the way the real services do
    pub async fn stub_rpc(
        &self,
        request_event: &str,
        response_event: &'static str,
        body: impl Fn(&Value) -> Value + Send + 'static,
    ) {
        let mut rx = self.listen(&[request_event]).await;
        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let mut response = body(&request.payload);
                response["sessionId"] = request.payload["sessionId"].clone();
                response["requestId"] = request.payload["requestId"].clone();
                let _ = bus.publish(response_event, response).await;
            }
        });
    }

    /// Poll the store until the job reaches `status`, failing after a bound
    pub async fn wait_for_status(&self, id: JobId, status: JobStatus) {
        let deadline = tokio::time::Instant::now() + RECV_WINDOW;
        loop {
            let job = self.store.job(id).await.expect("store query");
            if job.as_ref().map(|j| j.status) == Some(status) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "job {id} never reached {status}, currently {:?}",
                    job.map(|j| j.status)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Wait for the next event on the receiver, failing the test after a bound
pub async fn expect_event(rx: &mut mpsc::UnboundedReceiver<BusEvent>) -> BusEvent {
    timeout(RECV_WINDOW, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("bus closed")
}

/// Assert that nothing arrives on the receiver within a short window
pub async fn expect_silence(rx: &mut mpsc::UnboundedReceiver<BusEvent>) {
    assert!(
        timeout(Duration::from_millis(150), rx.recv()).await.is_err(),
        "expected no further events"
    );
}
