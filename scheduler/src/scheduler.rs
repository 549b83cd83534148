//! Main scheduler implementation
//!
//! Owns the job dispatch state machine and coordinates the solver pool,
//! the correlation layer, and the injected transport/store collaborators.
//! All business events are handled serially by one event loop; correlation
//! responses flow through a separate subscription so a handler can await an
//! RPC without starving itself.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;

use shared::messages::decode;
use shared::{
    AddJob, AddJobResponse, GetUser, GetUserResponse, JobHistoryRequest, JobHistoryResponse,
    JobOutputRequest, JobOutputResponse, ListSolvers, ListSolversResponse, QueueCheck, ReadFile,
    ReadFileResponse, RemoveJob, RemoveJobResponse, Solve, SolverPing, SolverPong, SolverResponse,
    StopSolve,
};
use shared::{FileId, JobId, JobPart, SessionId, SolverCatalogEntry, SolverId, UserId, UserProfile};

use crate::config::SchedulerConfig;
use crate::correlation::CorrelationLayer;
use crate::error::{SchedulerError, SchedulerResult};
use crate::pool::SolverPool;
use crate::traits::{BusEvent, JobStore, NewJob, NewJobPart, Transport};

/// Session identity stamped on the scheduler's own correlation RPCs
const SCHEDULER_SESSION: SessionId = SessionId(0);

/// History responses are capped at this many rows
const HISTORY_LIMIT: usize = 50;

/// Scheduling core wired to its collaborators through dependency injection
pub struct Scheduler<S, T>
where
    S: JobStore + Send + Sync + 'static,
    T: Transport + Send + Sync + 'static,
{
    config: SchedulerConfig,
    store: S,
    transport: Arc<T>,
    pool: Arc<Mutex<SolverPool>>,
    correlation: Arc<CorrelationLayer<T>>,

    /// Business event stream, populated by `initialize`
    events_rx: Option<mpsc::UnboundedReceiver<BusEvent>>,

    /// Shutdown signal
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<S, T> Scheduler<S, T>
where
    S: JobStore + Send + Sync + 'static,
    T: Transport + Send + Sync + 'static,
{
    /// Create a new scheduler with injected dependencies
    pub fn new(config: SchedulerConfig, store: S, transport: Arc<T>) -> Self {
        let pool = Arc::new(Mutex::new(SolverPool::new(config.probe_grace)));
        let correlation = Arc::new(CorrelationLayer::new(Arc::clone(&transport)));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self {
            config,
            store,
            transport,
            pool,
            correlation,
            events_rx: None,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Subscribe to the bus and announce the scheduler to running solvers
    pub async fn initialize(&mut self) -> SchedulerResult<()> {
        let business = vec![
            AddJob::EVENT,
            QueueCheck::EVENT,
            RemoveJob::EVENT,
            SolverResponse::EVENT,
            SolverPong::EVENT,
            JobHistoryRequest::EVENT,
            JobOutputRequest::EVENT,
        ];
        let events_rx = self
            .transport
            .subscribe(business.into_iter().map(String::from).collect())
            .await?;
        self.events_rx = Some(events_rx);

        // Correlation responses get their own subscription and pump task so
        // a handler awaiting an RPC never waits on the loop it runs in.
        let responses = vec![
            GetUser::RESPONSE_EVENT,
            ReadFile::RESPONSE_EVENT,
            ListSolvers::RESPONSE_EVENT,
        ];
        let mut responses_rx = self
            .transport
            .subscribe(responses.into_iter().map(String::from).collect())
            .await?;
        let correlation = Arc::clone(&self.correlation);
        tokio::spawn(async move {
            while let Some(event) = responses_rx.recv().await {
                correlation.resolve(&event.event, &event.payload);
            }
        });

        // Ask solvers already on the bus to announce themselves
        self.publish(SolverPing::EVENT, &SolverPing { solver_id: None })
            .await?;

        shared::logging::log_success("Scheduler initialized");
        Ok(())
    }

    /// Main event loop - processes bus messages and runs health sweeps
    pub async fn run(&mut self) -> SchedulerResult<()> {
        let mut events_rx = self
            .events_rx
            .take()
            .ok_or_else(|| SchedulerError::config("run() called before initialize()"))?;
        let mut sweep_interval = interval(self.config.sweep_interval);
        // the first tick fires immediately against an empty pool
        sweep_interval.tick().await;

        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => {
                    let name = event.event.clone();
                    if let Err(e) = self.handle_event(event).await {
                        tracing::error!(event = %name, error = %e, "❌ Event handling failed");
                    }
                },

                _ = sweep_interval.tick() => {
                    if let Err(e) = self.health_sweep().await {
                        tracing::error!(error = %e, "⚠️ Health sweep failed");
                    }
                },

                Some(_) = self.shutdown_rx.recv() => {
                    shared::logging::log_shutdown("scheduler stopping");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Get shutdown sender for external shutdown requests
    pub fn shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    async fn handle_event(&self, event: BusEvent) -> SchedulerResult<()> {
        match event.event.as_str() {
            AddJob::EVENT => {
                self.handle_add_job(decode(AddJob::EVENT, &event.payload)?)
                    .await
            }
            QueueCheck::EVENT => self.handle_queue_check().await,
            RemoveJob::EVENT => {
                self.handle_remove_job(decode(RemoveJob::EVENT, &event.payload)?)
                    .await
            }
            SolverResponse::EVENT => {
                self.handle_solver_response(decode(SolverResponse::EVENT, &event.payload)?)
                    .await
            }
            SolverPong::EVENT => {
                self.handle_solver_pong(decode(SolverPong::EVENT, &event.payload)?)
                    .await
            }
            JobHistoryRequest::EVENT => {
                self.handle_job_history(decode(JobHistoryRequest::EVENT, &event.payload)?)
                    .await
            }
            JobOutputRequest::EVENT => {
                self.handle_job_output(decode(JobOutputRequest::EVENT, &event.payload)?)
                    .await
            }
            other => {
                tracing::debug!(event = other, "ignoring unexpected event");
                Ok(())
            }
        }
    }

    /// Persist a submission and acknowledge it. The queue is re-checked
    /// unconditionally so load cannot starve it.
    async fn handle_add_job(&self, msg: AddJob) -> SchedulerResult<()> {
        let mut error = false;

        match self
            .store
            .insert_job(NewJob {
                user_id: msg.user_id,
                data_id: msg.data_id,
                model_id: msg.model_id,
            })
            .await
        {
            Ok(job_id) => {
                for spec in &msg.solvers {
                    if let Err(e) = self.store.insert_part(job_id, NewJobPart::from(spec)).await {
                        tracing::error!(job = %job_id, error = %e, "❌ Part insert failed");
                        error = true;
                    }
                }
                tracing::info!(job = %job_id, user = %msg.user_id, parts = msg.solvers.len(),
                    "📥 Job accepted");
            }
            Err(e) => {
                tracing::error!(user = %msg.user_id, error = %e, "❌ Job insert failed");
                error = true;
            }
        }

        self.publish(AddJobResponse::EVENT, &AddJobResponse { error })
            .await?;
        self.publish(QueueCheck::EVENT, &QueueCheck {}).await
    }

    /// Try to advance the oldest queued job
    async fn handle_queue_check(&self) -> SchedulerResult<()> {
        let Some(job) = self.store.oldest_queued().await? else {
            return Ok(());
        };

        let user = match self.user_profile(job.user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(job = %job.id, user = %job.user_id, "user lookup came back empty");
                return Ok(());
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(job = %job.id, error = %e, "user lookup failed, job stays queued");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let parts = self.store.parts_for_job(job.id).await?;
        let needed = (user.solver_limit as usize).min(parts.len());
        if needed == 0 {
            // Zero allotted concurrency (or an empty job) is vacuously done
            self.store.mark_completed(job.id, Utc::now()).await?;
            tracing::info!(job = %job.id, "✅ Job completed with nothing to dispatch");
            return self.publish(QueueCheck::EVENT, &QueueCheck {}).await;
        }

        let allocated = {
            let mut pool = self.pool.lock().await;
            pool.allocate_idle(needed)
        };
        let Some(allocated) = allocated else {
            tracing::debug!(job = %job.id, needed, "not enough idle solvers, job stays queued");
            return Ok(());
        };

        let dispatches = match self.fetch_inputs(&job.data_id, &job.model_id).await {
            Ok((data, model, catalog)) => {
                self.build_dispatches(job.id, &allocated, &parts, data, model, &catalog)
                    .await
            }
            Err(e) => {
                tracing::warn!(job = %job.id, error = %e, "input fetch failed, nothing dispatched");
                let mut pool = self.pool.lock().await;
                for id in &allocated {
                    pool.release(id);
                }
                Vec::new()
            }
        };

        for solve in &dispatches {
            self.publish(Solve::EVENT, solve).await?;
        }

        // The job counts as started once its solvers were allocated, even
        // when some or all parts could not be dispatched.
        self.store.mark_running(job.id, Utc::now()).await?;
        tracing::info!(job = %job.id, dispatched = dispatches.len(), needed, "🚚 Job running");
        Ok(())
    }

    /// Pair allocated solvers with parts positionally and confirm each
    /// dispatch in the pool; skipped parts hand their solver back.
    async fn build_dispatches(
        &self,
        job_id: JobId,
        allocated: &[SolverId],
        parts: &[JobPart],
        data: ReadFileResponse,
        model: ReadFileResponse,
        catalog: &[SolverCatalogEntry],
    ) -> Vec<Solve> {
        let inputs_ok = !data.error && !model.error;
        let mut dispatches = Vec::with_capacity(allocated.len());

        let mut pool = self.pool.lock().await;
        for (solver_id, part) in allocated.iter().zip(parts.iter()) {
            if !inputs_ok {
                tracing::warn!(job = %job_id, part = part.id, "input service reported an error, part skipped");
                pool.release(solver_id);
                continue;
            }

            let Some(entry) = catalog.iter().find(|s| s.id == part.solver_type) else {
                tracing::warn!(job = %job_id, part = part.id, solver_type = %part.solver_type,
                    "no catalog entry for part, part skipped");
                pool.release(solver_id);
                continue;
            };

            pool.confirm(solver_id, job_id);
            dispatches.push(Solve {
                solver_id: solver_id.clone(),
                problem_id: job_id,
                data: data.data.clone(),
                model: model.data.clone(),
                solver: entry.name.clone(),
                image: entry.docker_image.clone(),
                all_solutions: part.all_solutions,
                free_search: part.free_search,
                cpu_limit: part.cpu_limit,
                time_limit: part.time_limit,
                memory_limit: part.memory_limit,
            });
        }

        dispatches
    }

    /// Record a part's output, free its solver, and complete the job once
    /// no solver remains bound to it
    async fn handle_solver_response(&self, msg: SolverResponse) -> SchedulerResult<()> {
        let remaining = {
            let mut pool = self.pool.lock().await;
            if !pool.clear_busy(&msg.solver_id) {
                tracing::debug!(solver = %msg.solver_id, "completion from a solver not marked busy");
            }
            // any inbound traffic counts as liveness
            pool.mark_healthy(&msg.solver_id);
            pool.busy_count_for(msg.problem_id)
        };

        self.store.append_output(msg.problem_id, msg.data).await?;

        if remaining == 0 {
            self.store.mark_completed(msg.problem_id, Utc::now()).await?;
            tracing::info!(job = %msg.problem_id, "✅ Job completed");
            self.publish(QueueCheck::EVENT, &QueueCheck {}).await?;
        } else {
            tracing::debug!(job = %msg.problem_id, remaining, "job still running");
        }
        Ok(())
    }

    /// Remove a job if the requester owns it and tell in-flight solvers to
    /// abandon the work
    async fn handle_remove_job(&self, msg: RemoveJob) -> SchedulerResult<()> {
        let allowed = match self.store.job(msg.id).await? {
            Some(job) => msg.user_id.map_or(true, |requester| requester == job.user_id),
            None => false,
        };

        let mut error = !allowed;
        if allowed {
            match self.store.delete_job(msg.id).await {
                Ok(()) => {
                    self.publish(StopSolve::EVENT, &StopSolve { problem_id: msg.id })
                        .await?;
                    tracing::info!(job = %msg.id, "🗑️ Job removed");
                }
                Err(e) => {
                    tracing::error!(job = %msg.id, error = %e, "❌ Job removal failed");
                    error = true;
                }
            }
        }

        self.publish(RemoveJobResponse::EVENT, &RemoveJobResponse { error })
            .await
    }

    /// Answer a history query: newest first, capped
    async fn handle_job_history(&self, msg: JobHistoryRequest) -> SchedulerResult<()> {
        let data = match self.store.history_for_user(msg.user_id, HISTORY_LIMIT).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(user = %msg.user_id, error = %e, "❌ History query failed");
                Vec::new()
            }
        };

        self.publish(JobHistoryResponse::EVENT, &JobHistoryResponse { data })
            .await
    }

    /// Answer an output query with the stored row or `false`
    async fn handle_job_output(&self, msg: JobOutputRequest) -> SchedulerResult<()> {
        let data = match self.store.output_for_job(msg.id).await {
            Ok(row) => row,
            Err(e) => {
                tracing::error!(job = %msg.id, error = %e, "❌ Output query failed");
                None
            }
        };

        self.publish(JobOutputResponse::EVENT, &JobOutputResponse { data })
            .await
    }

    /// Ingest a liveness answer; unknown solvers join the pool here
    async fn handle_solver_pong(&self, msg: SolverPong) -> SchedulerResult<()> {
        {
            let mut pool = self.pool.lock().await;
            if pool.lookup(&msg.solver_id).is_none() {
                pool.register(msg.solver_id.clone());
                tracing::info!(solver = %msg.solver_id, "🔎 Discovered solver");
            }
            pool.set_assignment(&msg.solver_id, msg.assigned_job());
            pool.mark_healthy(&msg.solver_id);
        }

        if msg.respond {
            self.publish(
                SolverPing::EVENT,
                &SolverPing {
                    solver_id: Some(msg.solver_id),
                },
            )
            .await?;
        }
        Ok(())
    }

    /// One pass of the two-phase liveness protocol over the pool
    async fn health_sweep(&self) -> SchedulerResult<()> {
        let outcome = {
            let mut pool = self.pool.lock().await;
            pool.health_sweep(Instant::now())
        };

        for (solver_id, job) in &outcome.evicted {
            // a job bound to an evicted solver stalls until someone outside
            // intervenes; make that visible
            tracing::warn!(solver = %solver_id, job = ?job,
                "⚠️ Evicting unresponsive solver");
        }

        for solver_id in outcome.ping {
            self.publish(
                SolverPing::EVENT,
                &SolverPing {
                    solver_id: Some(solver_id),
                },
            )
            .await?;
        }
        Ok(())
    }

    // ---- correlation RPC helpers -------------------------------------

    async fn user_profile(&self, user_id: UserId) -> SchedulerResult<Option<UserProfile>> {
        let response = self
            .correlation
            .request_and_wait(
                GetUser::EVENT,
                GetUser::RESPONSE_EVENT,
                SCHEDULER_SESSION,
                serde_json::to_value(GetUser { id: user_id })?,
                self.config.rpc_timeout,
            )
            .await?;
        let decoded: GetUserResponse = decode(GetUser::RESPONSE_EVENT, &response)?;
        Ok(decoded.data)
    }

    async fn read_file(&self, file_id: FileId) -> SchedulerResult<ReadFileResponse> {
        let response = self
            .correlation
            .request_and_wait(
                ReadFile::EVENT,
                ReadFile::RESPONSE_EVENT,
                SCHEDULER_SESSION,
                serde_json::to_value(ReadFile { file_id })?,
                self.config.rpc_timeout,
            )
            .await?;
        decode(ReadFile::RESPONSE_EVENT, &response).map_err(Into::into)
    }

    async fn solver_catalog(&self) -> SchedulerResult<Vec<SolverCatalogEntry>> {
        let response = self
            .correlation
            .request_and_wait(
                ListSolvers::EVENT,
                ListSolvers::RESPONSE_EVENT,
                SCHEDULER_SESSION,
                serde_json::to_value(ListSolvers {})?,
                self.config.rpc_timeout,
            )
            .await?;
        let decoded: ListSolversResponse = decode(ListSolvers::RESPONSE_EVENT, &response)?;
        Ok(decoded.data)
    }

    /// Fetch dataset content, model content and the solver catalog in
    /// parallel and join them
    async fn fetch_inputs(
        &self,
        data_id: &FileId,
        model_id: &FileId,
    ) -> SchedulerResult<(ReadFileResponse, ReadFileResponse, Vec<SolverCatalogEntry>)> {
        tokio::try_join!(
            self.read_file(*data_id),
            self.read_file(*model_id),
            self.solver_catalog(),
        )
    }

    async fn publish<M: Serialize>(&self, event: &str, message: &M) -> SchedulerResult<()> {
        let payload: Value = serde_json::to_value(message)?;
        self.transport.publish(event, payload).await
    }
}
