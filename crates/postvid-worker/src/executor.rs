//! Job executor.
//!
//! Runs `concurrency` independent loops. Each loop pops a job id, claims the
//! job (or reclaims it when a previous owner's lease lapsed), runs the render
//! pipeline under a heartbeat-renewed lease and records the terminal status.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use postvid_models::{JobId, WorkerId};
use postvid_queue::{ProgressChannel, QueueDispatcher};
use postvid_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::RenderPipeline;
use crate::recovery::{LeaseSweeper, RecoverySweeper};
use crate::retry::FailureTracker;

/// State shared by every loop instance.
struct LoopContext {
    config: WorkerConfig,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn QueueDispatcher>,
    progress: Arc<dyn ProgressChannel>,
    pipeline: RenderPipeline,
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    ctx: Arc<LoopContext>,
    shutdown: watch::Sender<bool>,
    worker_prefix: String,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn QueueDispatcher>,
        progress: Arc<dyn ProgressChannel>,
        pipeline: RenderPipeline,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let worker_prefix = WorkerId::generate("worker").to_string();

        Self {
            ctx: Arc::new(LoopContext {
                config,
                store,
                queue,
                progress,
                pipeline,
            }),
            shutdown,
            worker_prefix,
        }
    }

    /// Run until `shutdown` is called, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        let config = &self.ctx.config;
        info!(
            "Starting job executor '{}' with {} loops",
            self.worker_prefix, config.concurrency
        );

        let recovery = RecoverySweeper::new(
            Arc::clone(&self.ctx.store),
            Arc::clone(&self.ctx.queue),
            config.recovery_batch_size,
        );
        if let Err(e) = recovery.requeue_pending().await {
            warn!("Startup recovery failed: {}", e);
        }

        let sweeper = LeaseSweeper::new(
            Arc::clone(&self.ctx.store),
            Arc::clone(&self.ctx.queue),
            Arc::clone(&self.ctx.progress),
            config.max_attempts,
            config.recovery_batch_size,
        );
        let sweeper_task = tokio::spawn(
            sweeper.run(config.lease_sweep_interval, self.shutdown.subscribe()),
        );

        let loops: Vec<JoinHandle<()>> = (0..config.concurrency)
            .map(|i| {
                let worker = WorkerId(format!("{}-{}", self.worker_prefix, i));
                let ctx = Arc::clone(&self.ctx);
                let shutdown = self.shutdown.subscribe();
                tokio::spawn(worker_loop(ctx, worker, shutdown))
            })
            .collect();

        let mut shutdown_rx = self.shutdown.subscribe();
        while !*shutdown_rx.borrow_and_update() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        info!("Shutdown signal received, waiting for in-flight jobs");

        let drain = async {
            for handle in loops {
                if let Err(e) = handle.await {
                    error!("Worker loop panicked: {}", e);
                }
            }
        };
        if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
            warn!(
                "In-flight jobs did not finish within {:?}; their leases will expire",
                config.shutdown_timeout
            );
        }

        sweeper_task.abort();
        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown: loops stop dequeuing and finish their current job.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// One loop instance. Never returns on job errors, only on shutdown.
async fn worker_loop(ctx: Arc<LoopContext>, worker: WorkerId, shutdown: watch::Receiver<bool>) {
    debug!(worker = %worker, "Worker loop started");

    // Dequeue in bounded windows so shutdown is seen between them without
    // abandoning a pop that is already in flight.
    while !*shutdown.borrow() {
        match ctx.queue.try_dequeue(ctx.config.dequeue_window).await {
            Ok(Some(job_id)) => ctx.handle(&worker, job_id).await,
            Ok(None) => {}
            Err(e) => {
                error!(worker = %worker, "Error consuming jobs: {}", e);
                tokio::time::sleep(ctx.config.error_backoff).await;
            }
        }
    }

    debug!(worker = %worker, "Worker loop stopped");
}

impl LoopContext {
    /// Claim `job_id` and, if it is ours, run it to a terminal status.
    ///
    /// The pipeline runs in its own task so a panic fails the job instead of
    /// ending this loop.
    async fn handle(self: &Arc<Self>, worker: &WorkerId, job_id: JobId) {
        if !self.acquire(worker, &job_id).await {
            return;
        }

        // Aborted on every exit path, unwinding included
        let heartbeat = scopeguard::guard(self.spawn_heartbeat(worker, &job_id), |task| {
            task.abort()
        });
        let started = Instant::now();

        let task = {
            let ctx = Arc::clone(self);
            let job_id = job_id.clone();
            let mut logger = JobLogger::new(&job_id, worker);
            tokio::spawn(async move {
                let span = logger.create_span();
                let result = ctx.process(&job_id, &mut logger).instrument(span).await;
                (logger, result)
            })
        };
        let (logger, result) = match task.await {
            Ok(outcome) => outcome,
            Err(e) => (JobLogger::new(&job_id, worker), Err(WorkerError::from_join(e))),
        };

        drop(heartbeat);
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(output_ref) => match self.store.complete(&job_id, worker, &output_ref).await {
                Ok(true) => {
                    metrics::record_job_completed(elapsed);
                    logger.log_completion(&format!("{} in {:.1}s", output_ref, elapsed));
                }
                Ok(false) => logger.log_warning("lease lost before completion was recorded"),
                Err(e) => error!(job_id = %job_id, "Failed to record completion: {}", e),
            },
            Err(e) => {
                logger.log_error(&e.to_string());
                match self.store.fail(&job_id, worker, &e.to_string()).await {
                    Ok(true) => metrics::record_job_failed(elapsed),
                    Ok(false) => logger.log_warning("lease lost before failure was recorded"),
                    Err(store_err) => {
                        error!(job_id = %job_id, "Failed to record failure: {}", store_err)
                    }
                }
            }
        }

        if let Err(e) = self.progress.clear(&job_id).await {
            warn!(job_id = %job_id, "Failed to clear progress: {}", e);
        }
    }

    async fn process(&self, job_id: &JobId, logger: &mut JobLogger) -> WorkerResult<String> {
        logger.log_start("claimed");
        let job = self.store.get(job_id).await?;
        self.pipeline.run(&job, logger).await
    }

    /// Claim a pending job, or take over one whose lease lapsed.
    async fn acquire(&self, worker: &WorkerId, job_id: &JobId) -> bool {
        let acquired = match self.store.claim(job_id, worker).await {
            Ok(true) => Ok(true),
            Ok(false) => self.store.reclaim(job_id, worker).await,
            Err(e) => Err(e),
        };

        match acquired {
            Ok(true) => true,
            Ok(false) => {
                metrics::record_claim_rejected();
                info!(job_id = %job_id, worker = %worker, "Skipping job: already claimed or finished");
                false
            }
            Err(e) => {
                error!(job_id = %job_id, "Failed to claim job: {}", e);
                false
            }
        }
    }

    /// Renew the lease every heartbeat interval until aborted or lost.
    fn spawn_heartbeat(&self, worker: &WorkerId, job_id: &JobId) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let worker = worker.clone();
        let job_id = job_id.clone();
        let interval = self.config.lease_heartbeat_interval;

        tokio::spawn(async move {
            let mut failures = FailureTracker::new(3);
            loop {
                tokio::time::sleep(interval).await;
                match store.renew_lease(&job_id, &worker).await {
                    Ok(true) => failures.record_success(),
                    Ok(false) => {
                        warn!(job_id = %job_id, worker = %worker, "Lease no longer held, stopping heartbeat");
                        break;
                    }
                    Err(e) => {
                        if failures.record_failure() {
                            warn!(job_id = %job_id, "Lease renewal failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}
