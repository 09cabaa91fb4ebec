//! Asynchronous packing service.
//!
//! Each run executes on a tokio blocking thread with its own packing context.
//! The service resolves configurations, consults the result cache and keeps
//! a bounded set of job records queryable by id.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::api::{PackRequest, PackResponse};
use crate::cache::{ResultCache, fingerprint};
use crate::config::{AlgorithmConfig, AppConfig, ConfigRegistry, ServiceConfig};
use crate::error::{JobError, PackingError, Result};
use crate::job::{JobId, JobStatus, PackingJob};
use crate::optimizer::{PackingInput, pack_items_with_progress};

/// Usage figures over every job that reached a terminal status.
///
/// # Fields
/// * `total_optimizations` - Completed jobs, cache hits included
/// * `computed` - Completed jobs that ran the engine
/// * `cache_hits` - Completed jobs served from the cache
/// * `failed` - Failed jobs
/// * `total_execution_time_ms` - Engine time of the computed jobs
/// * `average_execution_time_ms` - Mean engine time per computed job
/// * `last_updated` - When the last job finished
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ServiceStatistics {
    pub total_optimizations: u64,
    pub computed: u64,
    pub cache_hits: u64,
    pub failed: u64,
    pub total_execution_time_ms: u64,
    pub average_execution_time_ms: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ServiceStatistics {
    fn record(&mut self, job: &PackingJob) {
        match job.status {
            JobStatus::Completed if job.from_cache => {
                self.total_optimizations += 1;
                self.cache_hits += 1;
            }
            JobStatus::Completed => {
                self.total_optimizations += 1;
                self.computed += 1;
                if let Some(response) = &job.response {
                    self.total_execution_time_ms =
                        self.total_execution_time_ms.saturating_add(response.execution_time_ms);
                }
            }
            JobStatus::Failed => self.failed += 1,
            JobStatus::Pending | JobStatus::Running => return,
        }
        if self.computed > 0 {
            self.average_execution_time_ms = self.total_execution_time_ms as f64 / self.computed as f64;
        }
        self.last_updated = Some(job.updated_at);
    }
}

pub struct PackingService {
    registry: RwLock<ConfigRegistry>,
    cache: ResultCache,
    jobs: Mutex<BTreeMap<JobId, PackingJob>>,
    job_capacity: usize,
    statistics: Mutex<ServiceStatistics>,
    next_id: AtomicU64,
}

impl PackingService {
    pub fn new(registry: ConfigRegistry, config: &ServiceConfig) -> Self {
        Self {
            registry: RwLock::new(registry),
            cache: ResultCache::new(config.cache_capacity),
            jobs: Mutex::new(BTreeMap::new()),
            job_capacity: config.job_capacity.max(1),
            statistics: Mutex::new(ServiceStatistics::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Builds a service whose default configuration comes from `app`.
    pub fn from_config(app: &AppConfig) -> Result<Self> {
        let registry = ConfigRegistry::new(app.algorithm.clone())?;
        Ok(Self::new(registry, &app.service))
    }

    /// Adds a named configuration; see [`ConfigRegistry::register`].
    pub async fn register_config(&self, config: AlgorithmConfig) -> Result<()> {
        self.registry.write().await.register(config)
    }

    pub async fn config_names(&self) -> Vec<String> {
        self.registry.read().await.names()
    }

    /// Snapshot of a job record.
    pub async fn job(&self, id: JobId) -> Option<PackingJob> {
        self.jobs.lock().await.get(&id).cloned()
    }

    pub async fn jobs(&self) -> Vec<PackingJob> {
        self.jobs.lock().await.values().cloned().collect()
    }

    /// Removes a finished job record and hands it to the caller.
    ///
    /// Running jobs stay in place and yield `None`.
    pub async fn take_job(&self, id: JobId) -> Option<PackingJob> {
        let mut jobs = self.jobs.lock().await;
        if jobs.get(&id)?.status.is_terminal() {
            jobs.remove(&id)
        } else {
            None
        }
    }

    pub async fn statistics(&self) -> ServiceStatistics {
        self.statistics.lock().await.clone()
    }

    /// Runs a request to completion and returns the final job record.
    pub async fn run(&self, request: PackRequest) -> PackingJob {
        self.run_with_cancel(request, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// Runs several requests concurrently, records in request order.
    pub async fn run_batch(&self, requests: Vec<PackRequest>) -> Vec<PackingJob> {
        info!("📦 Running batch of {} packing requests", requests.len());
        join_all(requests.into_iter().map(|request| self.run(request))).await
    }

    /// Like [`PackingService::run`]; setting `cancel` fails the job at the next item.
    ///
    /// Dropping the returned future sets `cancel` as well, so an abandoned
    /// run stops at its next item boundary.
    pub async fn run_with_cancel(&self, request: PackRequest, cancel: Arc<AtomicBool>) -> PackingJob {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let resolved = {
            let registry = self.registry.read().await;
            request
                .resolve_config(&registry)
                .map_err(|err| (err, registry.default_config().clone()))
        };
        let input = request.into_input();
        let vehicle = input.vehicle.clone();

        let config = match resolved {
            Ok(config) => config,
            Err((err, fallback)) => {
                warn!("❌ Job {} rejected: {}", id, err);
                let mut job = PackingJob::new(id, vehicle, fallback, String::new());
                log_transition(job.fail(&err));
                return self.finish(job).await;
            }
        };

        let key = match fingerprint(&input, &config) {
            Ok(key) => key,
            Err(err) => {
                let mut job = PackingJob::new(id, vehicle, config, String::new());
                log_transition(job.fail(&err));
                return self.finish(job).await;
            }
        };

        let mut job = PackingJob::new(id, vehicle, config.clone(), key.clone());
        log_transition(job.start());
        self.store(job.clone()).await;
        debug!("Job {} started ({})", id, key);

        let guard = AbandonGuard {
            service: self,
            id,
            cancel: Arc::clone(&cancel),
            armed: true,
        };
        let use_cache = config.enable_caching && self.cache.capacity() > 0;
        let compute = move || execute(input, config, cancel);
        let outcome = if use_cache {
            self.cache.get_or_compute(&key, compute).await
        } else {
            compute().await.map(|response| (response, false))
        };
        guard.disarm();

        match outcome {
            Ok((response, from_cache)) => {
                info!(
                    "✅ Job {} completed: {} placed, {} unplaced{}",
                    id,
                    response.statistics.placed,
                    response.statistics.unplaced,
                    if from_cache { " (cached)" } else { "" }
                );
                log_transition(job.complete(response, from_cache));
            }
            Err(err) => {
                warn!("❌ Job {} failed: {}", id, err);
                log_transition(job.fail(&err));
            }
        }
        self.finish(job).await
    }

    async fn finish(&self, job: PackingJob) -> PackingJob {
        self.statistics.lock().await.record(&job);
        self.store(job).await
    }

    /// Stores a record; beyond capacity the oldest finished records go first.
    async fn store(&self, job: PackingJob) -> PackingJob {
        let mut jobs = self.jobs.lock().await;
        jobs.insert(job.id, job.clone());

        let excess = jobs.len().saturating_sub(self.job_capacity);
        if excess > 0 {
            let evicted: Vec<JobId> = jobs
                .values()
                .filter(|j| j.status.is_terminal())
                .map(|j| j.id)
                .take(excess)
                .collect();
            for id in evicted {
                debug!("Evicting job record {}", id);
                jobs.remove(&id);
            }
        }
        job
    }
}

/// Cancels a run whose caller dropped the future before it finished.
struct AbandonGuard<'a> {
    service: &'a PackingService,
    id: JobId,
    cancel: Arc<AtomicBool>,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.store(true, Ordering::Relaxed);
        warn!("🛑 Job {} abandoned by its caller", self.id);

        // Best effort: a contended lock leaves the record as running.
        if let Ok(mut jobs) = self.service.jobs.try_lock() {
            if let Some(job) = jobs.get_mut(&self.id) {
                log_transition(job.fail(&PackingError::Cancelled));
                if let Ok(mut statistics) = self.service.statistics.try_lock() {
                    statistics.record(job);
                }
            }
        }
    }
}

/// Runs the engine on a blocking thread.
async fn execute(input: PackingInput, config: AlgorithmConfig, cancel: Arc<AtomicBool>) -> Result<PackResponse> {
    let handle = tokio::task::spawn_blocking(move || {
        pack_items_with_progress(input, &config, &cancel, |event| trace!(?event, "pack event"))
    });
    match handle.await {
        Ok(result) => result.map(PackResponse::from_packing_result),
        Err(join_err) => Err(PackingError::Internal(format!(
            "packing worker stopped: {}",
            join_err
        ))),
    }
}

fn log_transition(outcome: std::result::Result<(), JobError>) {
    if let Err(err) = outcome {
        warn!("⚠️ {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    use crate::api::ItemRequest;
    use crate::model::{RotationPermission, Vehicle};
    use crate::types::Vec3;

    fn service() -> PackingService {
        PackingService::new(ConfigRegistry::default(), &ServiceConfig::default())
    }

    fn request(ids: &[&str]) -> PackRequest {
        PackRequest::new(
            &Vehicle::new(Vec3::new(100.0, 40.0, 40.0), 1000.0).unwrap(),
            ids.iter()
                .map(|id| ItemRequest::new(*id, (20.0, 20.0, 20.0), 10.0))
                .collect(),
        )
    }

    fn euroliner_request() -> PackRequest {
        PackRequest::new(
            &Vehicle::euroliner(),
            vec![
                ItemRequest::new("box1", (1000.0, 800.0, 600.0), 50.0),
                ItemRequest::new("box2", (1200.0, 900.0, 700.0), 60.0),
                ItemRequest::new("box3", (800.0, 600.0, 500.0), 40.0),
                ItemRequest::new("pallet1", (1200.0, 800.0, 150.0), 200.0)
                    .with_rotation(RotationPermission::Fixed)
                    .palletized(true),
            ],
        )
    }

    #[tokio::test]
    async fn euroliner_sample_loads_completely() {
        let service = service();
        let job = service.run(euroliner_request()).await;

        assert_eq!(job.status, JobStatus::Completed);
        let response = job.response.as_ref().unwrap();
        assert!(response.is_complete);
        assert_eq!(response.statistics.placed, 4);
        assert_eq!(response.total_weight, 350.0);
        assert!(response.efficiency_percent > 0.0);

        let pallet = response.placed.iter().find(|p| p.id == "pallet1").unwrap();
        assert_eq!(pallet.dims, (1200.0, 800.0, 150.0));
    }

    #[tokio::test]
    async fn completed_jobs_can_be_queried_again() {
        let service = service();
        let job = service.run(request(&["a", "b"])).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.from_cache);

        let again = service.job(job.id).await.unwrap();
        assert_eq!(again, job);
        assert_eq!(service.job(job.id).await.unwrap(), again);
        assert_eq!(again.completed_at, job.completed_at);
        assert!(service.job(job.id + 100).await.is_none());
    }

    #[tokio::test]
    async fn identical_requests_hit_the_cache() {
        let service = service();
        let first = service.run(request(&["a", "b"])).await;
        let second = service.run(request(&["b", "a"])).await;

        assert_ne!(first.id, second.id);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(second.from_cache);
        assert_eq!(first.response, second.response);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_requests_compute_once() {
        let service = Arc::new(service());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.run(euroliner_request()).await })
            })
            .collect();

        let mut jobs = Vec::new();
        for handle in handles {
            jobs.push(handle.await.unwrap());
        }

        assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
        assert_eq!(jobs.iter().filter(|j| !j.from_cache).count(), 1);
        let first = jobs[0].response.as_ref().unwrap();
        assert!(jobs.iter().all(|j| j.response.as_ref() == Some(first)));
    }

    #[tokio::test]
    async fn caching_can_be_disabled_per_request() {
        let service = service();
        service.run(request(&["a"])).await;

        let mut uncached = request(&["a"]);
        uncached.config_override = Some(crate::config::AlgorithmConfigOverride {
            enable_caching: Some(false),
            ..Default::default()
        });
        let job = service.run(uncached).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.from_cache);
    }

    #[tokio::test]
    async fn run_scoped_errors_fail_the_job() {
        let service = service();

        let mut unknown = request(&["a"]);
        unknown.config_name = Some("night-shift".into());
        let job = service.run(unknown).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some("configuration_error"));

        let job = service.run(request(&[])).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some("empty_request"));
        assert!(job.response.is_none());
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn cancelled_runs_fail_and_are_not_cached() {
        let service = service();
        let cancel = Arc::new(AtomicBool::new(true));
        let job = service.run_with_cancel(request(&["a"]), cancel).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some("cancelled"));
        assert!(job.response.is_none());
        assert!(job.error.as_deref().unwrap().contains("cancelled"));

        let retry = service.run(request(&["a"])).await;
        assert_eq!(retry.status, JobStatus::Completed);
        assert!(!retry.from_cache);
    }

    #[tokio::test]
    async fn dropping_the_future_cancels_the_run() {
        let service = service();
        let items = (0..60)
            .map(|i| ItemRequest::new(format!("crate-{}", i), (400.0, 300.0, 250.0), 5.0))
            .collect();
        let large = PackRequest::new(&Vehicle::euroliner(), items);
        let cancel = Arc::new(AtomicBool::new(false));

        // One poll starts the worker, then the future is dropped.
        let early = service
            .run_with_cancel(large.clone(), Arc::clone(&cancel))
            .now_or_never();
        assert!(early.is_none());
        assert!(cancel.load(Ordering::Relaxed));

        let abandoned = service.jobs().await;
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].status, JobStatus::Failed);
        assert_eq!(abandoned[0].error_code.as_deref(), Some("cancelled"));

        // The slot left behind does not block a later identical request.
        let job = service.run(large).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.from_cache);
    }

    #[tokio::test]
    async fn batches_keep_request_order() {
        let service = service();
        service
            .register_config(
                AlgorithmConfig::builder()
                    .name("single-layer")
                    .max_stack_height(1)
                    .is_default(false)
                    .build(),
            )
            .await
            .unwrap();
        let mut layered = request(&["x", "y"]);
        layered.config_name = Some("single-layer".into());

        let jobs = service
            .run_batch(vec![request(&["a"]), layered, request(&[]), euroliner_request()])
            .await;
        let statuses: Vec<JobStatus> = jobs.iter().map(|j| j.status).collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Completed,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Completed
            ]
        );
        assert_eq!(jobs[1].config.name, "single-layer");
        assert_ne!(jobs[0].fingerprint, jobs[3].fingerprint);
        assert_eq!(service.jobs().await.len(), 4);
        assert_eq!(service.config_names().await, vec!["default", "single-layer"]);
    }

    #[tokio::test]
    async fn job_records_are_bounded_and_can_be_taken() {
        let config = ServiceConfig {
            job_capacity: 2,
            ..ServiceConfig::default()
        };
        let service = PackingService::new(ConfigRegistry::default(), &config);

        let first = service.run(request(&["a"])).await;
        let second = service.run(request(&["b"])).await;
        let third = service.run(request(&["c"])).await;

        assert!(service.job(first.id).await.is_none());
        assert_eq!(service.jobs().await.len(), 2);

        assert_eq!(service.take_job(second.id).await, Some(second.clone()));
        assert!(service.job(second.id).await.is_none());
        assert!(service.take_job(second.id).await.is_none());
        assert_eq!(service.job(third.id).await, Some(third));
    }

    #[tokio::test]
    async fn statistics_aggregate_finished_jobs() {
        let service = service();
        assert_eq!(service.statistics().await, ServiceStatistics::default());

        let first = service.run(request(&["a", "b"])).await;
        service.run(request(&["b", "a"])).await;
        service.run(request(&[])).await;

        let stats = service.statistics().await;
        assert_eq!(stats.total_optimizations, 2);
        assert_eq!(stats.computed, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.failed, 1);

        let engine_ms = first.response.as_ref().unwrap().execution_time_ms;
        assert_eq!(stats.total_execution_time_ms, engine_ms);
        assert_eq!(stats.average_execution_time_ms, engine_ms as f64);
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn environment_settings_reach_the_engine() {
        let app = AppConfig::from_lookup(|name: &str| match name {
            "LOAD_PLANNER_MAX_STACK_HEIGHT" => Some("1".to_string()),
            "LOAD_PLANNER_ENABLE_CACHING" => Some("false".to_string()),
            _ => None,
        });
        let service = PackingService::from_config(&app).unwrap();

        let column = PackRequest::new(
            &Vehicle::new(Vec3::new(10.0, 10.0, 30.0), 1000.0).unwrap(),
            vec![
                ItemRequest::new("c", (10.0, 10.0, 10.0), 5.0)
                    .with_quantity(2)
                    .with_rotation(RotationPermission::Fixed),
            ],
        );
        let job = service.run(column.clone()).await;
        assert_eq!(job.config.max_stack_height, 1);
        assert_eq!(job.response.as_ref().unwrap().statistics.placed, 1);

        let again = service.run(column).await;
        assert!(!again.from_cache);
        assert_eq!(again.config, job.config);
        assert!(!again.config.enable_caching);
    }
}
