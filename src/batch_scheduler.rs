//! Bounded worker pool that resolves a batch of entities.

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroU32;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::config::Config;
use crate::entity_resolver::AssetResolver;
use crate::protocol::{BatchResult, EntityTask, TaskOutcome};

const DISPATCH_POLL_INTERVAL: Duration = Duration::from_millis(25);

type DispatchLimiter =
    RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Entity that produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostEntity {
    pub task: EntityTask,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub result: BatchResult,
    pub lost: Vec<LostEntity>,
    /// Tasks submitted after slug deduplication.
    pub submitted: usize,
}

impl BatchReport {
    /// Records produced and entities lost, for the end-of-run log line.
    pub fn summary_line(&self) -> String {
        format!(
            "Total processed: {}. Failures: {}.",
            self.result.total_resolved,
            self.lost.len()
        )
    }
}

pub struct BatchScheduler {
    concurrency: usize,
    polite_delay: Duration,
}

impl BatchScheduler {
    pub fn new(concurrency: usize, polite_delay: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            polite_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.batch.concurrency, config.polite_delay())
    }

    fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
        if let Some(s) = payload.downcast_ref::<&str>() {
            return (*s).to_string();
        }
        if let Some(s) = payload.downcast_ref::<String>() {
            return s.clone();
        }
        "non-string panic payload".to_string()
    }

    /// One task per distinct slug, first-seen name wins, input order kept.
    pub fn dedup_tasks<S: AsRef<str>>(names: &[S]) -> Vec<EntityTask> {
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            let task = EntityTask::new(name);
            if task.slug.is_empty() {
                warn!("Skipping '{}': name has no slug-able characters", name);
                continue;
            }
            if seen.insert(task.slug.clone()) {
                tasks.push(task);
            } else {
                debug!("Skipping duplicate '{}' (slug {})", name, task.slug);
            }
        }
        tasks
    }

    /// Spreads worker starts so the pool as a whole starts at most one entity
    /// per `polite_delay / workers`.
    fn dispatch_limiter(&self, worker_count: usize) -> Option<DispatchLimiter> {
        let workers = u32::try_from(worker_count).ok()?.max(1);
        let period = self.polite_delay / workers;
        let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::new(workers)?);
        Some(RateLimiter::direct(quota))
    }

    fn wait_for_dispatch_slot(limiter: Option<&DispatchLimiter>) {
        let Some(limiter) = limiter else {
            return;
        };
        while limiter.check().is_err() {
            thread::sleep(DISPATCH_POLL_INTERVAL);
        }
    }

    fn worker_loop(
        queue: Arc<Mutex<VecDeque<EntityTask>>>,
        resolver: Arc<dyn AssetResolver>,
        limiter: Arc<Option<DispatchLimiter>>,
        outcomes: UnboundedSender<TaskOutcome>,
        polite_delay: Duration,
    ) {
        loop {
            let next = queue.lock().expect("task queue lock poisoned").pop_front();
            let Some(task) = next else {
                break;
            };
            Self::wait_for_dispatch_slot((*limiter).as_ref());

            let resolved = panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(&task)));
            let outcome = match resolved {
                Ok(asset) => TaskOutcome::Resolved(asset),
                Err(payload) => TaskOutcome::Lost {
                    reason: Self::panic_payload_to_string(payload.as_ref()),
                    task,
                },
            };
            if outcomes.send(outcome).is_err() {
                break;
            }

            let more_work = !queue.lock().expect("task queue lock poisoned").is_empty();
            if more_work && !polite_delay.is_zero() {
                thread::sleep(polite_delay);
            }
        }
    }

    /// Resolves every distinct entity and collects records in completion order.
    pub fn run<S: AsRef<str>>(
        &self,
        names: &[S],
        resolver: Arc<dyn AssetResolver>,
    ) -> BatchReport {
        let tasks = Self::dedup_tasks(names);
        let submitted = tasks.len();
        let worker_count = self.concurrency.min(submitted.max(1));
        let queue = Arc::new(Mutex::new(tasks.into_iter().collect::<VecDeque<_>>()));
        let limiter = Arc::new(self.dispatch_limiter(worker_count));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        info!("Resolving {} entities with {} worker(s)", submitted, worker_count);
        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let queue = Arc::clone(&queue);
            let resolver = Arc::clone(&resolver);
            let limiter = Arc::clone(&limiter);
            let outcomes = outcome_tx.clone();
            let polite_delay = self.polite_delay;
            let spawned = thread::Builder::new()
                .name(format!("resolver-{index}"))
                .spawn(move || {
                    Self::worker_loop(queue, resolver, limiter, outcomes, polite_delay);
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => error!("Failed to start resolver worker {}: {}", index, err),
            }
        }
        drop(outcome_tx);

        let mut assets = Vec::with_capacity(submitted);
        let mut lost = Vec::new();
        let mut completed = 0usize;
        while let Some(outcome) = outcome_rx.blocking_recv() {
            completed += 1;
            match outcome {
                TaskOutcome::Resolved(asset) => {
                    info!("Resolved {}/{}: {}", completed, submitted, asset.name);
                    assets.push(asset);
                }
                TaskOutcome::Lost { task, reason } => {
                    error!("Failed {}: {}", task.name, reason);
                    lost.push(LostEntity { task, reason });
                }
            }
        }

        for handle in handles {
            if handle.join().is_err() {
                warn!("A resolver worker exited abnormally");
            }
        }
        let stranded: Vec<EntityTask> = queue
            .lock()
            .expect("task queue lock poisoned")
            .drain(..)
            .collect();
        for task in stranded {
            error!("Failed {}: no worker picked it up", task.name);
            lost.push(LostEntity {
                task,
                reason: "no worker available".to_string(),
            });
        }

        BatchReport {
            result: BatchResult::from_assets(assets, Utc::now()),
            lost,
            submitted,
        }
    }
}
