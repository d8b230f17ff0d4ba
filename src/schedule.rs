use std::{collections::HashMap, fmt::Display, future::Future, sync::Arc};

use tokio::{
    sync::Semaphore,
    task::{Id, JoinError, JoinSet},
};
use tracing::{error, info, warn};

#[derive(Debug)]
pub struct RunReport<T> {
    /// Successful results, ordered by pipeline index.
    pub completed: Vec<(usize, T)>,
    pub failed: Vec<usize>,
}

impl<T> RunReport<T> {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Runs `n` independent pipelines with at most `worker_limit` in flight.
#[derive(Debug, Clone, Copy)]
pub struct WorkSchedule {
    worker_limit: usize,
}

impl WorkSchedule {
    pub fn new(worker_limit: usize) -> Self {
        Self {
            worker_limit: worker_limit.max(1),
        }
    }

    /// A pipeline is only started once a worker slot is free, so at most
    /// `worker_limit` futures exist at any time.
    pub async fn run<F, Fut, T, E>(&self, n: usize, pipeline: F) -> RunReport<T>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let slots = Arc::new(Semaphore::new(self.worker_limit));
        let mut tasks = JoinSet::new();
        // a panicked task only hands back its id
        let mut indices = HashMap::new();
        let mut report = RunReport::new();

        for index in 0..n {
            let Ok(permit) = slots.clone().acquire_owned().await else {
                error!(index, "worker pool closed, not starting remaining pipelines");
                break;
            };
            while let Some(joined) = tasks.try_join_next_with_id() {
                Self::record(&mut report, &mut indices, joined);
            }
            let unit = pipeline(index);
            let handle = tasks.spawn(async move {
                let result = unit.await;
                drop(permit);
                result
            });
            indices.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            Self::record(&mut report, &mut indices, joined);
        }

        report.completed.sort_by_key(|(index, _)| *index);
        report.failed.sort_unstable();
        info!(
            succeeded = report.completed.len(),
            failed = report.failed.len(),
            "run finished"
        );
        report
    }

    fn record<T, E: Display>(
        report: &mut RunReport<T>,
        indices: &mut HashMap<Id, usize>,
        joined: Result<(Id, Result<T, E>), JoinError>,
    ) {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(err) => err.id(),
        };
        let Some(index) = indices.remove(&id) else {
            error!(task = %id, "finished task was never scheduled");
            return;
        };
        match joined {
            Ok((_, Ok(value))) => report.completed.push((index, value)),
            Ok((_, Err(err))) => {
                warn!(index, error = %err, "pipeline abandoned");
                report.failed.push(index);
            }
            Err(err) => {
                error!(index, error = %err, "pipeline task panicked");
                report.failed.push(index);
            }
        }
    }
}
