//! Bounded-concurrency task executor shared by the probing stages.
//!
//! The executor applies one probe future per work item with at most `N`
//! probes in flight. Every item yields exactly one [`ProbeOutcome`]: a probe
//! that overruns the per-operation timeout is recorded as timed out instead of
//! being dropped.

use crate::types::{ProbeError, ProbeOutcome};
use futures::stream::{self, StreamExt};
use log::debug;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy)]
pub struct TaskExecutor {
    concurrency: usize,
    timeout: Duration,
}

impl TaskExecutor {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Concurrency actually used for `item_count` items: never more workers than work.
    pub fn effective_limit(&self, item_count: usize) -> usize {
        self.concurrency.min(item_count).max(1)
    }

    /// Run `probe` over every item and return all outcomes, in completion order.
    pub async fn run<T, F, Fut>(&self, items: &[T], probe: F) -> Vec<ProbeOutcome<T>>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = ProbeOutcome<T>>,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let limit = self.effective_limit(items.len());
        let per_operation = self.timeout;
        let outcomes = Mutex::new(Vec::with_capacity(items.len()));

        debug!("Executing {} probes with concurrency {}", items.len(), limit);

        {
            let outcomes = &outcomes;
            let probe = &probe;
            stream::iter(items.iter().cloned())
                .for_each_concurrent(limit, |item| async move {
                    let outcome = match timeout(per_operation, probe(item.clone())).await {
                        Ok(outcome) => outcome,
                        Err(_) => ProbeOutcome::failed(item, ProbeError::TimedOut),
                    };
                    outcomes.lock().push(outcome);
                })
                .await;
        }

        outcomes.into_inner()
    }
}
