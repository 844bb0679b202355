//! Batch operations: per key outcomes, their summary, and the bounded worker
//! pool concurrent batches are dispatched on.

use std::thread;

use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
/// Outcome of one key of a batch.
pub struct KeyOutcome<T> {
    pub key: String,
    pub outcome: T,
    pub hops: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// Per key outcomes of a batch, in submission order, and their hop totals.
pub struct BatchReport<T> {
    pub results: Vec<KeyOutcome<T>>,
    pub total_hops: u64,
}

impl<T> BatchReport<T> {
    pub(crate) fn from_results(results: Vec<KeyOutcome<T>>) -> Self {
        let total_hops = results.iter().map(|r| r.hops as u64).sum();

        BatchReport {
            results,
            total_hops,
        }
    }

    // === Getters ===

    pub fn total_keys(&self) -> usize {
        self.results.len()
    }

    /// Mean hops per key, `0.0` for an empty batch.
    pub fn average_hops(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }

        self.total_hops as f64 / self.results.len() as f64
    }

    /// First outcome for `key`.
    pub fn get(&self, key: &str) -> Option<&KeyOutcome<T>> {
        self.results.iter().find(|r| r.key == key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyOutcome<T>> {
        self.results.iter()
    }
}

impl BatchReport<bool> {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome).count()
    }
}

impl<V> BatchReport<Option<V>> {
    pub fn found_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_some()).count()
    }

    pub fn not_found_count(&self) -> usize {
        self.results.len() - self.found_count()
    }
}

/// Run `work` over `jobs` on at most `workers` scoped threads, returning the
/// results in the order of `jobs`.
///
/// Jobs wait in a queue until a worker is free; every job runs exactly once.
pub(crate) fn run_pool<T, R, F>(jobs: Vec<T>, workers: usize, work: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = jobs.len();
    if total == 0 {
        return Vec::new();
    }

    let workers = workers.clamp(1, total);

    let (job_tx, job_rx) = flume::unbounded::<(usize, T)>();
    let (result_tx, result_rx) = flume::unbounded::<(usize, R)>();

    for job in jobs.into_iter().enumerate() {
        // Receiver is alive until the scope below ends.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    trace!(total, workers, "Dispatching batch");

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let work = &work;

            scope.spawn(move || {
                while let Ok((index, job)) = job_rx.recv() {
                    let _ = result_tx.send((index, work(job)));
                }
            });
        }
    });
    drop(result_tx);

    let mut results: Vec<(usize, R)> = result_rx.drain().collect();
    results.sort_by_key(|(index, _)| *index);

    results.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn pool_preserves_order_and_runs_everything() {
        let calls = AtomicUsize::new(0);
        let jobs: Vec<u32> = (0..200).collect();

        let results = run_pool(jobs, 8, |n| {
            calls.fetch_add(1, Ordering::Relaxed);
            n * 2
        });

        assert_eq!(calls.load(Ordering::Relaxed), 200);
        assert_eq!(results, (0..200).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn pool_empty_and_single_worker() {
        let results: Vec<u8> = run_pool(Vec::<u8>::new(), 4, |n| n);
        assert!(results.is_empty());

        let results = run_pool(vec![3, 1, 2], 0, |n: i32| -n);
        assert_eq!(results, vec![-3, -1, -2]);
    }

    #[test]
    fn report_summary() {
        let report = BatchReport::from_results(vec![
            KeyOutcome {
                key: "a".into(),
                outcome: Some(1),
                hops: 3,
            },
            KeyOutcome {
                key: "b".into(),
                outcome: None,
                hops: 2,
            },
        ]);

        assert_eq!(report.total_keys(), 2);
        assert_eq!(report.total_hops, 5);
        assert_eq!(report.average_hops(), 2.5);
        assert_eq!(report.found_count(), 1);
        assert_eq!(report.not_found_count(), 1);
        assert_eq!(report.get("b").map(|r| r.hops), Some(2));

        let empty = BatchReport::<bool>::from_results(vec![]);
        assert_eq!(empty.average_hops(), 0.0);
        assert_eq!(empty.success_count(), 0);
    }
}
