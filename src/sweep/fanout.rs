//! Bounded-concurrency fan-out over sweep targets.
//!
//! Workers do the remote calls and return values; they never write reports
//! or touch shared state. The coordinator collects every outcome and hands
//! them back in input order, so downstream output is deterministic no matter
//! how completion interleaves.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Run `work` once per target with at most `concurrency` calls in flight.
///
/// Each worker's failure is isolated: one `Err` never cancels the others.
/// The returned pairs follow the input order of `targets`.
pub async fn run<T, R, F, Fut>(
    targets: Vec<T>,
    concurrency: usize,
    work: F,
) -> Vec<(T, anyhow::Result<R>)>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = targets.len();
    let mut join_set = JoinSet::new();

    for (index, target) in targets.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let work = work.clone();
        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(closed) => {
                    return (index, target, Err(anyhow::Error::new(closed)));
                }
            };
            let result = work(target.clone()).await;
            (index, target, result)
        });
    }

    let mut slots: Vec<Option<(T, anyhow::Result<R>)>> = Vec::new();
    slots.resize_with(total, || None);

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, target, result)) => slots[index] = Some((target, result)),
            Err(err) => tracing::error!(error = %err, "sweep worker panicked"),
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_results_come_back_in_input_order() {
        let targets = vec!["c".to_string(), "a".to_string(), "b".to_string()];

        let outcomes = run(targets, 3, |target: String| async move {
            // Later inputs finish first
            let delay = match target.as_str() {
                "c" => 30,
                "a" => 20,
                _ => 1,
            };
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok::<_, anyhow::Error>(target.to_uppercase())
        })
        .await;

        let ids: Vec<&str> = outcomes.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(outcomes[0].1.as_ref().unwrap(), "C");
        assert_eq!(outcomes[2].1.as_ref().unwrap(), "B");
    }

    #[tokio::test]
    async fn test_one_failure_does_not_cancel_the_rest() {
        let targets = vec![1, 2, 3, 4];

        let outcomes = run(targets, 2, |n: i32| async move {
            if n == 2 {
                anyhow::bail!("boom");
            }
            Ok(n * 10)
        })
        .await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[1].1.is_err());
        let successes: Vec<i32> = outcomes
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok().copied())
            .collect();
        assert_eq!(successes, vec![10, 30, 40]);
    }

    #[tokio::test]
    async fn test_pool_overlaps_workers_up_to_the_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let targets: Vec<usize> = (0..12).collect();
        let limit = 3;

        let in_flight_handle = Arc::clone(&in_flight);
        let peak_handle = Arc::clone(&peak);

        let outcomes = run(targets, limit, move |_n: usize| {
            let in_flight = Arc::clone(&in_flight_handle);
            let peak = Arc::clone(&peak_handle);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(outcomes.len(), 12);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= limit);
        // Each worker parks on its sleep while holding a permit, so a pool
        // that does not serialize always gets at least two in flight.
        assert!(peak >= 2, "workers ran one at a time, peak {peak}");
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let outcomes = run(vec![1], 0, |n: i32| async move { Ok(n) }).await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].1.is_ok());
    }
}
