//! # Bounded worker pool
//!
//! Batch operations over many products (downloads, calibrations) run each item as a
//! blocking job on a tokio runtime, at most `width` at a time:
//!
//! ```text
//! items ──► Semaphore(width) ──► JoinSet::spawn_blocking(job(item)) ──► results[i]
//! ```
//!
//! * Jobs share no mutable state; whatever they need is moved or shared read-only (`Arc`).
//! * A job that fails or panics only produces an error for its own item; the others run on.
//! * Results come back in input order.
//! * With the `progress` feature a bar counts finished jobs.
//!
//! ## Calling from async code
//! -----------------
//! [`run_bounded`] and the blocking download wrapper start their own runtime. Through
//! [`outside_runtime`] they do so on a dedicated thread when the caller already runs inside
//! a tokio runtime (current-thread or multi-thread), since a runtime cannot be blocked on
//! from within another one.
use std::any::Any;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::planetary_errors::PlanetaryError;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(feature = "progress")]
fn pool_bar(total: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template("{msg} [{elapsed_precise}] {bar:40.green/white} {pos}/{len}")
            .expect("indicatif template"),
    );
    pb.set_message(label.to_string());
    pb
}

/// Run blocking `work` that starts its own tokio runtime.
///
/// Outside of any runtime `work` runs on the calling thread. Inside a runtime it runs on a
/// scoped thread and the caller's thread waits for it.
///
/// Return
/// ----------
/// * The result of `work`, or [`PlanetaryError::WorkerFailure`] if it panicked on the
///   dedicated thread.
pub fn outside_runtime<T, W>(work: W) -> Result<T, PlanetaryError>
where
    T: Send,
    W: FnOnce() -> Result<T, PlanetaryError> + Send,
{
    if tokio::runtime::Handle::try_current().is_err() {
        return work();
    }
    std::thread::scope(|scope| scope.spawn(work).join())
        .map_err(|payload| PlanetaryError::WorkerFailure(panic_message(payload)))?
}

/// Run `job` on every item with at most `width` jobs at a time.
///
/// Arguments
/// -----------------
/// * `items`: the work items, e.g. product ids.
/// * `width`: maximum number of concurrent jobs (at least one is used).
/// * `label`: name of the batch, for logs and the progress bar.
/// * `job`: the blocking work for one item.
///
/// Return
/// ----------
/// * One result per item, in input order. A panicking job gives
///   [`PlanetaryError::WorkerFailure`] for its item. The outer error is only returned when
///   the runtime cannot be started.
///
/// May be called from async code, see [`outside_runtime`].
pub fn run_bounded<T, R, F>(
    items: Vec<T>,
    width: usize,
    label: &str,
    job: F,
) -> Result<Vec<Result<R, PlanetaryError>>, PlanetaryError>
where
    T: Display + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Result<R, PlanetaryError> + Send + Sync + 'static,
{
    let width = width.max(1);
    info!(items = items.len(), width, "{}", label);
    outside_runtime(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(width)
            .enable_all()
            .build()?;
        Ok(runtime.block_on(run_jobs(items, width, label, job)))
    })
}

async fn run_jobs<T, R, F>(
    items: Vec<T>,
    width: usize,
    label: &str,
    job: F,
) -> Vec<Result<R, PlanetaryError>>
where
    T: Display + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Result<R, PlanetaryError> + Send + Sync + 'static,
{
    let names: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    let mut results: Vec<Result<R, PlanetaryError>> = names
        .iter()
        .map(|n| Err(PlanetaryError::WorkerFailure(n.clone())))
        .collect();

    #[cfg(feature = "progress")]
    let pb = pool_bar(items.len(), label);
    #[cfg(not(feature = "progress"))]
    let _ = label;

    let semaphore = Arc::new(Semaphore::new(width));
    let job = Arc::new(job);
    let mut set = JoinSet::new();

    for (idx, item) in items.into_iter().enumerate() {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let job = Arc::clone(&job);
        set.spawn_blocking(move || {
            let _permit = permit;
            (idx, catch_unwind(AssertUnwindSafe(|| (*job)(item))))
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Ok(result))) => {
                if let Err(e) = &result {
                    warn!(item = %names[idx], error = %e, "job failed");
                }
                results[idx] = result;
            }
            Ok((idx, Err(payload))) => {
                let msg = panic_message(payload);
                warn!(item = %names[idx], %msg, "job panicked");
                results[idx] = Err(PlanetaryError::WorkerFailure(format!(
                    "{}: {msg}",
                    names[idx]
                )));
            }
            Err(e) => warn!(error = %e, "worker task lost"),
        }
        #[cfg(feature = "progress")]
        pb.inc(1);
    }

    #[cfg(feature = "progress")]
    pb.finish_and_clear();
    results
}

#[cfg(test)]
mod pool_test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_results_in_input_order() {
        let items: Vec<u64> = (0..20).collect();
        let results = run_bounded(items, 6, "square", |i| {
            std::thread::sleep(Duration::from_millis(20 - i));
            Ok(i * i)
        })
        .unwrap();
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..20).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_failures_stay_local() {
        let results = run_bounded(vec!["a", "boom", "err", "b"], 2, "mixed", |s| match s {
            "boom" => panic!("exploded"),
            "err" => Err(PlanetaryError::ProductNotFound(s.to_string())),
            _ => Ok(s.len()),
        })
        .unwrap();
        assert_eq!(results[0], Ok(1));
        assert_eq!(
            results[1],
            Err(PlanetaryError::WorkerFailure("boom: exploded".into()))
        );
        assert_eq!(results[2], Err(PlanetaryError::ProductNotFound("err".into())));
        assert_eq!(results[3], Ok(1));
    }

    #[test]
    fn test_width_is_respected() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        run_bounded((0..24).collect::<Vec<u32>>(), 3, "bounded", move |_| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_from_multi_thread_runtime() {
        let results = run_bounded(vec![1u32, 2], 2, "nested", |i| Ok(i + 1)).unwrap();
        assert_eq!(results, vec![Ok(2), Ok(3)]);
    }

    #[tokio::test]
    async fn test_run_from_current_thread_runtime() {
        let results = run_bounded(vec![1u32, 2], 2, "nested", |i| Ok(i * 10)).unwrap();
        assert_eq!(results, vec![Ok(10), Ok(20)]);
    }

    #[test]
    fn test_outside_runtime_reports_panic() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let _guard = rt.enter();
        let result: Result<(), PlanetaryError> = outside_runtime(|| panic!("lost"));
        assert_eq!(result, Err(PlanetaryError::WorkerFailure("lost".into())));
    }
}
