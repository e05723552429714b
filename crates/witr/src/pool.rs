//! Bounded parallel resolution of many PIDs

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run `job` for every PID on the blocking pool, at most `workers` at a time.
///
/// Results come back in input order, paired with their PID.
pub async fn resolve_all<T, F>(
    pids: Vec<u32>,
    workers: usize,
    job: F,
) -> anyhow::Result<Vec<(u32, witr_core::Result<T>)>>
where
    T: Send + 'static,
    F: Fn(u32) -> witr_core::Result<T> + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let job = Arc::new(job);

    let mut handles = Vec::with_capacity(pids.len());
    for pid in pids {
        let permit = semaphore.clone().acquire_owned().await?;
        let job = job.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(pid)
        });
        handles.push((pid, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (pid, handle) in handles {
        results.push((pid, handle.await?));
    }
    Ok(results)
}
