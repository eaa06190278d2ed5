use std::time::Duration;
use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use super::endpoint::{Worker, WorkerExit};

/// Result of waiting for a freshly launched worker.
#[derive(Debug)]
pub(crate) enum Readiness {
    Ready,
    /// The worker ended cleanly without signalling.
    Exited(WorkerExit),
    /// The worker returned an error or panicked before signalling.
    Faulted(anyhow::Error),
    TimedOut,
    Cancelled,
}

/// Poll `ready` and the worker every `poll_interval` until one of them settles, `timeout`
/// elapses, or `cancel` fires.
pub(crate) async fn wait_ready(
    mut ready: oneshot::Receiver<()>,
    worker: &Worker,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Readiness {
    let deadline = Instant::now() + timeout;
    loop {
        match ready.try_recv() {
            Ok(()) => return Readiness::Ready,
            Err(TryRecvError::Closed) => return reap(worker).await,
            Err(TryRecvError::Empty) => {}
        }
        if worker.is_finished() {
            // The signal may have landed between the two checks.
            if ready.try_recv().is_ok() {
                return Readiness::Ready;
            }
            return reap(worker).await;
        }

        let now = Instant::now();
        if now >= deadline {
            return Readiness::TimedOut;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Readiness::Cancelled,
            () = tokio::time::sleep(poll_interval.min(deadline - now)) => {}
        }
    }
}

async fn reap(worker: &Worker) -> Readiness {
    match worker.join().await {
        Some(Ok(exit)) => Readiness::Exited(exit),
        Some(Err(e)) => Readiness::Faulted(e),
        // Joined by a concurrent teardown; that path reports the outcome.
        None => Readiness::Exited(WorkerExit::Superseded),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::lifecycle::ReadySignal;
    use std::sync::mpsc;

    const POLL: Duration = Duration::from_millis(20);
    const SECS_5: Duration = Duration::from_secs(5);

    type Action = Box<dyn FnOnce(ReadySignal) -> anyhow::Result<WorkerExit> + Send>;

    fn action(f: impl FnOnce(ReadySignal) -> anyhow::Result<WorkerExit> + Send + 'static) -> Action {
        Box::new(f)
    }

    /// A worker that blocks until told what to do.
    fn fake_worker() -> (Worker, oneshot::Receiver<()>, mpsc::Sender<Action>) {
        let (ready, ready_rx) = ReadySignal::channel();
        let (tx, rx) = mpsc::channel::<Action>();
        let handle = std::thread::spawn(move || match rx.recv() {
            Ok(action) => action(ready),
            Err(_) => Ok(WorkerExit::Served),
        });
        (Worker::new(handle), ready_rx, tx)
    }

    #[tokio::test]
    async fn ready_signal_wins() {
        let (worker, ready, tx) = fake_worker();
        tx.send(action(|ready| {
            ready.notify();
            std::thread::sleep(Duration::from_millis(200));
            Ok(WorkerExit::Served)
        }))
        .unwrap();
        let outcome = wait_ready(ready, &worker, SECS_5, POLL, &CancellationToken::new()).await;
        assert!(matches!(outcome, Readiness::Ready));
    }

    #[tokio::test]
    async fn silent_worker_times_out() {
        let (worker, ready, tx) = fake_worker();
        let started = Instant::now();
        let outcome = wait_ready(
            ready,
            &worker,
            Duration::from_millis(150),
            POLL,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(outcome, Readiness::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(150));
        drop(tx);
        assert!(worker.join().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn worker_error_is_a_fault() {
        let (worker, ready, tx) = fake_worker();
        tx.send(action(|_ready| anyhow::bail!("port in use"))).unwrap();
        let outcome = wait_ready(ready, &worker, SECS_5, POLL, &CancellationToken::new()).await;
        match outcome {
            Readiness::Faulted(e) => assert_eq!(e.to_string(), "port in use"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_panic_is_a_fault() {
        let (worker, ready, tx) = fake_worker();
        tx.send(action(|_ready| panic!("boom"))).unwrap();
        let outcome = wait_ready(ready, &worker, SECS_5, POLL, &CancellationToken::new()).await;
        match outcome {
            Readiness::Faulted(e) => assert!(e.to_string().contains("boom")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_exit_without_signal_is_reported() {
        let (worker, ready, tx) = fake_worker();
        tx.send(action(|_ready| Ok(WorkerExit::Superseded))).unwrap();
        let outcome = wait_ready(ready, &worker, SECS_5, POLL, &CancellationToken::new()).await;
        assert!(matches!(outcome, Readiness::Exited(WorkerExit::Superseded)));
    }

    #[tokio::test]
    async fn caller_cancellation_stops_waiting() {
        let (worker, ready, tx) = fake_worker();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let outcome = wait_ready(ready, &worker, SECS_5, POLL, &cancel).await;
        assert!(matches!(outcome, Readiness::Cancelled));
        drop(tx);
        assert!(worker.join().await.unwrap().is_ok());
    }
}
