use tokio::sync::mpsc;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A handle to an execution context that runs posted closures in order.
///
/// Every completion and event-handler callback is delivered through the
/// dispatcher supplied at submission/registration time, never inline on the
/// channel's I/O task. Jobs posted to one dispatcher run sequentially on a
/// dedicated worker task; distinct dispatchers run independently.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Spawn a worker task on the current tokio runtime and return a handle
    /// posting to it. The worker exits when every handle is dropped.
    pub fn spawned() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            debug!("Dispatcher worker exiting");
        });
        Self { tx }
    }

    /// Post a closure. Returns false if the worker is gone, in which case
    /// the closure is dropped unrun.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jobs_run_in_post_order() {
        let dispatcher = Dispatcher::spawned();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..4u32 {
            let tx = tx.clone();
            assert!(dispatcher.post(move || {
                let _ = tx.send(i);
            }));
        }
        for expected in 0..4u32 {
            assert_eq!(rx.recv().await, Some(expected));
        }
    }
}
