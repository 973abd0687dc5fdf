use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

type BoxTask<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'static>>;

/// Fail-fast group of concurrent tasks.
///
/// Fixed tasks are registered with [`Supervisor::spawn`] before the group
/// starts; more can be added while it runs through a [`Tasks`] handle. The
/// first task to fail cancels every sibling and its error becomes the
/// group's result.
///
/// Tasks are cancelled by dropping them at their next await point, so they
/// never observe cancellation and need no cooperation.
pub struct Supervisor<E> {
    token: CancellationToken,
    fixed: Vec<BoxTask<E>>,
    tx: mpsc::UnboundedSender<BoxTask<E>>,
    rx: mpsc::UnboundedReceiver<BoxTask<E>>,
}

/// Handle for adding tasks to a running [`Supervisor`].
pub struct Tasks<E> {
    tx: mpsc::UnboundedSender<BoxTask<E>>,
}

impl<E> Clone for Tasks<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Send + 'static> Tasks<E> {
    /// Add a task to the group.
    ///
    /// Tasks added after the group has finished are dropped without running.
    pub fn add<F>(&self, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        if self.tx.send(Box::pin(task)).is_err() {
            tracing::trace!("task group finished; dropping task");
        }
    }
}

impl<E: Send + 'static> Supervisor<E> {
    /// Create a group whose cancellation follows `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            token: parent.child_token(),
            fixed: Vec::new(),
            tx,
            rx,
        }
    }

    /// Register a task started when [`Supervisor::run`] is called.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.fixed.push(Box::pin(task));
    }

    /// Handle for adding tasks once the group is running.
    pub fn tasks(&self) -> Tasks<E> {
        Tasks {
            tx: self.tx.clone(),
        }
    }

    /// Token cancelled when the group stops.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run every task to completion.
    ///
    /// Returns `Ok(())` once all tasks have succeeded and every [`Tasks`]
    /// handle is gone, or as soon as the parent token is cancelled. Returns
    /// the first error otherwise, after all siblings have stopped. A panic in
    /// any task is re-raised here once siblings have stopped.
    pub async fn run(self) -> Result<(), E> {
        let Self {
            token,
            fixed,
            tx,
            mut rx,
        } = self;
        // Only handles given out by `tasks()` may keep the group open.
        drop(tx);

        let mut set = JoinSet::new();
        for task in fixed {
            set.spawn(guarded(token.clone(), task));
        }

        let mut accepting = true;
        loop {
            tokio::select! {
                task = rx.recv(), if accepting => match task {
                    Some(task) => {
                        set.spawn(guarded(token.clone(), task));
                    }
                    None => accepting = false,
                },
                Some(joined) = set.join_next(), if !set.is_empty() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        token.cancel();
                        drain(&mut set).await;
                        return Err(err);
                    }
                    Err(join_err) => {
                        token.cancel();
                        drain(&mut set).await;
                        if join_err.is_panic() {
                            std::panic::resume_unwind(join_err.into_panic());
                        }
                        // Tasks are never aborted, so a non-panic join error
                        // only happens while the runtime shuts down.
                        return Ok(());
                    }
                },
                _ = token.cancelled(), if accepting && set.is_empty() => return Ok(()),
                else => return Ok(()),
            }
        }
    }
}

async fn guarded<E>(token: CancellationToken, task: BoxTask<E>) -> Result<(), E> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Ok(()),
        result = task => result,
    }
}

async fn drain<E: 'static>(set: &mut JoinSet<Result<(), E>>) {
    while set.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn fail(msg: &str) -> Result<(), String> {
        Err(msg.to_string())
    }

    #[tokio::test]
    async fn completes_when_all_tasks_succeed() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::<String>::new(&CancellationToken::new());
        for _ in 0..3 {
            let done = Arc::clone(&done);
            supervisor.spawn(async move {
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        tokio::time::timeout(WAIT, supervisor.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_error_cancels_siblings() {
        let mut supervisor = Supervisor::<String>::new(&CancellationToken::new());
        let token = supervisor.token();
        supervisor.spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        supervisor.spawn(async { fail("boom") });

        let result = tokio::time::timeout(WAIT, supervisor.run()).await.unwrap();
        assert_eq!(result, Err("boom".to_string()));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn dynamic_task_error_ends_group() {
        let mut supervisor = Supervisor::<String>::new(&CancellationToken::new());
        let tasks = supervisor.tasks();
        supervisor.spawn(async move {
            tasks.add(async { fail("late failure") });
            std::future::pending::<()>().await;
            Ok(())
        });

        let result = tokio::time::timeout(WAIT, supervisor.run()).await.unwrap();
        assert_eq!(result, Err("late failure".to_string()));
    }

    #[tokio::test]
    async fn waits_for_dynamic_tasks() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::<String>::new(&CancellationToken::new());
        let tasks = supervisor.tasks();
        let counter = Arc::clone(&done);
        supervisor.spawn(async move {
            for _ in 0..4 {
                let counter = Arc::clone(&counter);
                tasks.add(async move {
                    tokio::task::yield_now().await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            Ok(())
        });

        tokio::time::timeout(WAIT, supervisor.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn parent_cancellation_is_success() {
        let parent = CancellationToken::new();
        let mut supervisor = Supervisor::<String>::new(&parent);
        supervisor.spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        // A live handle must not keep a cancelled group open.
        let _tasks = supervisor.tasks();

        let run = tokio::spawn(supervisor.run());
        parent.cancel();
        let result = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn finishes_once_handles_are_gone() {
        let supervisor = Supervisor::<String>::new(&CancellationToken::new());
        let tasks = supervisor.tasks();
        let run = tokio::spawn(supervisor.run());
        drop(tasks);

        let result = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn add_after_finish_is_dropped() {
        let parent = CancellationToken::new();
        let supervisor = Supervisor::<String>::new(&parent);
        let tasks = supervisor.tasks();
        parent.cancel();
        supervisor.run().await.unwrap();

        tasks.add(async { fail("never runs") });
    }

    fn explode() -> Result<(), String> {
        panic!("task exploded")
    }

    #[tokio::test]
    #[should_panic(expected = "task exploded")]
    async fn panic_is_propagated() {
        let mut supervisor = Supervisor::<String>::new(&CancellationToken::new());
        supervisor.spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        supervisor.spawn(async { explode() });

        let _ = supervisor.run().await;
    }
}
