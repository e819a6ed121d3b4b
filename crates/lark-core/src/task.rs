//! Cooperative task scheduler with structured cancellation.
//!
//! Every unit of suspend-capable work in the host is a [`Task`]: a handler
//! invocation, an outbound HTTP request, an inter-plugin call. Tasks run on the
//! tokio executor and only give up control at `.await` points (network I/O,
//! [`Task::wait`], [`TaskScope::sleep`], [`TaskScope::timeout`]).
//!
//! # Parentage
//!
//! A task body receives its own [`TaskScope`]. Nested work is spawned through
//! that scope, which makes the new task a child:
//!
//! ```text
//! dispatch "github:.gh"          (root task, spawned by the dispatcher)
//! └── http GET /search/repositories   (child, spawned via scope.spawn)
//! ```
//!
//! Cancelling a task cancels all of its unfinished children, recursively. A
//! task whose body fails cancels its children too. Parentage is always passed
//! explicitly; there is no ambient "current task".
//!
//! # Cancellation
//!
//! Cancellation is cooperative: it is observed the next time the task is
//! suspended, at which point the body future is dropped. Dropping the body
//! drops everything it owns, including in-flight HTTP requests, which aborts
//! them and frees their connections.
//!
//! # Failure
//!
//! A failing body sets the task to [`TaskState::Failed`]. A failure is
//! observed by whoever calls [`Task::wait`]. Once the [`Task`] handle is
//! dropped without waiting, the failure is logged at `error` level instead, so
//! no failure is ever silently lost and none escapes to crash the process.
//! A parent that holds a child's handle and waits on it later does not
//! trigger that log, even if the child failed first. Panics inside a body are
//! caught and reported as [`TaskError::Unexpected`].

use std::any::Any;
use std::future::{Future, poll_fn};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace};

use crate::error::{TaskError, TaskResult};

// =============================================================================
// TaskState
// =============================================================================

/// Lifecycle state of a [`Task`].
///
/// ```text
/// Pending ──► Running ◄──► Suspended
///                │
///                ├──► Completed
///                ├──► Failed
///                └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Spawned but not yet polled.
    Pending = 0,
    /// Currently executing.
    Running = 1,
    /// Waiting on I/O, a timer, or another task.
    Suspended = 2,
    /// Finished with a value.
    Completed = 3,
    /// Finished with an error.
    Failed = 4,
    /// Cancelled before it could finish.
    Cancelled = 5,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Suspended,
            3 => Self::Completed,
            4 => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    /// Returns `true` once the result slot has been set.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// State shared between a [`Task`] handle, its [`TaskScope`] and the running body.
struct TaskShared {
    id: u64,
    name: Arc<str>,
    state: AtomicU8,
    /// Set as soon as someone calls [`Task::wait`].
    waited: AtomicBool,
    /// Set when the handle is dropped without waiting.
    detached: AtomicBool,
    /// Set once the body failed with an error other than cancellation.
    failed: AtomicBool,
    failure: OnceLock<String>,
    /// Guards against logging an unobserved failure twice.
    reported: AtomicBool,
}

impl TaskShared {
    fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Logs the failure of a task nobody will wait on, at most once.
    fn report_unobserved(&self) {
        if self.reported.swap(true, Ordering::AcqRel) {
            return;
        }
        let failure = self.failure.get().map_or("-", String::as_str);
        error!(task = %self.name, task_id = self.id, error = failure, "Unobserved task failure");
    }
}

// =============================================================================
// Scheduler
// =============================================================================

struct SchedulerInner {
    /// Parent of every root task; cancelled on shutdown.
    root: CancellationToken,
    tracker: TaskTracker,
    next_id: AtomicU64,
}

/// Spawns and tracks tasks.
///
/// `Scheduler` is cheap to clone; all clones share the same root token and
/// task tracker.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates a new scheduler. Tasks run on the ambient tokio runtime.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                root: CancellationToken::new(),
                tracker: TaskTracker::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Spawns `body` as a new task.
    ///
    /// With a `parent`, the task is cancelled whenever the parent is cancelled
    /// or fails. Without one it is a root task, cancelled only explicitly or
    /// on [`shutdown`](Self::shutdown).
    ///
    /// `body` is called immediately with the new task's [`TaskScope`]; the
    /// future it returns is scheduled and starts running at the executor's
    /// next opportunity.
    pub fn spawn<T, F, Fut>(
        &self,
        parent: Option<&TaskScope>,
        name: impl Into<Arc<str>>,
        body: F,
    ) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskScope) -> Fut,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        let token = match parent {
            Some(parent) => parent.token.child_token(),
            None => self.inner.root.child_token(),
        };
        let shared = Arc::new(TaskShared {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            state: AtomicU8::new(TaskState::Pending as u8),
            waited: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            failure: OnceLock::new(),
            reported: AtomicBool::new(false),
        });

        trace!(
            task = %shared.name,
            task_id = shared.id,
            parent = parent.map(TaskScope::name).unwrap_or("-"),
            "Spawning task"
        );

        let scope = TaskScope {
            scheduler: self.clone(),
            token: token.clone(),
            shared: Arc::clone(&shared),
        };
        let fut = body(scope);
        let handle = self
            .inner
            .tracker
            .spawn(run_task(fut, token.clone(), Arc::clone(&shared)));

        Task {
            handle,
            token,
            shared,
        }
    }

    /// Returns the number of tasks that have not finished yet.
    pub fn live_tasks(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Waits up to `grace` for every live task to finish on its own.
    ///
    /// Nothing is cancelled. Returns `true` if the scheduler became idle.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        self.inner.tracker.close();
        let idle = tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok();
        self.inner.tracker.reopen();
        idle
    }

    /// Cancels every task and waits up to `grace` for them to wind down.
    ///
    /// Returns `true` if all tasks finished within the grace period. Tasks
    /// spawned after shutdown start out cancelled.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        debug!(live_tasks = self.live_tasks(), "Shutting down scheduler");
        self.inner.root.cancel();
        self.inner.tracker.close();
        tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("live_tasks", &self.live_tasks())
            .field("cancelled", &self.inner.root.is_cancelled())
            .finish()
    }
}

/// Drives one task body to completion, recording state transitions.
async fn run_task<T, Fut>(
    body: Fut,
    token: CancellationToken,
    shared: Arc<TaskShared>,
) -> TaskResult<T>
where
    Fut: Future<Output = TaskResult<T>> + Send,
{
    let mut body = Box::pin(AssertUnwindSafe(body).catch_unwind());
    let state = Arc::clone(&shared);
    let tracked = poll_fn(move |cx| {
        state.set_state(TaskState::Running);
        let poll = body.as_mut().poll(cx);
        if poll.is_pending() {
            state.set_state(TaskState::Suspended);
        }
        poll
    });

    let outcome = tokio::select! {
        biased;
        () = token.cancelled() => Err(TaskError::Cancelled),
        res = tracked => match res {
            Ok(res) => res,
            Err(payload) => Err(TaskError::Unexpected(panic_message(payload.as_ref()))),
        },
    };

    match &outcome {
        Ok(_) => shared.set_state(TaskState::Completed),
        Err(TaskError::Cancelled) => {
            shared.set_state(TaskState::Cancelled);
            token.cancel();
            debug!(task = %shared.name, task_id = shared.id, "Task cancelled");
        }
        Err(err) => {
            shared.set_state(TaskState::Failed);
            // Children of a failed task are cancelled.
            token.cancel();
            let _ = shared.failure.set(err.to_string());
            // Pairs with the store in `Task::drop`: one side sees the other.
            shared.failed.store(true, Ordering::SeqCst);
            debug!(task = %shared.name, task_id = shared.id, error = %err, "Task failed");
            if shared.detached.load(Ordering::SeqCst) {
                shared.report_unobserved();
            }
        }
    }

    outcome
}

/// Renders a caught panic payload as an error message.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

// =============================================================================
// Task
// =============================================================================

/// Handle to a spawned task.
///
/// Dropping the handle without waiting detaches the task; it keeps running
/// and any failure is logged by the scheduler.
pub struct Task<T> {
    handle: JoinHandle<TaskResult<T>>,
    token: CancellationToken,
    shared: Arc<TaskShared>,
}

impl<T> Task<T> {
    /// Suspends the caller until the task finishes, returning its value or
    /// re-raising its error.
    pub async fn wait(mut self) -> TaskResult<T> {
        self.shared.waited.store(true, Ordering::SeqCst);
        match (&mut self.handle).await {
            Ok(res) => res,
            Err(err) if err.is_cancelled() => Err(TaskError::Cancelled),
            Err(err) => Err(TaskError::Unexpected(err.to_string())),
        }
    }

    /// Requests cancellation of the task and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    /// Name given at spawn time.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Scheduler-unique task id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if self.shared.waited.load(Ordering::SeqCst) {
            return;
        }
        self.shared.detached.store(true, Ordering::SeqCst);
        if self.shared.failed.load(Ordering::SeqCst) {
            self.shared.report_unobserved();
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// TaskScope
// =============================================================================

/// The running task's view of itself, handed to every task body.
///
/// Use it to spawn children, sleep, or bound work with a deadline. All of
/// these observe the task's cancellation.
#[derive(Clone)]
pub struct TaskScope {
    scheduler: Scheduler,
    token: CancellationToken,
    shared: Arc<TaskShared>,
}

impl TaskScope {
    /// Spawns a child task.
    pub fn spawn<T, F, Fut>(&self, name: impl Into<Arc<str>>, body: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskScope) -> Fut,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        self.scheduler.spawn(Some(self), name, body)
    }

    /// The scheduler this task belongs to.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Name of the running task.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Cancels this task and its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Sleeps for `duration`, failing early with [`TaskError::Cancelled`].
    pub async fn sleep(&self, duration: Duration) -> TaskResult<()> {
        tokio::select! {
            () = self.token.cancelled() => Err(TaskError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Runs `fut` with a deadline. Exceeding it drops `fut` and fails with
    /// [`TaskError::Timeout`].
    pub async fn timeout<T, Fut>(&self, after: Duration, fut: Fut) -> TaskResult<T>
    where
        Fut: Future<Output = TaskResult<T>>,
    {
        match tokio::time::timeout(after, fut).await {
            Ok(res) => res,
            Err(_) => Err(TaskError::Timeout { after }),
        }
    }
}

impl std::fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScope")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    /// Flips a flag when dropped; stands in for a connection held by a request.
    struct Released(Arc<AtomicBool>);

    impl Drop for Released {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_spawn_and_wait_value() {
        let scheduler = Scheduler::new();
        let task = scheduler.spawn(None, "answer", |_| async { Ok(42) });
        assert_eq!(assert_ok!(task.wait().await), 42);
    }

    #[tokio::test]
    async fn test_wait_reraises_error() {
        let scheduler = Scheduler::new();
        let outer = scheduler.spawn(None, "outer", |scope| async move {
            let inner = scope.spawn("inner", |_| async {
                Err::<(), _>(TaskError::Http { status: 503 })
            });
            inner.wait().await
        });

        let err = outer.wait().await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_panic_becomes_unexpected_error() {
        let scheduler = Scheduler::new();
        let task = scheduler.spawn(None, "panics", |_| async {
            if true {
                panic!("boom");
            }
            Ok(())
        });

        let err = task.wait().await.unwrap_err();
        assert!(matches!(err, TaskError::Unexpected(ref msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_cancelling_parent_aborts_suspended_child() {
        let scheduler = Scheduler::new();
        let released = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let guard = Released(Arc::clone(&released));
        let parent = scheduler.spawn(None, "parent", move |scope| async move {
            let child = scope.spawn("slow-request", move |_| async move {
                let _connection = guard;
                std::future::pending::<()>().await;
                Ok(())
            });
            let _ = tx.send(child);
            std::future::pending::<()>().await;
            Ok(())
        });

        let child = rx.await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while child.state() != TaskState::Suspended {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        parent.cancel();

        let res = tokio::time::timeout(Duration::from_secs(1), child.wait())
            .await
            .unwrap();
        assert!(res.unwrap_err().is_cancelled());
        assert!(released.load(Ordering::SeqCst));
        assert!(parent.wait().await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_parent_cancels_children() {
        let scheduler = Scheduler::new();
        let (tx, rx) = oneshot::channel();

        let parent = scheduler.spawn(None, "parent", move |scope| async move {
            let child = scope.spawn("child", |scope| async move {
                scope.sleep(Duration::from_secs(3600)).await
            });
            let _ = tx.send(child);
            Err::<(), _>(TaskError::domain("no results"))
        });

        let child = rx.await.unwrap();
        assert!(matches!(parent.wait().await, Err(TaskError::Domain(_))));

        let res = tokio::time::timeout(Duration::from_secs(1), child.wait())
            .await
            .unwrap();
        assert!(res.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_with_timeout_kind() {
        let scheduler = Scheduler::new();
        let task = scheduler.spawn(None, "slow", |scope| async move {
            let inner = scope.clone();
            scope
                .timeout(Duration::from_secs(5), async move {
                    inner.sleep(Duration::from_secs(60)).await
                })
                .await
        });

        let err = task.wait().await.unwrap_err();
        assert!(matches!(err, TaskError::Timeout { after } if after == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_tasks_interleave() {
        let scheduler = Scheduler::new();
        let start = Instant::now();

        let tasks: Vec<_> = [3u64, 1, 2]
            .into_iter()
            .map(|secs| {
                scheduler.spawn(None, format!("sleep-{secs}"), move |scope| async move {
                    scope.sleep(Duration::from_secs(secs)).await?;
                    Ok(secs)
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.wait().await.unwrap());
        }

        assert_eq!(results, vec![3, 1, 2]);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let scheduler = Scheduler::new();
        let (tx, rx) = oneshot::channel::<()>();
        let task = scheduler.spawn(None, "waits", |_| async move {
            rx.await.map_err(|_| TaskError::unexpected("sender dropped"))
        });

        tokio::time::timeout(Duration::from_secs(1), async {
            while task.state() != TaskState::Suspended {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(scheduler.live_tasks(), 1);

        tx.send(()).unwrap();
        let shared = Arc::clone(&task.shared);
        task.wait().await.unwrap();
        assert_eq!(shared.state(), TaskState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_lets_tasks_finish() {
        let scheduler = Scheduler::new();
        let quick = scheduler.spawn(None, "quick", |scope| async move {
            scope.sleep(Duration::from_secs(2)).await?;
            Ok("done")
        });
        let slow = scheduler.spawn(None, "slow", |scope| async move {
            scope.sleep(Duration::from_secs(60)).await
        });

        assert!(!scheduler.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(assert_ok!(quick.wait().await), "done");
        assert_eq!(slow.state(), TaskState::Suspended);

        assert!(scheduler.shutdown(Duration::from_secs(1)).await);
        assert!(slow.wait().await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_failure_before_wait_is_observed() {
        let scheduler = Scheduler::new();
        let child = scheduler.spawn(None, "child", |_| async {
            Err::<(), _>(TaskError::Http { status: 502 })
        });
        let shared = Arc::clone(&child.shared);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !shared.failed.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(shared.state(), TaskState::Failed);
        assert!(!shared.reported.load(Ordering::SeqCst));

        assert_eq!(child.wait().await.unwrap_err().status(), Some(502));
        assert!(!shared.reported.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropped_handle_reports_failure_once() {
        let scheduler = Scheduler::new();

        let failed_first = scheduler.spawn(None, "failed-first", |_| async {
            Err::<(), _>(TaskError::domain("gone"))
        });
        let shared = Arc::clone(&failed_first.shared);
        tokio::time::timeout(Duration::from_secs(1), async {
            while !shared.failed.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        drop(failed_first);
        assert!(shared.reported.load(Ordering::SeqCst));

        let (tx, rx) = oneshot::channel::<()>();
        let dropped_first = scheduler.spawn(None, "dropped-first", |_| async move {
            let _ = rx.await;
            Err::<(), _>(TaskError::domain("gone"))
        });
        let shared = Arc::clone(&dropped_first.shared);
        drop(dropped_first);
        assert!(!shared.reported.load(Ordering::SeqCst));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !shared.reported.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything() {
        let scheduler = Scheduler::new();
        let task = scheduler.spawn(None, "forever", |scope| async move {
            scope.sleep(Duration::from_secs(3600)).await
        });

        assert!(scheduler.shutdown(Duration::from_secs(1)).await);
        assert_eq!(scheduler.live_tasks(), 0);
        assert!(task.wait().await.unwrap_err().is_cancelled());

        let late = scheduler.spawn(None, "late", |_| async { Ok(()) });
        assert!(assert_err!(late.wait().await).is_cancelled());
    }
}
