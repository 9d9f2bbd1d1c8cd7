//! # Zync Runtime
//!
//! The Store runtime that coordinates reducer execution and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: owns one feature's state, runs its reducer under a write lock and
//!   executes the returned effects on tokio tasks
//! - **`EffectHandle`**: lets a caller wait until the effects of one action finished
//! - **Action broadcast**: every action produced by an effect is published after
//!   the reducer has applied it, which is what request/response helpers such as
//!   [`Store::send_and_wait_for`] are built on
//!
//! ## Example
//!
//! ```ignore
//! use zync_runtime::Store;
//!
//! let store = Store::new(CartState::default(), CartReducer::new(), env);
//! store.send(CartAction::AddToCart { product }).await?;
//! let items = store.state(|s| s.total_items()).await;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::AbortHandle;
use zync_core::effect::{Effect, EffectId};
use zync_core::reducer::Reducer;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// No matching action arrived before the deadline
        #[error("Timeout waiting for action")]
        Timeout,

        /// The action broadcast channel closed while waiting
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send`]. The handle counts the effects started directly
/// by one action; it does not follow effects started by feedback actions.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new();
        handle
    }

    /// Number of effects from this action that are still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Internal: counter shared between an [`EffectHandle`] and the running effects
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counters on drop
///
/// Runs on normal completion, on panic, and when the task is aborted.
struct EffectGuard {
    tracking: EffectTracking,
    pending: Arc<AtomicUsize>,
}

impl EffectGuard {
    fn start(tracking: &EffectTracking, pending: &Arc<AtomicUsize>) -> Self {
        tracking.increment();
        pending.fetch_add(1, Ordering::SeqCst);
        Self {
            tracking: tracking.clone(),
            pending: Arc::clone(pending),
        }
    }
}

impl Drop for EffectGuard {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.tracking.decrement();
    }
}

type CancellationRegistry = Arc<Mutex<HashMap<EffectId, Vec<AbortHandle>>>>;

/// The Store - runtime coordinator for a reducer
///
/// The Store manages:
/// 1. State (behind `RwLock`; reducers run one at a time)
/// 2. Reducer (business logic)
/// 3. Environment (injected dependencies)
/// 4. Effect execution (with feedback loop and cancellation)
///
/// Cloning a Store is cheap and yields another handle to the same state.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: Arc<R>,
    environment: Arc<E>,
    shutdown: Arc<AtomicBool>,
    pending_effects: Arc<AtomicUsize>,
    cancellations: CancellationRegistry,
    action_broadcast: broadcast::Sender<A>,
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: Arc::clone(&self.reducer),
            environment: Arc::clone(&self.environment),
            shutdown: Arc::clone(&self.shutdown),
            pending_effects: Arc::clone(&self.pending_effects),
            cancellations: Arc::clone(&self.cancellations),
            action_broadcast: self.action_broadcast.clone(),
        }
    }
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Send + Clone + std::fmt::Debug + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a new store with initial state, reducer, and environment
    ///
    /// The action broadcast channel holds 64 actions; use
    /// [`Store::with_broadcast_capacity`] for chattier features.
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
    }

    /// Create a store with a custom action broadcast capacity
    #[must_use]
    pub fn with_broadcast_capacity(
        initial_state: S,
        reducer: R,
        environment: E,
        capacity: usize,
    ) -> Self {
        let (action_broadcast, _) = broadcast::channel(capacity.max(1));

        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer: Arc::new(reducer),
            environment: Arc::new(environment),
            shutdown: Arc::new(AtomicBool::new(false)),
            pending_effects: Arc::new(AtomicUsize::new(0)),
            cancellations: Arc::new(Mutex::new(HashMap::new())),
            action_broadcast,
        }
    }

    /// Access the injected environment
    #[must_use]
    pub fn environment(&self) -> &E {
        &self.environment
    }

    /// Number of effects currently running across all actions
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.pending_effects.load(Ordering::Acquire)
    }

    /// Send an action to the store
    ///
    /// 1. Acquires the write lock on state
    /// 2. Calls the reducer with (state, action, environment)
    /// 3. Starts the returned effects on background tasks
    ///
    /// `send()` returns once the effects have been started, not when they finish.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
    pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
        self.send_and_inspect(action, |_| ()).await.map(|(handle, ())| handle)
    }

    /// Send an action and read state right after the reducer applied it
    ///
    /// The read happens under the same write lock as the reduction, so no other
    /// action can land in between. Use it to learn whether a command was
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
    #[tracing::instrument(skip(self, action, inspect), name = "store_send")]
    pub async fn send_and_inspect<F, T>(
        &self,
        action: A,
        inspect: F,
    ) -> Result<(EffectHandle, T), StoreError>
    where
        F: FnOnce(&S) -> T,
    {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected action: store is shutting down");
            metrics::counter!("store.shutdown.rejected_actions").increment(1);
            return Err(StoreError::ShutdownInProgress);
        }

        metrics::counter!("store.commands.total").increment(1);
        tracing::debug!(action = ?action, "Processing action");

        let (handle, tracking) = EffectHandle::new();

        let (effects, inspected) = {
            let mut state = self.state.write().await;
            let effects = self.reducer.reduce(&mut state, action, &self.environment);
            (effects, inspect(&state))
        };

        tracing::trace!("Reducer returned {} effects", effects.len());
        for effect in effects {
            self.execute_effect(effect, &tracking, None);
        }

        Ok((handle, inspected))
    }

    /// Send an action and wait for a matching action produced by its effects
    ///
    /// Subscribes to the action broadcast before sending, so a fast effect cannot
    /// slip past. The returned action has already been applied to state.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`]: no matching action before `timeout`
    /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
    /// - [`StoreError::ShutdownInProgress`]: the store is shutting down
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let mut rx = self.action_broadcast.subscribe();

        self.send(action).await?;

        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Action observer lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Subscribe to actions produced by effects
    ///
    /// Only feedback actions are broadcast, never the actions passed to `send`.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.action_broadcast.subscribe()
    }

    /// Read current state via a closure
    ///
    /// ```ignore
    /// let total = store.state(|s| s.total_amount()).await;
    /// ```
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }

    /// Stop accepting actions and wait for running effects to drain
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// when the timeout elapses.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("Initiating graceful shutdown");
        self.shutdown.store(true, Ordering::Release);

        let start = std::time::Instant::now();
        loop {
            let pending = self.pending_effects.load(Ordering::Acquire);
            if pending == 0 {
                tracing::info!("All effects completed, shutdown successful");
                return Ok(());
            }
            if start.elapsed() >= timeout {
                tracing::error!(pending_effects = pending, "Shutdown timed out");
                return Err(StoreError::ShutdownTimeout(pending));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Reduce a feedback action, then publish it to observers
    async fn feed_back(&self, action: A) {
        match self.send(action.clone()).await {
            Ok(_) => {
                let _ = self.action_broadcast.send(action);
            },
            Err(error) => {
                tracing::warn!(error = %error, "Dropped feedback action");
            },
        }
    }

    fn register_abort(&self, key: Option<&EffectId>, handle: AbortHandle) {
        let Some(key) = key else {
            return;
        };
        let Ok(mut registry) = self.cancellations.lock() else {
            tracing::error!("Cancellation registry poisoned");
            return;
        };
        let handles = registry.entry(key.clone()).or_default();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    fn cancel(&self, id: &EffectId) {
        let handles = match self.cancellations.lock() {
            Ok(mut registry) => registry.remove(id).unwrap_or_default(),
            Err(_) => {
                tracing::error!("Cancellation registry poisoned");
                return;
            },
        };

        tracing::debug!(effect_id = %id, tasks = handles.len(), "Cancelling effects");
        metrics::counter!("store.effects.cancelled").increment(handles.len() as u64);
        for handle in handles {
            handle.abort();
        }
    }

    /// Execute one effect description
    ///
    /// `cancel_key` is set when the effect sits inside an [`Effect::Cancellable`];
    /// every task spawned for it is then registered for abortion.
    fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking, cancel_key: Option<&EffectId>) {
        match effect {
            Effect::None => {
                metrics::counter!("store.effects.executed", "type" => "none").increment(1);
            },
            Effect::Future(fut) => {
                metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                let guard = EffectGuard::start(tracking, &self.pending_effects);
                let store = self.clone();

                let task = tokio::spawn(async move {
                    let _guard = guard;
                    if let Some(action) = fut.await {
                        store.feed_back(action).await;
                    }
                });
                self.register_abort(cancel_key, task.abort_handle());
            },
            Effect::Delay { duration, action } => {
                metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                let guard = EffectGuard::start(tracking, &self.pending_effects);
                let store = self.clone();

                let task = tokio::spawn(async move {
                    let _guard = guard;
                    tokio::time::sleep(duration).await;
                    store.feed_back(*action).await;
                });
                self.register_abort(cancel_key, task.abort_handle());
            },
            Effect::Parallel(effects) => {
                metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                for effect in effects {
                    self.execute_effect(effect, tracking, cancel_key);
                }
            },
            Effect::Sequential(effects) => {
                metrics::counter!("store.effects.executed", "type" => "sequential").increment(1);
                let guard = EffectGuard::start(tracking, &self.pending_effects);
                let store = self.clone();
                let key = cancel_key.cloned();

                let task = tokio::spawn(async move {
                    let _guard = guard;
                    for effect in effects {
                        let (mut step, step_tracking) = EffectHandle::new();
                        store.execute_effect(effect, &step_tracking, key.as_ref());
                        step.wait().await;
                    }
                });
                self.register_abort(cancel_key, task.abort_handle());
            },
            Effect::Cancellable { id, effect } => {
                self.execute_effect(*effect, tracking, Some(&id));
            },
            Effect::Cancel(id) => {
                self.cancel(&id);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zync_core::{smallvec, SmallVec};

    #[derive(Debug, Clone, Default)]
    struct Tally {
        count: i64,
        echoes: Vec<i64>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TallyAction {
        Add(i64),
        AddLater(i64, Duration),
        Echo(i64),
        EchoSlowly { value: i64, id: &'static str },
        StopEcho(&'static str),
    }

    struct TallyReducer;

    impl Reducer for TallyReducer {
        type State = Tally;
        type Action = TallyAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Tally,
            action: TallyAction,
            _env: &(),
        ) -> SmallVec<[Effect<TallyAction>; 4]> {
            match action {
                TallyAction::Add(n) => {
                    state.count += n;
                    smallvec![Effect::None]
                },
                TallyAction::AddLater(n, duration) => smallvec![Effect::Delay {
                    duration,
                    action: Box::new(TallyAction::Add(n)),
                }],
                TallyAction::Echo(n) => {
                    state.echoes.push(n);
                    smallvec![Effect::future(async move { Some(TallyAction::Add(n)) })]
                },
                TallyAction::EchoSlowly { value, id } => smallvec![Effect::future(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Some(TallyAction::Add(value))
                })
                .cancellable(EffectId::new(id))],
                TallyAction::StopEcho(id) => smallvec![Effect::Cancel(EffectId::new(id))],
            }
        }
    }

    fn store() -> Store<Tally, TallyAction, (), TallyReducer> {
        Store::new(Tally::default(), TallyReducer, ())
    }

    #[tokio::test]
    async fn send_applies_reducer() {
        let store = store();
        let _ = store.send(TallyAction::Add(3)).await;
        assert_eq!(store.state(|s| s.count).await, 3);
    }

    #[tokio::test]
    async fn handle_waits_for_feedback() {
        let store = store();
        let mut handle = store.send(TallyAction::Echo(5)).await.unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        assert_eq!(store.state(|s| s.count).await, 5);
        assert_eq!(store.state(|s| s.echoes.clone()).await, vec![5]);
    }

    #[tokio::test]
    async fn send_and_wait_for_sees_applied_state() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TallyAction::Echo(7),
                |a| matches!(a, TallyAction::Add(_)),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(result, TallyAction::Add(7));
        assert_eq!(store.state(|s| s.count).await, 7);
    }

    #[tokio::test]
    async fn delay_dispatches_after_duration() {
        let store = store();
        let mut handle = store
            .send(TallyAction::AddLater(2, Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(store.state(|s| s.count).await, 0);

        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.state(|s| s.count).await, 2);
    }

    #[tokio::test]
    async fn cancelled_effect_never_feeds_back() {
        let store = store();
        let mut handle = store
            .send(TallyAction::EchoSlowly { value: 9, id: "slow" })
            .await
            .unwrap();
        let _ = store.send(TallyAction::StopEcho("slow")).await;

        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(store.state(|s| s.count).await, 0);
        assert_eq!(store.pending_effects(), 0);
    }

    #[tokio::test]
    async fn send_and_inspect_reads_reduced_state() {
        let store = store();
        let (_, count) = store
            .send_and_inspect(TallyAction::Add(4), |s| s.count)
            .await
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = store.send(TallyAction::Add(1)).await;
        assert_eq!(result.err(), Some(StoreError::ShutdownInProgress));
    }

    #[tokio::test]
    async fn send_and_wait_for_times_out() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TallyAction::Add(1),
                |a| matches!(a, TallyAction::Echo(_)),
                Duration::from_millis(20),
            )
            .await;
        assert_eq!(result, Err(StoreError::Timeout));
    }
}
