//! # Liststate Runtime
//!
//! The [`Store`] owns a feature's state and is the only way to change it.
//! Each action is reduced under the state's write lock; the effects the
//! reducer returns are then spawned on tokio, and any action an effect
//! resolves to goes through the reducer again.
//!
//! ```ignore
//! use liststate_runtime::Store;
//!
//! let store = Store::new(initial_state, reducer, environment);
//!
//! let mut handle = store.send(Action::Load).await?;
//! handle.wait().await;
//!
//! let count = store.state(|s| s.items.len()).await;
//! ```

use liststate_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};

/// Retry logic with exponential backoff
pub mod retry;

/// Errors returned by the [`Store`]
pub mod error {
    use thiserror::Error;

    /// Store failure
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// `shutdown` was called; no further actions are accepted
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects were still running when the shutdown deadline passed
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Effects of one action did not finish in time
        #[error("Timeout waiting for effects")]
        Timeout,
    }
}

pub use error::StoreError;

/// Tunables for a [`Store`]
///
/// ```
/// use liststate_runtime::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(64)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.broadcast_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Effect-produced actions buffered per action subscriber
    pub broadcast_capacity: usize,
    /// Deadline used when shutting down without an explicit one
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Sets the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Sets the default shutdown deadline
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Count of running effects that can be awaited down to zero
type Gauge = Arc<watch::Sender<usize>>;

fn gauge() -> Gauge {
    Arc::new(watch::channel(0).0)
}

async fn drained(gauge: &Gauge) {
    // The sender lives in `gauge`, so the channel cannot close while we wait.
    let _ = gauge.subscribe().wait_for(|running| *running == 0).await;
}

/// Marks one effect as running on both the action's gauge and the store's
///
/// Dropping it marks the effect done, also when the effect task panicked.
struct Running {
    action: Gauge,
    store: Gauge,
}

impl Running {
    fn start(action: &Gauge, store: &Gauge) -> Self {
        action.send_modify(|running| *running += 1);
        store.send_modify(|running| *running += 1);
        Self {
            action: Arc::clone(action),
            store: Arc::clone(store),
        }
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.action.send_modify(|running| *running -= 1);
        self.store.send_modify(|running| *running -= 1);
    }
}

/// Completion handle for the effects of one action
///
/// Actions fed back by those effects, and their own effects, count too: the
/// handle settles only when the whole chain has.
#[derive(Clone)]
pub struct EffectHandle {
    running: Gauge,
}

impl EffectHandle {
    /// Effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.running.borrow()
    }

    /// Waits until no effect is running
    pub async fn wait(&mut self) {
        drained(&self.running).await;
    }

    /// [`wait`](Self::wait) with a deadline
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running after
    /// `timeout`.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending", &self.pending())
            .finish()
    }
}

/// The store runtime
pub mod store {
    use super::{
        broadcast, drained, gauge, watch, Arc, AtomicBool, Duration, Effect, EffectHandle, Gauge,
        Ordering, Reducer, RwLock, Running, StoreConfig, StoreError,
    };

    /// Owns state `S` and serialises actions `A` through reducer `R`
    ///
    /// Readers never see a half-applied action: the reducer runs under the
    /// write lock and reads take the read lock. Clones share everything.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        closed: Arc<AtomicBool>,
        running: Gauge,
        shutdown_timeout: Duration,
        feedback: broadcast::Sender<A>,
        reduced: Arc<watch::Sender<u64>>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Store with [`StoreConfig::default()`]
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Store with explicit configuration
        #[must_use]
        pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                closed: Arc::new(AtomicBool::new(false)),
                running: gauge(),
                shutdown_timeout: config.default_shutdown_timeout,
                feedback: broadcast::channel(config.broadcast_capacity.max(1)).0,
                reduced: Arc::new(watch::channel(0).0),
            }
        }

        /// Deadline configured for shutdowns without an explicit one
        #[must_use]
        pub const fn default_shutdown_timeout(&self) -> Duration {
            self.shutdown_timeout
        }

        /// Whether [`shutdown`](Self::shutdown) has been called
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }

        /// Effects running across all actions
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            *self.running.borrow()
        }

        /// Stops accepting actions, then waits for running effects
        ///
        /// Actions that those effects feed back are dropped.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
        /// still running when `timeout` expires.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            self.closed.store(true, Ordering::Release);
            tracing::info!(pending = self.pending_effects(), "Shutting down store");
            metrics::counter!("store.shutdown.initiated").increment(1);

            if tokio::time::timeout(timeout, drained(&self.running)).await.is_ok() {
                tracing::info!("Store shut down cleanly");
                metrics::counter!("store.shutdown.completed").increment(1);
                Ok(())
            } else {
                let pending = self.pending_effects();
                tracing::error!(pending, "Shutdown deadline passed with effects running");
                metrics::counter!("store.shutdown.timeout").increment(1);
                Err(StoreError::ShutdownTimeout(pending))
            }
        }

        /// Reduces `action` and starts its effects
        ///
        /// Returns once the effects are spawned; await the handle for their
        /// completion.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
        #[tracing::instrument(skip_all, name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            let (handle, ()) = self.dispatch(action, |_| ()).await?;
            Ok(handle)
        }

        /// Reduces `action` and reads the resulting state before the lock is released
        ///
        /// The value `read` returns therefore describes this action's outcome,
        /// never a later one.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] after shutdown.
        #[tracing::instrument(skip_all, name = "store_send_then")]
        pub async fn send_then<F, T>(&self, action: A, read: F) -> Result<(EffectHandle, T), StoreError>
        where
            F: FnOnce(&S) -> T,
        {
            self.dispatch(action, read).await
        }

        /// Actions produced by effects, in the order they were fed back
        ///
        /// Actions passed to `send` are not included. Slow receivers get
        /// `RecvError::Lagged`.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.feedback.subscribe()
        }

        /// Number of reduced actions, updated after every reduction
        #[must_use]
        pub fn subscribe_state(&self) -> watch::Receiver<u64> {
            self.reduced.subscribe()
        }

        /// Reads the state through `f` under the read lock
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            f(&*self.state.read().await)
        }

        async fn dispatch<F, T>(&self, action: A, read: F) -> Result<(EffectHandle, T), StoreError>
        where
            F: FnOnce(&S) -> T,
        {
            if self.is_shutting_down() {
                tracing::warn!("Action rejected, store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }
            metrics::counter!("store.commands.total").increment(1);

            let (effects, value) = {
                let mut state = self.state.write().await;
                let started = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(started.elapsed().as_secs_f64());

                let value = read(&state);
                self.reduced.send_modify(|count| *count += 1);
                (effects, value)
            };
            tracing::trace!(effects = effects.len(), "Action reduced");

            let handle = EffectHandle { running: gauge() };
            for effect in effects {
                self.spawn_effect(effect, &handle.running);
            }
            Ok((handle, value))
        }

        fn spawn_effect(&self, effect: Effect<A>, action_gauge: &Gauge) {
            match effect {
                Effect::None => {},
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.spawn_effect(effect, action_gauge);
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential").increment(1);
                    let running = Running::start(action_gauge, &self.running);
                    let store = self.clone();
                    tokio::spawn(async move {
                        let _running = running;
                        for effect in effects {
                            let step = gauge();
                            store.spawn_effect(effect, &step);
                            drained(&step).await;
                        }
                    });
                },
                Effect::Future(future) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let running = Running::start(action_gauge, &self.running);
                    let store = self.clone();
                    tokio::spawn(async move {
                        let _running = running;
                        if let Some(action) = future.await {
                            store.feed_back(action).await;
                        }
                    });
                },
            }
        }

        /// Reduces an effect-produced action and waits for its own effects
        async fn feed_back(&self, action: A) {
            let _ = self.feedback.send(action.clone());
            match Box::pin(self.dispatch(action, |_| ())).await {
                Ok((mut handle, ())) => handle.wait().await,
                Err(error) => tracing::debug!(%error, "Feedback action dropped"),
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                closed: Arc::clone(&self.closed),
                running: Arc::clone(&self.running),
                shutdown_timeout: self.shutdown_timeout,
                feedback: self.feedback.clone(),
                reduced: Arc::clone(&self.reduced),
            }
        }
    }
}

pub use store::Store;
