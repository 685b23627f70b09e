//! # Liststate Core
//!
//! Building blocks shared by every liststate crate.
//!
//! State changes happen in exactly one place, a [`Reducer`](reducer::Reducer).
//! It receives the current state, one action and the injected environment,
//! edits the state in place and hands back a list of [`Effect`](effect::Effect)
//! values. Effects are descriptions only; the runtime decides when to run
//! them and feeds any action they produce back into the reducer.
//!
//! ## Example
//!
//! ```
//! use liststate_core::{effect::Effect, reducer::Reducer, SmallVec};
//!
//! #[derive(Debug, Default)]
//! struct Shopping {
//!     items: Vec<String>,
//! }
//!
//! enum ShoppingAction {
//!     Add(String),
//!     Clear,
//! }
//!
//! struct ShoppingReducer;
//!
//! impl Reducer for ShoppingReducer {
//!     type State = Shopping;
//!     type Action = ShoppingAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Shopping,
//!         action: ShoppingAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<ShoppingAction>; 4]> {
//!         match action {
//!             ShoppingAction::Add(item) => state.items.push(item),
//!             ShoppingAction::Clear => state.items.clear(),
//!         }
//!         SmallVec::new()
//!     }
//! }
//!
//! let mut state = Shopping::default();
//! ShoppingReducer.reduce(&mut state, ShoppingAction::Add("milk".into()), &());
//! assert_eq!(state.items, ["milk"]);
//! ```

pub use smallvec::{smallvec, SmallVec};

/// Key-value persistence abstraction
pub mod storage;

/// The reducer trait
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Business logic for one feature
    ///
    /// `reduce` must be deterministic: everything that varies between runs
    /// (time, storage, randomness) comes in through `Environment`. Most
    /// actions yield zero or one effect, hence the inline capacity of four.
    pub trait Reducer {
        /// State owned by the feature
        type State;

        /// Inputs the feature accepts
        type Action;

        /// Injected dependencies
        type Environment;

        /// Applies `action` to `state` and returns the effects to run
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Side effects as values
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Work for the runtime to perform after a reduction
    ///
    /// An effect may resolve to an action, which the runtime reduces next.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Start all nested effects at once
        Parallel(Vec<Effect<Action>>),

        /// Run nested effects one after another, each to completion
        Sequential(Vec<Effect<Action>>),

        /// An async task; `Some(action)` is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => f.write_str("Effect::None"),
                Self::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
                Self::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Self::Future(_) => f.write_str("Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Boxes `fut` into an [`Effect::Future`]
        pub fn future<F>(fut: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Self::Future(Box::pin(fut))
        }

        /// `true` for [`Effect::None`]
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }
}

/// Injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of the current time
    ///
    /// Item timestamps and ids derive from it, so tests swap in a fixed clock.
    pub trait Clock: Send + Sync {
        /// Current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
