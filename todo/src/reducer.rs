//! Reducer logic for the to-do list.
//!
//! Commands are validated, applied to the copy-on-write collection, and
//! answered with a persistence effect when they changed something. Rejected
//! commands are recorded in `last_error` and produce no effects.

use crate::persistence::PersistenceHook;
use crate::types::{Change, InsertionOrder, TodoAction, TodoError, TodoId, TodoItem, TodoState};
use liststate_core::{
    effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec,
};
use std::sync::Arc;

/// Environment dependencies for the to-do reducer
#[derive(Clone)]
pub struct TodoEnvironment {
    /// Clock for timestamps and ids
    pub clock: Arc<dyn Clock>,
    /// Save-after-mutate hook; `None` disables persistence
    pub persistence: Option<PersistenceHook>,
}

impl TodoEnvironment {
    /// Creates an environment without persistence
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            persistence: None,
        }
    }

    /// Attaches a persistence hook
    #[must_use]
    pub fn with_persistence(mut self, hook: PersistenceHook) -> Self {
        self.persistence = Some(hook);
        self
    }
}

/// Reducer for the to-do list
#[derive(Clone, Debug, Default)]
pub struct TodoReducer;

impl TodoReducer {
    /// Creates a new `TodoReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_text(text: &str) -> Result<(), TodoError> {
        if text.trim().is_empty() {
            return Err(TodoError::EmptyText);
        }
        Ok(())
    }

    fn position(state: &TodoState, id: TodoId) -> Result<usize, TodoError> {
        state
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(TodoError::NotFound(id))
    }

    fn reject(state: &mut TodoState, error: TodoError) -> SmallVec<[Effect<TodoAction>; 4]> {
        tracing::debug!(%error, "Command rejected");
        metrics::counter!("todo.commands.rejected").increment(1);
        state.last_change = None;
        state.last_error = Some(error);
        SmallVec::new()
    }

    /// Records an accepted mutation and returns the persistence effect for it.
    fn commit(
        state: &mut TodoState,
        change: Change,
        env: &TodoEnvironment,
    ) -> SmallVec<[Effect<TodoAction>; 4]> {
        state.revision += 1;
        state.last_change = Some(change);
        state.last_error = None;

        match &env.persistence {
            Some(hook) => smallvec![hook.persist(state.revision, Arc::clone(&state.items))],
            None => SmallVec::new(),
        }
    }

    fn add(
        state: &mut TodoState,
        text: String,
        env: &TodoEnvironment,
    ) -> SmallVec<[Effect<TodoAction>; 4]> {
        if let Err(error) = Self::validate_text(&text) {
            return Self::reject(state, error);
        }

        let now = env.clock.now();
        let id = state.next_id(now);
        let item = TodoItem::new(id, text, now);
        state.last_id = state.last_id.max(id.get());

        let items = Arc::make_mut(&mut state.items);
        match state.insertion_order {
            InsertionOrder::Append => items.push(item.clone()),
            InsertionOrder::Prepend => items.insert(0, item.clone()),
        }

        tracing::debug!(%id, "Item added");
        Self::commit(state, Change::Added(item), env)
    }

    fn toggle(
        state: &mut TodoState,
        id: TodoId,
        env: &TodoEnvironment,
    ) -> SmallVec<[Effect<TodoAction>; 4]> {
        let index = match Self::position(state, id) {
            Ok(index) => index,
            Err(error) => return Self::reject(state, error),
        };

        let item = &mut Arc::make_mut(&mut state.items)[index];
        item.completed = !item.completed;
        let completed = item.completed;

        tracing::debug!(%id, completed, "Item toggled");
        Self::commit(state, Change::Toggled { id, completed }, env)
    }

    fn edit(
        state: &mut TodoState,
        id: TodoId,
        text: String,
        env: &TodoEnvironment,
    ) -> SmallVec<[Effect<TodoAction>; 4]> {
        let index = match Self::validate_text(&text).and_then(|()| Self::position(state, id)) {
            Ok(index) => index,
            Err(error) => return Self::reject(state, error),
        };

        Arc::make_mut(&mut state.items)[index].text = text;

        tracing::debug!(%id, "Item edited");
        Self::commit(state, Change::Edited(id), env)
    }

    fn remove(
        state: &mut TodoState,
        id: TodoId,
        env: &TodoEnvironment,
    ) -> SmallVec<[Effect<TodoAction>; 4]> {
        let index = match Self::position(state, id) {
            Ok(index) => index,
            Err(error) => return Self::reject(state, error),
        };

        Arc::make_mut(&mut state.items).remove(index);

        tracing::debug!(%id, "Item removed");
        Self::commit(state, Change::Removed(id), env)
    }

    fn toggle_all(state: &mut TodoState, env: &TodoEnvironment) -> SmallVec<[Effect<TodoAction>; 4]> {
        if state.items.is_empty() {
            state.last_change = None;
            return SmallVec::new();
        }

        let completed = !state.items.iter().all(|item| item.completed);
        for item in Arc::make_mut(&mut state.items) {
            item.completed = completed;
        }

        tracing::debug!(completed, count = state.items.len(), "All items toggled");
        Self::commit(state, Change::ToggledAll { completed }, env)
    }

    fn clear_completed(
        state: &mut TodoState,
        env: &TodoEnvironment,
    ) -> SmallVec<[Effect<TodoAction>; 4]> {
        let removed = state.completed_count();
        if removed == 0 {
            state.last_change = None;
            return SmallVec::new();
        }

        Arc::make_mut(&mut state.items).retain(|item| !item.completed);

        tracing::debug!(removed, "Completed items cleared");
        Self::commit(state, Change::ClearedCompleted { removed }, env)
    }
}

impl Reducer for TodoReducer {
    type State = TodoState;
    type Action = TodoAction;
    type Environment = TodoEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            TodoAction::Add { text } => Self::add(state, text, env),
            TodoAction::Toggle { id } => Self::toggle(state, id, env),
            TodoAction::Edit { id, text } => Self::edit(state, id, text, env),
            TodoAction::Remove { id } => Self::remove(state, id, env),
            TodoAction::ToggleAll => Self::toggle_all(state, env),
            TodoAction::ClearCompleted => Self::clear_completed(state, env),

            // ========== Persistence feedback ==========
            TodoAction::Persisted { revision } => {
                state.persisted_revision = state.persisted_revision.max(revision);
                state.last_persist_error = None;
                SmallVec::new()
            },
            TodoAction::PersistFailed { revision, error } => {
                tracing::warn!(revision, %error, "List not persisted");
                state.last_persist_error = Some(error);
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Filter;
    use liststate_testing::{assertions, test_clock, InMemoryKeyValueStore, ReducerTest};

    fn test_env() -> TodoEnvironment {
        TodoEnvironment::new(Arc::new(test_clock()))
    }

    fn persisting_env() -> TodoEnvironment {
        let storage = InMemoryKeyValueStore::new();
        test_env().with_persistence(PersistenceHook::new(Arc::new(storage), "todos"))
    }

    fn add(text: &str) -> TodoAction {
        TodoAction::Add { text: text.to_string() }
    }

    fn seeded(texts: &[(&str, bool)]) -> TodoState {
        let mut state = TodoState::new();
        let env = test_env();
        for (text, completed) in texts {
            TodoReducer.reduce(&mut state, add(text), &env);
            if *completed {
                let id = state.items.last().unwrap().id;
                TodoReducer.reduce(&mut state, TodoAction::Toggle { id }, &env);
            }
        }
        state
    }

    #[test]
    fn test_add_appends_item() {
        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(TodoState::new())
            .when_actions([add("buy milk"), add("walk the dog")])
            .then_state(|state| {
                assert_eq!(state.count(), 2);
                assert_eq!(state.items[0].text, "buy milk");
                assert_eq!(state.items[1].text, "walk the dog");
                assert!(state.items.iter().all(|item| !item.completed));
                assert!(state.items[0].id < state.items[1].id);
                assert_eq!(state.revision, 2);
                assert!(matches!(state.last_change, Some(Change::Added(ref item)) if item.text == "walk the dog"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_add_prepends_when_configured() {
        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(TodoState::new().with_insertion_order(InsertionOrder::Prepend))
            .when_actions([add("first"), add("second")])
            .then_state(|state| {
                let texts: Vec<_> = state.items.iter().map(|item| item.text.as_str()).collect();
                assert_eq!(texts, ["second", "first"]);
            })
            .run();
    }

    #[test]
    fn test_add_keeps_text_untrimmed() {
        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(TodoState::new())
            .when_action(add("  padded  "))
            .then_state(|state| assert_eq!(state.items[0].text, "  padded  "))
            .run();
    }

    #[test]
    fn test_add_blank_is_rejected_without_effects() {
        ReducerTest::new(TodoReducer::new())
            .with_env(persisting_env())
            .given_state(TodoState::new())
            .when_action(add(" \t "))
            .then_state(|state| {
                assert_eq!(state.count(), 0);
                assert_eq!(state.revision, 0);
                assert_eq!(state.last_change, None);
                assert_eq!(state.last_error, Some(TodoError::EmptyText));
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 0))
            .run();
    }

    #[test]
    fn test_mutation_with_persistence_returns_future_effect() {
        ReducerTest::new(TodoReducer::new())
            .with_env(persisting_env())
            .given_state(TodoState::new())
            .when_action(add("buy milk"))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_toggle_flips_only_one_item() {
        let state = seeded(&[("a", false), ("b", false)]);
        let target = state.items[1].id;
        let untouched = state.items[0].clone();

        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(TodoAction::Toggle { id: target })
            .then_state(move |state| {
                assert!(state.get(target).unwrap().completed);
                assert_eq!(state.items[0], untouched);
                assert_eq!(
                    state.last_change,
                    Some(Change::Toggled { id: target, completed: true })
                );
            })
            .run();
    }

    #[test]
    fn test_toggle_does_not_touch_shared_snapshot() {
        let mut state = seeded(&[("a", false)]);
        let snapshot = Arc::clone(&state.items);
        let id = snapshot[0].id;

        TodoReducer.reduce(&mut state, TodoAction::Toggle { id }, &test_env());

        assert!(!snapshot[0].completed);
        assert!(state.items[0].completed);
    }

    #[test]
    fn test_toggle_unknown_id_is_noop() {
        let state = seeded(&[("a", false)]);
        let revision = state.revision;

        ReducerTest::new(TodoReducer::new())
            .with_env(persisting_env())
            .given_state(state)
            .when_action(TodoAction::Toggle { id: TodoId::new(42) })
            .then_state(move |state| {
                assert_eq!(state.revision, revision);
                assert!(!state.items[0].completed);
                assert_eq!(state.last_error, Some(TodoError::NotFound(TodoId::new(42))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_edit_replaces_text() {
        let state = seeded(&[("a", false), ("b", true)]);
        let id = state.items[1].id;

        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(TodoAction::Edit { id, text: "bee".into() })
            .then_state(move |state| {
                let item = state.get(id).unwrap();
                assert_eq!(item.text, "bee");
                assert!(item.completed);
                assert_eq!(state.items[0].text, "a");
            })
            .run();
    }

    #[test]
    fn test_edit_blank_keeps_prior_text() {
        let state = seeded(&[("keep me", false)]);
        let id = state.items[0].id;

        ReducerTest::new(TodoReducer::new())
            .with_env(persisting_env())
            .given_state(state)
            .when_action(TodoAction::Edit { id, text: "   ".into() })
            .then_state(move |state| {
                assert_eq!(state.get(id).unwrap().text, "keep me");
                assert_eq!(state.last_error, Some(TodoError::EmptyText));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_remove_and_unknown_remove() {
        let state = seeded(&[("a", false), ("b", false), ("c", false)]);
        let middle = state.items[1].id;

        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_actions([
                TodoAction::Remove { id: middle },
                TodoAction::Remove { id: middle },
            ])
            .then_state(move |state| {
                let texts: Vec<_> = state.items.iter().map(|item| item.text.as_str()).collect();
                assert_eq!(texts, ["a", "c"]);
                assert_eq!(state.last_error, Some(TodoError::NotFound(middle)));
            })
            .run();
    }

    #[test]
    fn test_toggle_all_marks_all_complete_when_partial() {
        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(seeded(&[("a", true), ("b", false)]))
            .when_action(TodoAction::ToggleAll)
            .then_state(|state| {
                assert!(state.items.iter().all(|item| item.completed));
                assert_eq!(state.last_change, Some(Change::ToggledAll { completed: true }));
            })
            .run();
    }

    #[test]
    fn test_toggle_all_reactivates_when_all_complete() {
        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(seeded(&[("a", true), ("b", true)]))
            .when_action(TodoAction::ToggleAll)
            .then_state(|state| assert!(state.items.iter().all(|item| !item.completed)))
            .run();
    }

    #[test]
    fn test_toggle_all_on_empty_list_does_nothing() {
        ReducerTest::new(TodoReducer::new())
            .with_env(persisting_env())
            .given_state(TodoState::new())
            .when_action(TodoAction::ToggleAll)
            .then_state(|state| {
                assert_eq!(state.revision, 0);
                assert_eq!(state.last_error, None);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_clear_completed() {
        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(seeded(&[("a", true), ("b", false), ("c", true)]))
            .when_action(TodoAction::ClearCompleted)
            .then_state(|state| {
                assert!(state.view(Filter::Completed).is_empty());
                assert_eq!(state.count(), 1);
                assert_eq!(state.last_change, Some(Change::ClearedCompleted { removed: 2 }));
            })
            .run();
    }

    #[test]
    fn test_clear_completed_without_completed_items_does_not_persist() {
        ReducerTest::new(TodoReducer::new())
            .with_env(persisting_env())
            .given_state(TodoState::new())
            .when_action(TodoAction::ClearCompleted)
            .then_state(|state| assert_eq!(state.revision, 0))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_successful_mutation_clears_last_error() {
        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(TodoState::new())
            .when_actions([add(""), add("ok")])
            .then_state(|state| assert_eq!(state.last_error, None))
            .run();
    }

    #[test]
    fn test_persistence_feedback_is_recorded() {
        ReducerTest::new(TodoReducer::new())
            .with_env(test_env())
            .given_state(TodoState::new())
            .when_actions([
                TodoAction::Persisted { revision: 3 },
                TodoAction::PersistFailed {
                    revision: 4,
                    error: "disk full".into(),
                },
                TodoAction::Persisted { revision: 2 },
            ])
            .then_state(|state| {
                assert_eq!(state.persisted_revision, 3);
                assert_eq!(state.last_persist_error, None);
                assert_eq!(state.revision, 0);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
