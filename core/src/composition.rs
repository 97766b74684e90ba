//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`**: Run multiple reducers on the same state/action
//! - **`scope_reducer`**: Focus a reducer on a subset of state
//! - **`pullback`**: Focus a reducer on a subset of state *and* actions,
//!   mapping the child's effects back into the parent's action type
//!
//! # Examples
//!
//! ## Combining Reducers
//!
//! ```
//! use tessera_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//! use tessera_core::composition::combine_reducers;
//!
//! #[derive(Clone, Default)]
//! struct PanelState {
//!     width: u32,
//!     title: String,
//! }
//!
//! #[derive(Clone)]
//! enum PanelAction {
//!     Resized(u32),
//!     Renamed(String),
//! }
//!
//! struct LayoutReducer;
//! struct TitleReducer;
//!
//! impl Reducer for LayoutReducer {
//!     type State = PanelState;
//!     type Action = PanelAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut PanelState, action: PanelAction, _env: &()) -> SmallVec<[Effect<PanelAction>; 4]> {
//!         if let PanelAction::Resized(width) = action {
//!             state.width = width;
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! impl Reducer for TitleReducer {
//!     type State = PanelState;
//!     type Action = PanelAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut PanelState, action: PanelAction, _env: &()) -> SmallVec<[Effect<PanelAction>; 4]> {
//!         if let PanelAction::Renamed(title) = action {
//!             state.title = title;
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let combined = combine_reducers(vec![Box::new(LayoutReducer), Box::new(TitleReducer)]);
//! let mut state = PanelState::default();
//! let _ = combined.reduce(&mut state, PanelAction::Resized(640), &());
//! assert_eq!(state.width, 640);
//! ```

use crate::effect::Effect;
use crate::reducer::Reducer;
use smallvec::SmallVec;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in sequence, and all effects are collected and concatenated.
///
/// # Type Parameters
///
/// - `S`: The state type
/// - `A`: The action type
/// - `E`: The environment type
#[must_use]
pub fn combine_reducers<S, A, E>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E>>>,
) -> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E>>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        self.reducers
            .iter()
            .flat_map(|reducer| reducer.reduce(state, action.clone(), env))
            .collect()
    }
}

/// Scopes a reducer to operate on a subset of a larger state.
///
/// The sub-state is cloned out, reduced, and written back.
///
/// # Examples
///
/// ```
/// use tessera_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
/// use tessera_core::composition::scope_reducer;
///
/// #[derive(Clone, Default)]
/// struct CursorState {
///     row: usize,
/// }
///
/// #[derive(Clone)]
/// enum CursorAction {
///     Down,
/// }
///
/// struct CursorReducer;
///
/// impl Reducer for CursorReducer {
///     type State = CursorState;
///     type Action = CursorAction;
///     type Environment = ();
///
///     fn reduce(&self, state: &mut CursorState, action: CursorAction, _env: &()) -> SmallVec<[Effect<CursorAction>; 4]> {
///         match action {
///             CursorAction::Down => state.row += 1,
///         }
///         smallvec![Effect::None]
///     }
/// }
///
/// #[derive(Clone, Default)]
/// struct EditorState {
///     cursor: CursorState,
///     path: String,
/// }
///
/// let scoped = scope_reducer(
///     CursorReducer,
///     |editor: &EditorState| &editor.cursor,
///     |editor: &mut EditorState, cursor: CursorState| editor.cursor = cursor,
/// );
///
/// let mut state = EditorState::default();
/// let _ = scoped.reduce(&mut state, CursorAction::Down, &());
/// assert_eq!(state.cursor.row, 1);
/// ```
pub fn scope_reducer<S, SubS, A, E, R>(
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
) -> ScopedReducer<S, SubS, A, E, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    E: 'static,
    R: Reducer<State = SubS, Action = A, Environment = E>,
{
    ScopedReducer {
        reducer,
        get_state,
        set_state,
        _phantom: std::marker::PhantomData,
    }
}

/// A scoped reducer that operates on a subset of state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, SubS, A, E, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    E: 'static,
    R: Reducer<State = SubS, Action = A, Environment = E>,
{
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
    _phantom: std::marker::PhantomData<(A, E)>,
}

impl<S, SubS, A, E, R> Reducer for ScopedReducer<S, SubS, A, E, R>
where
    S: 'static,
    SubS: Clone + 'static,
    A: 'static,
    E: 'static,
    R: Reducer<State = SubS, Action = A, Environment = E>,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let mut sub_state = (self.get_state)(state).clone();
        let effects = self.reducer.reduce(&mut sub_state, action, env);
        (self.set_state)(state, sub_state);
        effects
    }
}

/// Pulls a child reducer back into a parent's state and action types.
///
/// Parent actions that `extract_action` maps to a child action are reduced
/// against the child's state; everything the child emits is wrapped with
/// `embed_action`, keeping cancellation and throttle identifiers intact.
/// Other parent actions leave the state alone and produce no effects.
///
/// # Examples
///
/// ```
/// use tessera_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
/// use tessera_core::composition::pullback;
///
/// #[derive(Clone, Default)]
/// struct FilterState {
///     needle: String,
/// }
///
/// #[derive(Clone, Debug)]
/// enum FilterAction {
///     Typed(String),
/// }
///
/// struct FilterReducer;
///
/// impl Reducer for FilterReducer {
///     type State = FilterState;
///     type Action = FilterAction;
///     type Environment = ();
///
///     fn reduce(&self, state: &mut FilterState, action: FilterAction, _env: &()) -> SmallVec<[Effect<FilterAction>; 4]> {
///         let FilterAction::Typed(needle) = action;
///         state.needle = needle;
///         smallvec![Effect::None]
///     }
/// }
///
/// #[derive(Clone, Default)]
/// struct AppState {
///     filter: FilterState,
/// }
///
/// #[derive(Clone, Debug)]
/// enum AppAction {
///     Filter(FilterAction),
///     Quit,
/// }
///
/// let app = pullback(
///     FilterReducer,
///     |app: &AppState| &app.filter,
///     |app: &mut AppState, filter| app.filter = filter,
///     |action: AppAction| match action {
///         AppAction::Filter(action) => Some(action),
///         AppAction::Quit => None,
///     },
///     AppAction::Filter,
/// );
///
/// let mut state = AppState::default();
/// let _ = app.reduce(&mut state, AppAction::Filter(FilterAction::Typed("rs".into())), &());
/// assert_eq!(state.filter.needle, "rs");
/// assert!(app.reduce(&mut state, AppAction::Quit, &()).is_empty());
/// ```
pub fn pullback<S, SubS, A, SubA, E, R>(
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
    extract_action: fn(A) -> Option<SubA>,
    embed_action: fn(SubA) -> A,
) -> PulledBackReducer<S, SubS, A, SubA, E, R>
where
    SubS: Clone,
    A: Send + 'static,
    SubA: Send + 'static,
    R: Reducer<State = SubS, Action = SubA, Environment = E>,
{
    PulledBackReducer {
        reducer,
        get_state,
        set_state,
        extract_action,
        embed_action,
        _phantom: std::marker::PhantomData,
    }
}

/// A child reducer lifted into a parent's state and action types.
///
/// Created by [`pullback`].
pub struct PulledBackReducer<S, SubS, A, SubA, E, R> {
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
    extract_action: fn(A) -> Option<SubA>,
    embed_action: fn(SubA) -> A,
    _phantom: std::marker::PhantomData<fn() -> E>,
}

impl<S, SubS, A, SubA, E, R> Reducer for PulledBackReducer<S, SubS, A, SubA, E, R>
where
    SubS: Clone,
    A: Send + 'static,
    SubA: Send + 'static,
    R: Reducer<State = SubS, Action = SubA, Environment = E>,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let Some(child_action) = (self.extract_action)(action) else {
            return SmallVec::new();
        };

        let mut sub_state = (self.get_state)(state).clone();
        let effects = self.reducer.reduce(&mut sub_state, child_action, env);
        (self.set_state)(state, sub_state);

        let embed_action = self.embed_action;
        effects
            .into_iter()
            .map(|effect| effect.map(embed_action))
            .collect()
    }
}
