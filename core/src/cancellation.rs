//! Cancellation identifiers and tokens.
//!
//! An [`EffectId`] names one or more running effects so a reducer can cancel
//! or replace them later. A [`CancellationToken`] is the cooperative signal
//! handed down the effect tree: running effects observe it at every
//! suspension point and stop delivering values once it fires. Cancellable
//! effects run on a child token of the one they were started with.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

/// Identifier addressing running effects for cancellation and throttling
///
/// Identifiers compare by value, so two effects built from equal ids at
/// different call sites address the same work. Use [`EffectId::of`] to
/// derive an identifier from a marker type when a string could collide.
///
/// # Example
///
/// ```
/// use tessera_core::EffectId;
///
/// struct SearchRequest;
///
/// let by_name = EffectId::from("search");
/// let by_type = EffectId::of::<SearchRequest>();
/// let per_row = EffectId::from(42_u64).scoped("row-timer");
///
/// assert_ne!(by_name, by_type);
/// assert_eq!(per_row, EffectId::from(42_u64).scoped("row-timer"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EffectId {
    /// Identifier given by name
    Name(Cow<'static, str>),

    /// Numeric identifier (row ids, request counters)
    Number(u64),

    /// Identifier synthesized from a static marker type
    Type {
        /// Type identity
        type_id: TypeId,
        /// Type name, for diagnostics
        type_name: &'static str,
    },

    /// An identifier namespaced under another one
    Scoped {
        /// Enclosing namespace
        scope: Box<EffectId>,
        /// Identifier inside the namespace
        id: Box<EffectId>,
    },
}

impl EffectId {
    /// Derive an identifier from a marker type
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Create a named identifier
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Name(name.into())
    }

    /// Namespace this identifier under `scope`
    #[must_use]
    pub fn scoped(self, scope: impl Into<Self>) -> Self {
        Self::Scoped {
            scope: Box::new(scope.into()),
            id: Box::new(self),
        }
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Number(number) => write!(f, "#{number}"),
            Self::Type { type_name, .. } => write!(f, "{type_name}"),
            Self::Scoped { scope, id } => write!(f, "{scope}/{id}"),
        }
    }
}

impl From<&'static str> for EffectId {
    fn from(name: &'static str) -> Self {
        Self::Name(Cow::Borrowed(name))
    }
}

impl From<String> for EffectId {
    fn from(name: String) -> Self {
        Self::Name(Cow::Owned(name))
    }
}

impl From<u64> for EffectId {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

/// Cooperative cancellation signal
///
/// Cloning a token yields another handle to the same signal. Child tokens
/// are cancelled together with their parent, but cancelling a child leaves
/// the parent untouched.
///
/// # Example
///
/// ```
/// use tessera_core::CancellationToken;
///
/// let parent = CancellationToken::new();
/// let child = parent.child_token();
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// ```
pub use tokio_util::sync::CancellationToken;
