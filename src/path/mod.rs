//! Statically typed paths into state and actions.
//!
//! - [`KeyPath`] reaches a field (product types).
//! - [`CasePath`] reaches the payload of one variant (sum types).
//!
//! Both carry a [`PathId`] so that derived stores and shared handles can be
//! cached by path rather than by closure identity.

mod case_path;
mod key_path;

pub use case_path::CasePath;
pub use key_path::KeyPath;

use std::fmt;
use std::sync::Arc;

const ROOT: &str = "self";

/// Stable name of a path, used as a cache key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(Arc<str>);

impl PathId {
    /// The identity path.
    pub fn root() -> Self {
        PathId(Arc::from(ROOT))
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == ROOT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `self` followed by `next`; the identity path is absorbed.
    pub fn append(&self, next: &PathId) -> PathId {
        if self.is_root() {
            next.clone()
        } else if next.is_root() {
            self.clone()
        } else {
            PathId(Arc::from(format!("{}.{}", self.0, next.0)))
        }
    }
}

impl From<&str> for PathId {
    fn from(id: &str) -> Self {
        PathId(Arc::from(id))
    }
}

impl From<String> for PathId {
    fn from(id: String) -> Self {
        PathId(Arc::from(id))
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.0)
    }
}

/// Build a [`KeyPath`] to a (possibly nested) field.
///
/// ```
/// use statebox::key_path;
///
/// #[derive(Clone, Default)]
/// struct Counter { count: i32 }
///
/// let count = key_path!(Counter => count);
/// assert_eq!(count.get(&Counter { count: 4 }), 4);
/// ```
#[macro_export]
macro_rules! key_path {
    ($root:ty => $($field:ident).+) => {
        $crate::path::KeyPath::<$root, _>::new(
            concat!(stringify!($root), "::", stringify!($($field).+)),
            |root: &$root| &root.$($field).+,
            |root: &mut $root| &mut root.$($field).+,
        )
    };
}

/// Build a [`CasePath`] to the payload of a single-field tuple variant.
///
/// ```
/// use statebox::case_path;
///
/// #[derive(Debug, PartialEq)]
/// enum Action { Counter(i32), Reset }
///
/// let counter = case_path!(Action::Counter);
/// assert_eq!(counter.embed(3), Action::Counter(3));
/// assert!(counter.extract(&Action::Reset).is_none());
/// ```
#[macro_export]
macro_rules! case_path {
    ($enum:ident :: $variant:ident) => {
        $crate::path::CasePath::<$enum, _>::new(
            concat!(stringify!($enum), "::", stringify!($variant)),
            $enum::$variant,
            |root: &$enum| match root {
                $enum::$variant(value) => Some(value),
                #[allow(unreachable_patterns)]
                _ => None,
            },
            |root: &mut $enum| match root {
                $enum::$variant(value) => Some(value),
                #[allow(unreachable_patterns)]
                _ => None,
            },
            |root: $enum| match root {
                $enum::$variant(value) => Ok(value),
                #[allow(unreachable_patterns)]
                other => Err(other),
            },
        )
    };
}
