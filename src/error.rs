//! Error types for persisted references.
//!
//! None of these ever reach a reducer: load failures fall back to a default
//! value and both load and save failures are reported on the side channel
//! configured on [`Persistence`](crate::reference::Persistence).

use thiserror::Error;

/// Reading a persisted value failed.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The backend could not produce the stored bytes.
    #[error("backend failed to load `{key}`: {message}")]
    Backend { key: String, message: String },

    /// The stored value did not decode into the requested type.
    #[error("failed to decode `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Writing a persisted value failed.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("backend failed to save `{key}`: {message}")]
    Backend { key: String, message: String },

    #[error("failed to encode `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Payload delivered to an [`ErrorSink`](crate::reference::ErrorSink).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Save(#[from] SaveError),
}

impl PersistenceError {
    /// The persisted key the failure is about.
    pub fn key(&self) -> &str {
        match self {
            PersistenceError::Load(LoadError::Backend { key, .. })
            | PersistenceError::Load(LoadError::Decode { key, .. })
            | PersistenceError::Save(SaveError::Backend { key, .. })
            | PersistenceError::Save(SaveError::Encode { key, .. }) => key,
        }
    }
}

/// Asking the registry for a reference it cannot hand out.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// The key is already bound to a live reference of another value type.
    #[error("key `{key}` is already bound to a `{existing}` reference, requested `{requested}`")]
    TypeMismatch {
        key: String,
        existing: &'static str,
        requested: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_reported_for_every_variant() {
        let load: PersistenceError = LoadError::Backend {
            key: "settings".into(),
            message: "disk unplugged".into(),
        }
        .into();
        assert_eq!(load.key(), "settings");

        let source = serde_json::from_str::<u8>("\"nope\"").unwrap_err();
        let decode: PersistenceError = LoadError::Decode {
            key: "count".into(),
            source,
        }
        .into();
        assert_eq!(decode.key(), "count");
        assert!(decode.to_string().contains("failed to decode `count`"));
    }

    #[test]
    fn type_mismatch_message_names_both_types() {
        let err = ReferenceError::TypeMismatch {
            key: "k".into(),
            existing: "u32",
            requested: "String",
        };
        let message = err.to_string();
        assert!(message.contains("u32"));
        assert!(message.contains("String"));
    }
}
