//! Error types shared by every layer of the object tree.

use thiserror::Error;

/// Failures surfaced by node creation and kind-checked operations.
///
/// Not-found is never an error: lookups return `Option` (or a null `Obj`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("allocation of {size} bytes aligned to {align} failed")]
    AllocFailed { size: usize, align: usize },

    #[error("invalid payload layout: size {size}, align {align}")]
    InvalidLayout { size: usize, align: usize },

    #[error("node limit of {limit} reached")]
    NodeLimit { limit: usize },

    #[error("node handle is stale or was never issued by this heap")]
    StaleNode,

    #[error("expected a {expected} node, found {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Insert(#[from] InsertError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Map insertion failure; the map is left unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    #[error("key already present")]
    DuplicateKey,

    #[error("target is not a live map node")]
    NotAMap,

    #[error("value node is stale")]
    StaleValue,
}

/// Report a broken caller contract: fatal in debug builds, logged and
/// ignored in release builds.
macro_rules! contract_violation {
    ($($arg:tt)+) => {{
        tracing::warn!($($arg)+);
        debug_assert!(false, $($arg)+);
    }};
}

pub(crate) use contract_violation;
