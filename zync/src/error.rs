//! Error type of the app facade.

use crate::backend::BackendError;
use crate::catalog::CatalogError;
use crate::storage::StorageError;
use thiserror::Error;
use zync_runtime::StoreError;

/// Errors returned by [`crate::ZyncApp`]
#[derive(Debug, Error)]
pub enum ZyncError {
    /// Store runtime failure (shutdown, timeout)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A command was refused by a reducer
    #[error("{0}")]
    Rejected(String),

    /// Backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Token storage failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Catalog call failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The operation needs a signed-in session
    #[error("Not signed in")]
    NotAuthenticated,
}

/// Result alias for facade calls
pub type Result<T> = std::result::Result<T, ZyncError>;
