use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::auth::ScopedQuery;
use crate::models::{DispatchList, Driver, NewDriver};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record {0} disappeared while saving")]
    Missing(i64),

    #[error("Driver name already in use")]
    NameTaken,
}

/// Receiving end of a scan. Closing it stops the scan early.
pub type RecordSink<T> = mpsc::Sender<Result<T, StoreError>>;

/// Storage for driver rows.
///
/// Every method taking a [`ScopedQuery`] only sees rows owned by `query.owner`
/// with `is_delete = false`.
#[async_trait]
pub trait DriverStore: Send + Sync {
    /// Row by id with no owner or soft-delete filtering
    async fn find(&self, id: i64) -> Result<Option<Driver>, StoreError>;

    /// Whether a live row of `owner` already uses `driver_name`
    async fn name_taken(
        &self,
        owner: &str,
        driver_name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError>;

    /// Add a live row. Backends that can check and insert in one step fail
    /// with [`StoreError::NameTaken`] when the owner already uses the name;
    /// the others rely on the caller's [`name_taken`](Self::name_taken) check.
    async fn insert(&self, new: NewDriver) -> Result<Driver, StoreError>;

    /// Persist the writable fields and `is_delete`, refreshing `update_time`.
    /// Same [`StoreError::NameTaken`] contract as [`insert`](Self::insert).
    async fn save(&self, driver: &Driver) -> Result<Driver, StoreError>;

    async fn count(&self, query: &ScopedQuery) -> Result<i64, StoreError>;

    async fn fetch(
        &self,
        query: &ScopedQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Driver>, StoreError>;

    /// Push every matching row, in order, into `sink` from a single cursor
    async fn scan(&self, query: &ScopedQuery, sink: &RecordSink<Driver>) -> Result<(), StoreError>;
}

/// Read-only storage for dispatch list rows. Scoped by owner only.
#[async_trait]
pub trait DispatchListStore: Send + Sync {
    async fn count(&self, query: &ScopedQuery) -> Result<i64, StoreError>;

    async fn fetch(
        &self,
        query: &ScopedQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<DispatchList>, StoreError>;
}
