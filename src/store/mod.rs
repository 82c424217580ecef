mod memory;
mod sqlite;

pub use memory::InMemoryVisitStore;
pub use sqlite::SqliteVisitStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{NewVisit, Transition, Visit, VisitStatus};

/// Durable storage for visits.
///
/// Every method returns visits with their owner attached. Ordering contracts:
/// lists by creation time are newest first with ties broken by id
/// descending; the active list is ordered by check-in descending.
#[async_trait]
pub trait VisitStore: Send + Sync {
    async fn insert(&self, visit: NewVisit) -> Result<Visit>;
    async fn find(&self, id: i64) -> Result<Option<Visit>>;
    /// Apply `transition` only if the visit is currently ACTIVE, as a single
    /// atomic step. Returns false when no row matched the guard.
    async fn transition_active(&self, id: i64, transition: &Transition) -> Result<bool>;
    async fn list_active(&self) -> Result<Vec<Visit>>;
    /// One page of visits by creation time plus the total matching count
    async fn list_page(
        &self,
        status: Option<VisitStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Visit>, i64)>;
    /// Visits created within `[start, end]`, both ends inclusive
    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Visit>>;
    async fn count(&self, status: Option<VisitStatus>) -> Result<i64>;
    /// Visits created within `[start, end)`
    async fn count_created_between(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Result<i64>;
    /// Number of visits per relationship value
    async fn relationship_counts(&self) -> Result<Vec<(String, i64)>>;
}
