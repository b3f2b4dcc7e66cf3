use std::collections::HashMap;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use sqlx::error::ErrorKind;
use thiserror::Error;
use tracing::debug;

use super::repo_types::{ZoneGroup, ZoneMemberRow};

/// Records whose last activity is older than this are left out of aggregates.
pub const STALENESS_WINDOW_DAYS: i32 = 30;

/// Maximum number of zone groups returned by an aggregate query.
pub const POPULARITY_CAP: usize = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("timezone store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("timezone store constraint violation: {0}")]
    ConstraintViolation(#[source] sqlx::Error),
    #[error("timezone store error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        debug!(error = %err, "timezone store operation failed");
        if is_constraint_violation(&err) {
            return StoreError::ConstraintViolation(err);
        }
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err),
            other => StoreError::Database(other),
        }
    }
}

fn is_constraint_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        ),
        _ => false,
    }
}

/// Durable per-community timezone storage.
///
/// Implementations must be safe to share between concurrent tasks; every
/// method is a single all-or-nothing operation and performs no retries.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    /// Bumps `last_active` for an existing record. Missing records are left alone.
    async fn record_activity(&self, community_id: i64, member_id: i64) -> Result<(), StoreError>;

    /// Removes the record if present.
    async fn delete_record(&self, community_id: i64, member_id: i64) -> Result<(), StoreError>;

    /// Inserts the record or replaces its zone and timestamp in one step.
    async fn upsert_record(
        &self,
        community_id: i64,
        member_id: i64,
        zone: &str,
    ) -> Result<(), StoreError>;

    async fn get_one(&self, community_id: i64, member_id: i64)
        -> Result<Option<String>, StoreError>;

    /// Groups recently active members by raw zone, capped to the most
    /// popular zones. Group order is shuffled on every call.
    async fn get_aggregated(&self, community_id: i64) -> Result<Vec<ZoneGroup>, StoreError>;

    /// Distinct zones across the whole table, active or not.
    async fn get_zone_cardinality(&self) -> Result<i64, StoreError>;
}

/// Collects rows into groups keyed by the raw zone, in first-seen order.
pub(crate) fn group_rows<I>(rows: I) -> Vec<ZoneGroup>
where
    I: IntoIterator<Item = ZoneMemberRow>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ZoneGroup> = Vec::new();
    for row in rows {
        match index.get(&row.zone) {
            Some(&i) => groups[i].members.push(row.member_id),
            None => {
                index.insert(row.zone.clone(), groups.len());
                groups.push(ZoneGroup {
                    zone: row.zone,
                    members: vec![row.member_id],
                });
            }
        }
    }
    groups
}

pub(crate) fn shuffle_groups(groups: &mut [ZoneGroup]) {
    groups.shuffle(&mut rand::thread_rng());
}
