use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;

use super::dto::ZoneGroupItem;
use super::format::ZoneFormatter;
use super::repo_types::ZoneGroup;
use super::store::StoreError;

#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("timezone store call exceeded {0:?}")]
    DeadlineExceeded(Duration),
}

/// Runs a store call under a deadline. A timed-out call is dropped before
/// its statement completes or after it commits; either way no partial state
/// is left behind.
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match timeout(limit, call).await {
        Ok(res) => res.map_err(CallError::from),
        Err(_) => Err(CallError::DeadlineExceeded(limit)),
    }
}

/// Attaches display labels without touching the store's grouping or order.
pub fn label_groups(groups: Vec<ZoneGroup>, formatter: &dyn ZoneFormatter) -> Vec<ZoneGroupItem> {
    groups
        .into_iter()
        .map(|g| ZoneGroupItem {
            label: formatter.format(&g.zone),
            zone: g.zone,
            members: g.members,
        })
        .collect()
}
