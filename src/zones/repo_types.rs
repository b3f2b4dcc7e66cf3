use serde::Serialize;
use sqlx::FromRow;

/// Row shape of the aggregation query.
#[derive(Debug, Clone, FromRow)]
pub struct ZoneMemberRow {
    pub zone: String,
    pub member_id: i64,
}

/// Members of a community sharing one raw zone.
///
/// `zone` is the grouping key. Display labels are attached by callers and
/// never used to merge groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneGroup {
    pub zone: String,
    pub members: Vec<i64>,
}
