use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SetZoneRequest {
    pub zone: String,
}

#[derive(Debug, Serialize)]
pub struct MemberZoneResponse {
    pub zone: String,
    pub label: String,
}

/// One aggregate group; `zone` is the raw key, `label` is display-only.
#[derive(Debug, Serialize)]
pub struct ZoneGroupItem {
    pub zone: String,
    pub label: String,
    pub members: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ZoneListResponse {
    pub groups: Vec<ZoneGroupItem>,
}

#[derive(Debug, Serialize)]
pub struct ZoneStatsResponse {
    pub distinct_zones: i64,
}
