use std::collections::HashMap;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use super::repo_types::{ZoneGroup, ZoneMemberRow};
use super::store::{
    group_rows, shuffle_groups, StoreError, ZoneStore, POPULARITY_CAP, STALENESS_WINDOW_DAYS,
};

/// Stored row, mirroring the `member_timezones` table.
#[derive(Debug, Clone)]
struct TimezoneRecord {
    community_id: i64,
    member_id: i64,
    zone: String,
    last_active: OffsetDateTime,
}

/// In-process [`ZoneStore`] with the same query semantics as the Postgres one.
#[derive(Default)]
pub struct MemoryZoneStore {
    records: RwLock<HashMap<(i64, i64), TimezoneRecord>>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides `last_active` for fixtures that need stale records.
    pub async fn set_last_active(&self, community_id: i64, member_id: i64, at: OffsetDateTime) {
        if let Some(rec) = self.records.write().await.get_mut(&(community_id, member_id)) {
            rec.last_active = at;
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ZoneStore for MemoryZoneStore {
    async fn record_activity(&self, community_id: i64, member_id: i64) -> Result<(), StoreError> {
        if let Some(rec) = self.records.write().await.get_mut(&(community_id, member_id)) {
            rec.last_active = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn delete_record(&self, community_id: i64, member_id: i64) -> Result<(), StoreError> {
        self.records.write().await.remove(&(community_id, member_id));
        Ok(())
    }

    async fn upsert_record(
        &self,
        community_id: i64,
        member_id: i64,
        zone: &str,
    ) -> Result<(), StoreError> {
        self.records.write().await.insert(
            (community_id, member_id),
            TimezoneRecord {
                community_id,
                member_id,
                zone: zone.to_string(),
                last_active: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    async fn get_one(
        &self,
        community_id: i64,
        member_id: i64,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(&(community_id, member_id))
            .map(|rec| rec.zone.clone()))
    }

    async fn get_aggregated(&self, community_id: i64) -> Result<Vec<ZoneGroup>, StoreError> {
        let cutoff = OffsetDateTime::now_utc() - Duration::days(STALENESS_WINDOW_DAYS.into());
        let records = self.records.read().await;
        let active: Vec<&TimezoneRecord> = records
            .values()
            .filter(|rec| rec.community_id == community_id && rec.last_active >= cutoff)
            .collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for rec in &active {
            *counts.entry(rec.zone.as_str()).or_default() += 1;
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(POPULARITY_CAP);

        let rows = active
            .iter()
            .filter(|rec| ranked.iter().any(|(zone, _)| *zone == rec.zone))
            .map(|rec| ZoneMemberRow {
                zone: rec.zone.clone(),
                member_id: rec.member_id,
            });
        let mut groups = group_rows(rows);
        shuffle_groups(&mut groups);
        Ok(groups)
    }

    async fn get_zone_cardinality(&self) -> Result<i64, StoreError> {
        let records = self.records.read().await;
        let mut zones: Vec<&str> = records.values().map(|rec| rec.zone.as_str()).collect();
        zones.sort_unstable();
        zones.dedup();
        Ok(zones.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn sorted(mut groups: Vec<ZoneGroup>) -> Vec<ZoneGroup> {
        for g in &mut groups {
            g.members.sort_unstable();
        }
        groups.sort_by(|a, b| a.zone.cmp(&b.zone));
        groups
    }

    #[tokio::test]
    async fn get_one_reflects_upsert_and_delete() {
        let store = MemoryZoneStore::new();
        assert_eq!(store.get_one(1, 4).await.unwrap(), None);

        store.upsert_record(1, 4, "Europe/Paris").await.unwrap();
        assert_eq!(store.get_one(1, 4).await.unwrap().as_deref(), Some("Europe/Paris"));

        store.delete_record(1, 4).await.unwrap();
        assert_eq!(store.get_one(1, 4).await.unwrap(), None);
        store.delete_record(1, 4).await.unwrap();
        assert_eq!(store.get_one(1, 4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_overwrite_keeps_one_record() {
        let store = MemoryZoneStore::new();
        store.upsert_record(1, 1, "A").await.unwrap();
        store.upsert_record(1, 1, "B").await.unwrap();
        assert_eq!(store.get_one(1, 1).await.unwrap().as_deref(), Some("B"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn activity_never_creates_records() {
        let store = MemoryZoneStore::new();
        store.record_activity(3, 3).await.unwrap();
        assert_eq!(store.len().await, 0);
        assert_eq!(store.get_one(3, 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn activity_advances_timestamp() {
        let store = MemoryZoneStore::new();
        store.upsert_record(2, 9, "UTC").await.unwrap();
        let old = OffsetDateTime::now_utc() - Duration::days(60);
        store.set_last_active(2, 9, old).await;
        assert!(store.get_aggregated(2).await.unwrap().is_empty());

        store.record_activity(2, 9).await.unwrap();
        let last_active = store.records.read().await[&(2, 9)].last_active;
        assert!(last_active > old);
        assert_eq!(store.get_aggregated(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn aggregate_groups_by_zone() {
        let store = MemoryZoneStore::new();
        store.upsert_record(1, 1, "UTC").await.unwrap();
        store.upsert_record(1, 2, "UTC").await.unwrap();
        store.upsert_record(1, 3, "PST").await.unwrap();
        store.upsert_record(2, 4, "Asia/Tokyo").await.unwrap();

        let groups = sorted(store.get_aggregated(1).await.unwrap());
        assert_eq!(
            groups,
            vec![
                ZoneGroup {
                    zone: "PST".into(),
                    members: vec![3]
                },
                ZoneGroup {
                    zone: "UTC".into(),
                    members: vec![1, 2]
                },
            ]
        );
    }

    #[tokio::test]
    async fn aggregate_applies_staleness_window() {
        let store = MemoryZoneStore::new();
        let now = OffsetDateTime::now_utc();
        store.upsert_record(1, 1, "UTC").await.unwrap();
        store.set_last_active(1, 1, now - Duration::days(29)).await;
        store.upsert_record(1, 2, "PST").await.unwrap();
        store.set_last_active(1, 2, now - Duration::days(31)).await;

        let groups = store.get_aggregated(1).await.unwrap();
        assert_eq!(
            groups,
            vec![ZoneGroup {
                zone: "UTC".into(),
                members: vec![1]
            }]
        );
        // stale records are still stored
        assert_eq!(store.get_one(1, 2).await.unwrap().as_deref(), Some("PST"));
    }

    #[tokio::test]
    async fn aggregate_of_empty_community_is_empty() {
        let store = MemoryZoneStore::new();
        assert!(store.get_aggregated(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn aggregate_caps_to_most_popular_zones() {
        let store = MemoryZoneStore::new();
        let mut member = 0;
        for k in 0..25usize {
            for _ in 0..=k {
                member += 1;
                store
                    .upsert_record(1, member, &format!("Zone/{k:02}"))
                    .await
                    .unwrap();
            }
        }

        let groups = store.get_aggregated(1).await.unwrap();
        assert_eq!(groups.len(), POPULARITY_CAP);
        let zones: HashSet<String> = groups.iter().map(|g| g.zone.clone()).collect();
        let expected: HashSet<String> = (5..25).map(|k| format!("Zone/{k:02}")).collect();
        assert_eq!(zones, expected);
        for g in &groups {
            let k: usize = g.zone[5..].parse().unwrap();
            assert_eq!(g.members.len(), k + 1, "members truncated for {}", g.zone);
        }
    }

    #[tokio::test]
    async fn aggregate_order_varies_between_calls() {
        let store = MemoryZoneStore::new();
        for k in 0..POPULARITY_CAP as i64 {
            store.upsert_record(1, k, &format!("Zone/{k:02}")).await.unwrap();
        }
        let first: Vec<String> = store
            .get_aggregated(1)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.zone)
            .collect();

        let mut varied = false;
        for _ in 0..16 {
            let next: Vec<String> = store
                .get_aggregated(1)
                .await
                .unwrap()
                .into_iter()
                .map(|g| g.zone)
                .collect();
            assert_eq!(next.len(), first.len());
            if next != first {
                varied = true;
                break;
            }
        }
        assert!(varied, "group order never changed across calls");
    }

    #[tokio::test]
    async fn cardinality_counts_distinct_zones_everywhere() {
        let store = MemoryZoneStore::new();
        store.upsert_record(1, 1, "UTC").await.unwrap();
        store.upsert_record(1, 2, "UTC").await.unwrap();
        store.upsert_record(2, 3, "PST").await.unwrap();
        store
            .set_last_active(2, 3, OffsetDateTime::now_utc() - Duration::days(90))
            .await;
        assert_eq!(store.get_zone_cardinality().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_upserts_leave_one_consistent_record() {
        let store = Arc::new(MemoryZoneStore::new());
        let zones = ["UTC", "Europe/Oslo", "Asia/Kolkata", "America/Denver"];
        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            let zone = zones[i % zones.len()];
            tasks.push(tokio::spawn(async move {
                store.upsert_record(1, 1, zone).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(store.len().await, 1);
        let zone = store.get_one(1, 1).await.unwrap().unwrap();
        assert!(zones.contains(&zone.as_str()));
    }
}
