use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use super::repo_types::{ZoneGroup, ZoneMemberRow};
use super::store::{
    group_rows, shuffle_groups, StoreError, ZoneStore, POPULARITY_CAP, STALENESS_WINDOW_DAYS,
};
use crate::config::AppConfig;

/// Postgres-backed [`ZoneStore`] over a shared connection pool.
#[derive(Clone)]
pub struct PgZoneStore {
    db: PgPool,
}

impl PgZoneStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        info!(max_connections = config.max_connections, "timezone store connected");
        Ok(Self::from_pool(db))
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }

    /// Waits for checked-out connections to return, then closes the pool.
    pub async fn close(&self) {
        self.db.close().await;
        info!("timezone store closed");
    }
}

#[async_trait]
impl ZoneStore for PgZoneStore {
    async fn record_activity(&self, community_id: i64, member_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE member_timezones
               SET last_active = now()
             WHERE community_id = $1 AND member_id = $2
            "#,
        )
        .bind(community_id)
        .bind(member_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_record(&self, community_id: i64, member_id: i64) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            DELETE FROM member_timezones
             WHERE community_id = $1 AND member_id = $2
            "#,
        )
        .bind(community_id)
        .bind(member_id)
        .execute(&self.db)
        .await?;
        debug!(community_id, member_id, removed = res.rows_affected(), "timezone deleted");
        Ok(())
    }

    async fn upsert_record(
        &self,
        community_id: i64,
        member_id: i64,
        zone: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO member_timezones (community_id, member_id, zone, last_active)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (community_id, member_id)
            DO UPDATE SET zone = EXCLUDED.zone, last_active = EXCLUDED.last_active
            "#,
        )
        .bind(community_id)
        .bind(member_id)
        .bind(zone)
        .execute(&self.db)
        .await?;
        debug!(community_id, member_id, zone, "timezone upserted");
        Ok(())
    }

    async fn get_one(
        &self,
        community_id: i64,
        member_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let zone = sqlx::query_scalar::<_, String>(
            r#"
            SELECT zone
              FROM member_timezones
             WHERE community_id = $1 AND member_id = $2
            "#,
        )
        .bind(community_id)
        .bind(member_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(zone)
    }

    async fn get_aggregated(&self, community_id: i64) -> Result<Vec<ZoneGroup>, StoreError> {
        let rows = sqlx::query_as::<_, ZoneMemberRow>(
            r#"
            WITH active AS (
                SELECT zone, member_id
                  FROM member_timezones
                 WHERE community_id = $1
                   AND last_active >= now() - make_interval(days => $2)
            ),
            popular AS (
                SELECT zone
                  FROM active
                 GROUP BY zone
                 ORDER BY count(*) DESC, zone ASC
                 LIMIT $3
            )
            SELECT a.zone, a.member_id
              FROM active a
              JOIN popular p ON p.zone = a.zone
            "#,
        )
        .bind(community_id)
        .bind(STALENESS_WINDOW_DAYS)
        .bind(POPULARITY_CAP as i64)
        .fetch_all(&self.db)
        .await?;

        let mut groups = group_rows(rows);
        shuffle_groups(&mut groups);
        debug!(community_id, groups = groups.len(), "timezone aggregate built");
        Ok(groups)
    }

    async fn get_zone_cardinality(&self) -> Result<i64, StoreError> {
        let count =
            sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(DISTINCT zone) FROM member_timezones"#)
                .fetch_one(&self.db)
                .await?;
        Ok(count)
    }
}
