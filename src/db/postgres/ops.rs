use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use tokio_postgres::Row;

use crate::db::models::{
    CycleBatch, LpPoolSnapshot, MetricCategory, MetricPayload, MetricSnapshot, MetricValue, Unit,
};
use crate::db::postgres::PostgresClient;
use crate::db::SnapshotStore;
use crate::error::{CollectorError, CollectorResult};

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

/// Group rows ordered by (timestamp, key) into one snapshot per timestamp.
fn group_rows(
    category: MetricCategory,
    rows: impl IntoIterator<Item = (DateTime<Utc>, String, f64, String)>,
) -> CollectorResult<Vec<MetricSnapshot>> {
    let mut snapshots: Vec<MetricSnapshot> = Vec::new();

    for (timestamp, key, value, unit) in rows {
        let unit: Unit = unit.parse().map_err(CollectorError::Persistence)?;
        let value = MetricValue { value, unit };

        match snapshots.last_mut() {
            Some(last) if last.timestamp == timestamp => {
                last.payload.insert(key, value);
            },
            _ => {
                let mut payload = MetricPayload::new();
                payload.insert(key, value);
                snapshots.push(MetricSnapshot { timestamp, category, payload });
            },
        }
    }

    Ok(snapshots)
}

fn metric_row(row: &Row) -> (DateTime<Utc>, String, f64, String) {
    (row.get("timestamp"), row.get("key"), row.get("value"), row.get("unit"))
}

fn row_to_lp_pool(row: &Row) -> LpPoolSnapshot {
    LpPoolSnapshot {
        timestamp: row.get("timestamp"),
        pool_address: row.get("pool_address"),
        symbol: row.get("symbol"),
        liquidity_usd: row.get("liquidity_usd"),
        volume_usd: row.get("volume_usd"),
        fees_usd: row.get("fees_usd"),
        yield_pool_fees: row.get("yield_pool_fees"),
        yield_astro_rewards: row.get("yield_astro_rewards"),
        yield_external_rewards: row.get("yield_external_rewards"),
        yield_total: row.get("yield_total"),
    }
}

impl PostgresClient {
    // ==================== BATCH INSERTS ====================

    async fn insert_metrics(
        tx: &deadpool_postgres::Transaction<'_>,
        batch: &CycleBatch,
    ) -> CollectorResult<usize> {
        let rows = batch.record_count() - batch.lp_pools().len();
        if rows == 0 {
            return Ok(0);
        }

        let mut timestamps = Vec::with_capacity(rows);
        let mut categories = Vec::with_capacity(rows);
        let mut keys = Vec::with_capacity(rows);
        let mut values = Vec::with_capacity(rows);
        let mut units = Vec::with_capacity(rows);

        for snapshot in batch.snapshots() {
            for (key, value) in &snapshot.payload {
                timestamps.push(snapshot.timestamp);
                categories.push(snapshot.category.as_str());
                keys.push(sanitize_string(key));
                values.push(value.value);
                units.push(value.unit.as_str());
            }
        }

        let stmt = "
            INSERT INTO collector.metric_snapshots (timestamp, category, key, value, unit)
            SELECT * FROM UNNEST(
                $1::timestamptz[],
                $2::text[],
                $3::text[],
                $4::float8[],
                $5::text[]
            )
        ";

        tx.execute(stmt, &[&timestamps, &categories, &keys, &values, &units])
            .await
            .map_err(|e| {
                error!("Failed to insert {} metric rows: {:?}", rows, e);
                e
            })?;

        Ok(rows)
    }

    async fn insert_lp_pools(
        tx: &deadpool_postgres::Transaction<'_>,
        pools: &[LpPoolSnapshot],
    ) -> CollectorResult<usize> {
        if pools.is_empty() {
            return Ok(0);
        }

        let timestamps: Vec<DateTime<Utc>> = pools.iter().map(|p| p.timestamp).collect();
        let addresses: Vec<String> = pools.iter().map(|p| sanitize_string(&p.pool_address)).collect();
        let symbols: Vec<String> = pools.iter().map(|p| sanitize_string(&p.symbol)).collect();
        let liquidity: Vec<f64> = pools.iter().map(|p| p.liquidity_usd).collect();
        let volume: Vec<f64> = pools.iter().map(|p| p.volume_usd).collect();
        let fees: Vec<f64> = pools.iter().map(|p| p.fees_usd).collect();
        let yield_fees: Vec<f64> = pools.iter().map(|p| p.yield_pool_fees).collect();
        let yield_astro: Vec<f64> = pools.iter().map(|p| p.yield_astro_rewards).collect();
        let yield_external: Vec<f64> = pools.iter().map(|p| p.yield_external_rewards).collect();
        let yield_total: Vec<f64> = pools.iter().map(|p| p.yield_total).collect();

        let stmt = "
            INSERT INTO collector.lp_pool_snapshots (
                timestamp, pool_address, symbol, liquidity_usd, volume_usd, fees_usd,
                yield_pool_fees, yield_astro_rewards, yield_external_rewards, yield_total
            )
            SELECT * FROM UNNEST(
                $1::timestamptz[],
                $2::text[],
                $3::text[],
                $4::float8[],
                $5::float8[],
                $6::float8[],
                $7::float8[],
                $8::float8[],
                $9::float8[],
                $10::float8[]
            )
        ";

        tx.execute(
            stmt,
            &[
                &timestamps,
                &addresses,
                &symbols,
                &liquidity,
                &volume,
                &fees,
                &yield_fees,
                &yield_astro,
                &yield_external,
                &yield_total,
            ],
        )
        .await
        .map_err(|e| {
            error!("Failed to insert {} LP pool rows: {:?}", pools.len(), e);
            e
        })?;

        Ok(pools.len())
    }
}

#[async_trait]
impl SnapshotStore for PostgresClient {
    async fn commit(&self, batch: &CycleBatch) -> CollectorResult<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let inserted = async {
            let metrics = Self::insert_metrics(&tx, batch).await?;
            let pools = Self::insert_lp_pools(&tx, batch.lp_pools()).await?;
            Ok::<_, CollectorError>((metrics, pools))
        }
        .await;

        match inserted {
            Ok((metrics, pools)) => {
                tx.commit().await?;
                info!(
                    "Committed cycle {} ({} metric rows, {} LP pools)",
                    batch.timestamp(),
                    metrics,
                    pools
                );
                Ok(())
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Rollback of cycle {} failed: {:?}", batch.timestamp(), rollback_err);
                }
                Err(e)
            },
        }
    }

    async fn latest(&self, category: MetricCategory) -> CollectorResult<Option<MetricSnapshot>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT timestamp, key, value, unit
            FROM collector.metric_snapshots
            WHERE category = $1
              AND timestamp = (
                  SELECT max(timestamp) FROM collector.metric_snapshots WHERE category = $1
              )
            ORDER BY key
        "#;

        let rows = client.query(query, &[&category.as_str()]).await?;
        let snapshots = group_rows(category, rows.iter().map(metric_row))?;

        Ok(snapshots.into_iter().next())
    }

    async fn range(
        &self,
        category: MetricCategory,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CollectorResult<Vec<MetricSnapshot>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT timestamp, key, value, unit
            FROM collector.metric_snapshots
            WHERE category = $1 AND timestamp >= $2 AND timestamp <= $3
            ORDER BY timestamp, key
        "#;

        let rows = client.query(query, &[&category.as_str(), &start, &end]).await?;
        group_rows(category, rows.iter().map(metric_row))
    }

    async fn latest_timestamp(
        &self,
        category: MetricCategory,
    ) -> CollectorResult<Option<DateTime<Utc>>> {
        let client = self.pool.get().await?;
        let query =
            "SELECT max(timestamp) AS last_timestamp FROM collector.metric_snapshots WHERE category = $1";

        let row = client.query_one(query, &[&category.as_str()]).await?;
        Ok(row.get("last_timestamp"))
    }

    async fn latest_lp_pools(&self) -> CollectorResult<Vec<LpPoolSnapshot>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                timestamp, pool_address, symbol, liquidity_usd, volume_usd, fees_usd,
                yield_pool_fees, yield_astro_rewards, yield_external_rewards, yield_total
            FROM collector.lp_pool_snapshots
            WHERE timestamp = (SELECT max(timestamp) FROM collector.lp_pool_snapshots)
            ORDER BY pool_address
        "#;

        let rows = client.query(query, &[]).await?;
        Ok(rows.iter().map(row_to_lp_pool).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_group_rows_by_timestamp() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();

        let rows = vec![
            (t1, "ATOM".to_string(), 3.5, "percent".to_string()),
            (t1, "INJ".to_string(), 4.25, "percent".to_string()),
            (t2, "ATOM".to_string(), 3.75, "percent".to_string()),
        ];

        let snapshots = group_rows(MetricCategory::BorrowRates, rows).unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].timestamp, t1);
        assert_eq!(snapshots[0].payload.len(), 2);
        assert_eq!(snapshots[1].payload["ATOM"], MetricValue::percent(3.75));
    }

    #[test]
    fn test_group_rows_rejects_unknown_unit() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let rows = vec![(t1, "ATOM".to_string(), 1.0, "furlongs".to_string())];
        assert!(matches!(
            group_rows(MetricCategory::BorrowRates, rows),
            Err(CollectorError::Persistence(_))
        ));
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("NEPT\0-INJ"), "NEPT-INJ");
    }
}
