use super::Engine;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Executor, Row};
use uuid::Uuid;

use crate::{
    api::FraudScanAPI,
    auth::{Platform, User},
    error::Error,
    fraud::{self, FraudSignal},
};

#[async_trait]
impl FraudScanAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn run_fraud_scan(&self, user: User) -> Result<u64, Error> {
        self.authorize(user, "fraud_scan", Platform::default())?;

        let mut conn = self.pool.acquire().await?;
        let since = Utc::now() - Duration::hours(24);
        let mut emitted = 0u64;

        // passenger/driver pairs completing suspiciously many trips together
        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT
                         (data->>'passenger_id')::uuid AS passenger_id,
                         (data->>'driver_id')::uuid AS driver_id,
                         COUNT(*) AS total
                     FROM trips
                     WHERE status = 'COMPLETED' AND (data->>'completed_at')::timestamptz >= $1
                     GROUP BY 1, 2
                     HAVING COUNT(*) > $2",
                )
                .bind(since)
                .bind(fraud::REPEATED_PAIR_MAX_PER_DAY),
            )
            .await?;

        for row in rows {
            let passenger_id: Uuid = row.try_get("passenger_id")?;
            let driver_id: Uuid = row.try_get("driver_id")?;
            let total: i64 = row.try_get("total")?;

            self.fraud
                .report(FraudSignal {
                    user_id: driver_id,
                    trip_id: None,
                    kind: fraud::kinds::REPEATED_PAIR.into(),
                    severity: 3,
                    payload: serde_json::json!({
                        "passenger_id": passenger_id,
                        "completed_today": total,
                    }),
                })
                .await;
            emitted += 1;
        }

        // burst cancellers
        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT
                         (data->>'cancelled_by')::uuid AS user_id,
                         COUNT(*) AS total
                     FROM trips
                     WHERE status IN ('CANCELLED_BY_PASSENGER', 'CANCELLED_BY_DRIVER')
                       AND (data->>'cancelled_at')::timestamptz >= $1
                     GROUP BY 1
                     HAVING COUNT(*) >= 3",
                )
                .bind(Utc::now() - Duration::hours(1)),
            )
            .await?;

        for row in rows {
            let user_id: Uuid = row.try_get("user_id")?;
            let total: i64 = row.try_get("total")?;

            self.fraud
                .report(FraudSignal {
                    user_id,
                    trip_id: None,
                    kind: fraud::kinds::RAPID_CANCELLATION.into(),
                    severity: 2,
                    payload: serde_json::json!({ "cancelled_last_hour": total }),
                })
                .await;
            emitted += 1;
        }

        Ok(emitted)
    }
}
