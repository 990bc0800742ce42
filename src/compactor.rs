use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Engine, EngineError};
use crate::observability::WAL_COMPACTIONS_TOTAL;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the WAL once `threshold` events have been appended since the last
/// rewrite. Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appended = engine.wal_appends_since_compact().await;
    if appended < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
    tracing::debug!(appended, "compaction triggered");
    Ok(true)
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            tracing::warn!("compaction skipped: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CarPatch;
    use crate::wal::Wal;
    use rust_decimal::Decimal;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("carlot_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn below_threshold_does_nothing() {
        let path = test_wal_path("below_threshold.wal");
        let engine = Engine::new(path.clone()).unwrap();
        engine.register_agency(Ulid::new(), "Downtown".into()).await.unwrap();

        assert!(!tokio_test::assert_ok!(compact_if_needed(&engine, 10).await));
        assert_eq!(engine.wal_appends_since_compact().await, 1);
    }

    #[tokio::test]
    async fn churn_is_folded_away() {
        let path = test_wal_path("churn.wal");
        let engine = Engine::new(path.clone()).unwrap();
        let agency = Ulid::new();
        let car = Ulid::new();
        engine.register_agency(agency, "Airport".into()).await.unwrap();
        engine
            .register_car(car, agency, Decimal::new(90, 0), 1_000, None)
            .await
            .unwrap();
        for step in 1..=8u64 {
            engine
                .update_car(
                    car,
                    CarPatch {
                        current_mileage: Some(1_000 + step),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 10);

        assert!(tokio_test::assert_ok!(compact_if_needed(&engine, 10).await));
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(Wal::replay(&path).unwrap().len(), 2);

        drop(engine);
        let engine = Engine::new(path).unwrap();
        assert_eq!(engine.get_car(car).await.unwrap().current_mileage, 1_008);
    }
}
