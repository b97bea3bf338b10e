//! SQLite persistence: active configuration, sessions and the spin log.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed precision, so
//! string comparison orders them chronologically.

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use fruitreel_core::{SlotConfig, Symbol};
use fruitreel_shared::{SessionResponse, SessionStats, SpinLogEntry};
use sqlx::SqlitePool;

pub fn stamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_stamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {raw:?}"))?
        .with_timezone(&Utc))
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn load_config(pool: &SqlitePool) -> anyhow::Result<Option<SlotConfig>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT config_json FROM params WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    row.map(|(json,)| serde_json::from_str(&json).context("stored configuration is invalid"))
        .transpose()
}

pub async fn save_config(pool: &SqlitePool, config: &SlotConfig) -> anyhow::Result<()> {
    let json = serde_json::to_string(config)?;
    sqlx::query(
        "INSERT INTO params (id, config_json, updated_at) VALUES (1, ?, ?)
         ON CONFLICT(id) DO UPDATE SET config_json = excluded.config_json, updated_at = excluded.updated_at",
    )
    .bind(json)
    .bind(stamp(Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub credits: i64,
    pub created_at: String,
    pub last_activity: String,
    pub total_spins: i64,
    pub total_wagered: i64,
    pub total_winnings: i64,
    pub is_active: bool,
}

impl SessionRow {
    /// total_winnings / total_wagered × 100, 0 before the first spin.
    pub fn rtp(&self) -> f64 {
        if self.total_wagered > 0 {
            self.total_winnings as f64 / self.total_wagered as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn to_response(&self) -> anyhow::Result<SessionResponse> {
        Ok(SessionResponse {
            session_id: self.id.clone(),
            credits: self.credits,
            created_at: parse_stamp(&self.created_at)?,
            total_spins: self.total_spins,
            total_winnings: self.total_winnings,
            is_active: self.is_active,
        })
    }

    pub fn to_stats(&self) -> anyhow::Result<SessionStats> {
        Ok(SessionStats {
            session_id: self.id.clone(),
            created_at: parse_stamp(&self.created_at)?,
            total_spins: self.total_spins,
            total_wagered: self.total_wagered,
            total_winnings: self.total_winnings,
            final_credits: self.credits,
            estimated_rtp: self.rtp(),
        })
    }
}

const SESSION_COLUMNS: &str =
    "id, credits, created_at, last_activity, total_spins, total_wagered, total_winnings, is_active";

pub async fn insert_session(
    pool: &SqlitePool,
    id: &str,
    credits: i64,
    now: DateTime<Utc>,
) -> sqlx::Result<SessionRow> {
    let now = stamp(now);
    sqlx::query_as::<_, SessionRow>(&format!(
        "INSERT INTO sessions (id, credits, created_at, last_activity, is_active)
         VALUES (?, ?, ?, ?, ?) RETURNING {SESSION_COLUMNS}"
    ))
    .bind(id)
    .bind(credits)
    .bind(now.clone())
    .bind(now)
    .bind(credits > 0)
    .fetch_one(pool)
    .await
}

pub async fn fetch_session(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<SessionRow>> {
    sqlx::query_as::<_, SessionRow>(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Settle one spin against a session and log it, in one transaction.
///
/// The update only applies while the balance still covers the bet; `None`
/// means it did not (or the session vanished) and nothing was written.
pub async fn apply_spin(
    pool: &SqlitePool,
    id: &str,
    bet: i64,
    payout: i64,
    symbols: &[Symbol],
    now: DateTime<Utc>,
) -> anyhow::Result<Option<SessionRow>> {
    let now = stamp(now);
    let mut tx = pool.begin().await?;
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "UPDATE sessions SET
            credits = credits - ?1 + ?2,
            total_spins = total_spins + 1,
            total_wagered = total_wagered + ?1,
            total_winnings = total_winnings + ?2,
            last_activity = ?3,
            is_active = (credits - ?1 + ?2) > 0
         WHERE id = ?4 AND credits >= ?1
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(bet)
    .bind(payout)
    .bind(now.clone())
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query(
        "INSERT INTO spins (ts, session_id, bet_amount, symbols_json, payout) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(now)
    .bind(id)
    .bind(bet)
    .bind(serde_json::to_string(symbols)?)
    .bind(payout)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(Some(row))
}

pub async fn delete_session(pool: &SqlitePool, id: &str) -> sqlx::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Most recent sessions first.
pub async fn list_sessions(pool: &SqlitePool, limit: i64) -> sqlx::Result<Vec<SessionRow>> {
    sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn recent_sessions(
    pool: &SqlitePool,
    since: DateTime<Utc>,
    limit: i64,
) -> sqlx::Result<Vec<SessionRow>> {
    sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE created_at >= ? ORDER BY created_at DESC LIMIT ?"
    ))
    .bind(stamp(since))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Remove sessions idle since before `cutoff`. Returns how many went.
pub async fn cleanup_expired_sessions(pool: &SqlitePool, cutoff: DateTime<Utc>) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM sessions WHERE last_activity < ?")
        .bind(stamp(cutoff))
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SpinRow {
    id: i64,
    ts: String,
    session_id: String,
    bet_amount: i64,
    symbols_json: String,
    payout: i64,
}

impl SpinRow {
    fn into_entry(self) -> anyhow::Result<SpinLogEntry> {
        let symbols = serde_json::from_str(&self.symbols_json)
            .with_context(|| format!("spin {} has unreadable symbols", self.id))?;
        Ok(SpinLogEntry {
            id: self.id,
            ts: parse_stamp(&self.ts)?,
            session_id: self.session_id,
            bet_amount: self.bet_amount,
            symbols,
            payout: self.payout,
        })
    }
}

/// The spin log, newest first when `newest_first`, at most `limit` entries.
pub async fn spin_log(
    pool: &SqlitePool,
    limit: Option<i64>,
    newest_first: bool,
) -> anyhow::Result<Vec<SpinLogEntry>> {
    let order = if newest_first { "DESC" } else { "ASC" };
    // sqlite treats a negative limit as none
    let rows = sqlx::query_as::<_, SpinRow>(&format!(
        "SELECT id, ts, session_id, bet_amount, symbols_json, payout FROM spins ORDER BY id {order} LIMIT ?"
    ))
    .bind(limit.unwrap_or(-1))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(SpinRow::into_entry).collect()
}

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct SessionAggregate {
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub total_spins: i64,
    pub total_wagered: i64,
    pub total_winnings: i64,
}

impl SessionAggregate {
    /// (wagered − winnings) / wagered × 100.
    pub fn house_edge_percent(&self) -> f64 {
        if self.total_wagered > 0 {
            (self.total_wagered - self.total_winnings) as f64 / self.total_wagered as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn average_spins_per_session(&self) -> f64 {
        if self.total_sessions > 0 {
            self.total_spins as f64 / self.total_sessions as f64
        } else {
            0.0
        }
    }
}

pub async fn aggregate_since(pool: &SqlitePool, since: DateTime<Utc>) -> sqlx::Result<SessionAggregate> {
    sqlx::query_as::<_, SessionAggregate>(
        "SELECT COUNT(*) AS total_sessions,
                COALESCE(SUM(CASE WHEN credits > 0 THEN 1 ELSE 0 END), 0) AS active_sessions,
                COALESCE(SUM(total_spins), 0) AS total_spins,
                COALESCE(SUM(total_wagered), 0) AS total_wagered,
                COALESCE(SUM(total_winnings), 0) AS total_winnings
         FROM sessions WHERE created_at >= ?",
    )
    .bind(stamp(since))
    .fetch_one(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate(&pool).await.unwrap();
        pool
    }

    #[test]
    fn stamps_sort_chronologically() {
        let a = Utc::now();
        let b = a + Duration::milliseconds(1500);
        assert!(stamp(a) < stamp(b));
        assert_eq!(parse_stamp(&stamp(a)).unwrap().timestamp_micros(), a.timestamp_micros());
    }

    #[tokio::test]
    async fn config_round_trips_through_params() {
        let pool = memory_pool().await;
        assert!(load_config(&pool).await.unwrap().is_none());
        let config = SlotConfig::default_fruit();
        save_config(&pool, &config).await.unwrap();
        save_config(&pool, &config).await.unwrap();
        assert_eq!(load_config(&pool).await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn spin_cannot_overdraw() {
        let pool = memory_pool().await;
        let now = Utc::now();
        insert_session(&pool, "s1", 15, now).await.unwrap();
        let sym = vec![Symbol::from("🍒"), Symbol::from("🍋"), Symbol::from("🍒")];

        let row = apply_spin(&pool, "s1", 10, 0, &sym, now).await.unwrap().unwrap();
        assert_eq!(row.credits, 5);
        assert!(apply_spin(&pool, "s1", 10, 0, &sym, now).await.unwrap().is_none());

        let row = apply_spin(&pool, "s1", 5, 0, &sym, now).await.unwrap().unwrap();
        assert_eq!(row.credits, 0);
        assert!(!row.is_active);
        assert_eq!(row.total_spins, 2);
        assert_eq!(row.total_wagered, 15);

        let (logged,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spins")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(logged, 2);
    }

    #[tokio::test]
    async fn spin_log_reads_back_entries() {
        let pool = memory_pool().await;
        let now = Utc::now();
        insert_session(&pool, "s1", 100, now).await.unwrap();
        let lose = vec![Symbol::from("🍒"), Symbol::from("🍋"), Symbol::from("🍊")];
        let win = vec![Symbol::from("💎"), Symbol::from("💎"), Symbol::from("💎")];
        apply_spin(&pool, "s1", 5, 0, &lose, now).await.unwrap();
        apply_spin(&pool, "s1", 5, 500, &win, now).await.unwrap();

        let latest = spin_log(&pool, Some(1), true).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].symbols, win);
        assert_eq!(latest[0].payout, 500);
        assert_eq!(latest[0].session_id, "s1");
        assert_eq!(latest[0].ts.timestamp_micros(), now.timestamp_micros());

        let all = spin_log(&pool, None, false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].id < all[1].id);
        assert_eq!(all[0].symbols, lose);
        assert_eq!(all[0].bet_amount, 5);
    }

    #[tokio::test]
    async fn cleanup_removes_idle_sessions() {
        let pool = memory_pool().await;
        let now = Utc::now();
        insert_session(&pool, "old", 10, now - Duration::hours(30)).await.unwrap();
        insert_session(&pool, "new", 10, now).await.unwrap();
        let removed = cleanup_expired_sessions(&pool, now - Duration::hours(24)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(fetch_session(&pool, "old").await.unwrap().is_none());
        assert!(fetch_session(&pool, "new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn aggregate_counts_recent_sessions() {
        let pool = memory_pool().await;
        let now = Utc::now();
        insert_session(&pool, "a", 100, now).await.unwrap();
        insert_session(&pool, "b", 0, now).await.unwrap();
        apply_spin(&pool, "a", 10, 20, &[], now).await.unwrap();
        apply_spin(&pool, "a", 10, 0, &[], now).await.unwrap();

        let agg = aggregate_since(&pool, now - Duration::hours(1)).await.unwrap();
        assert_eq!(agg.total_sessions, 2);
        assert_eq!(agg.active_sessions, 1);
        assert_eq!(agg.total_spins, 2);
        assert_eq!(agg.total_wagered, 20);
        assert_eq!(agg.total_winnings, 20);
        assert_eq!(agg.house_edge_percent(), 0.0);
        assert_eq!(agg.average_spins_per_session(), 1.0);
    }
}
