//! Points draw: a random reward at most once per cooldown window.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::{adjust, Ledger};
use crate::db;
use crate::db::models::PointType;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cooldown {
    pub can_draw: bool,
    pub remain_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrawResult {
    pub reward: i64,
    pub balance: i64,
}

/// Pure cooldown arithmetic.
pub fn cooldown_at(
    last_draw_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_secs: u64,
) -> Cooldown {
    let Some(last) = last_draw_at else {
        return Cooldown {
            can_draw: true,
            remain_seconds: 0,
        };
    };

    let ready_at = last + Duration::seconds(cooldown_secs as i64);
    if now >= ready_at {
        Cooldown {
            can_draw: true,
            remain_seconds: 0,
        }
    } else {
        Cooldown {
            can_draw: false,
            remain_seconds: (ready_at - now).num_seconds(),
        }
    }
}

fn last_draw_at(conn: &Connection, user_id: i64) -> AppResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT last_draw_at FROM points WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("point account for user {}", user_id)))?;

    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                AppError::Internal(format!("bad last_draw_at for user {}: {}", user_id, e))
            })
    })
    .transpose()
}

impl Ledger {
    pub fn cooldown(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<Cooldown> {
        let conn = self.pool.get()?;
        let last = last_draw_at(&conn, user_id)?;
        Ok(cooldown_at(last, now, self.draw.cooldown_secs))
    }

    /// Credit a reward in `0..=max_reward`. Refused while cooling down.
    pub fn draw<R: Rng>(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> AppResult<DrawResult> {
        let cooldown_secs = self.draw.cooldown_secs;
        let reward = rng.gen_range(0..=self.draw.max_reward);

        let result = db::immediate(&self.pool, |conn| -> AppResult<DrawResult> {
            let last = last_draw_at(conn, user_id)?;
            let cooldown = cooldown_at(last, now, cooldown_secs);
            if !cooldown.can_draw {
                return Err(AppError::BadRequest(format!(
                    "Draw is cooling down, try again in {} seconds",
                    cooldown.remain_seconds
                )));
            }

            let balance = adjust(conn, user_id, reward, PointType::Draw)?;
            conn.execute(
                "UPDATE points SET last_draw_at = ?2 WHERE user_id = ?1",
                params![user_id, now.to_rfc3339()],
            )?;

            Ok(DrawResult { reward, balance })
        })?;

        tracing::info!(user_id, reward, balance = result.balance, "Points drawn");
        Ok(result)
    }
}
