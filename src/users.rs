use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::state::DbPool;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub nickname: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub nickname: String,
    pub email: String,
    pub balance: i64,
    pub created_at: String,
}

pub fn find(conn: &Connection, user_id: i64) -> AppResult<User> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS),
        params![user_id],
        User::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
}

/// Create a user together with their zero-balance point account.
pub fn register(pool: &DbPool, new_user: NewUser) -> AppResult<User> {
    let nickname = new_user.nickname.trim().to_string();
    let email = new_user.email.trim().to_lowercase();
    if nickname.is_empty() {
        return Err(AppError::BadRequest("Nickname cannot be empty".into()));
    }
    if !email.contains('@') {
        return Err(AppError::BadRequest("Email address is invalid".into()));
    }

    let password_hash = match new_user.password.as_deref() {
        Some(password) if password.len() < 8 => {
            return Err(AppError::BadRequest(
                "Password must be at least 8 characters".into(),
            ));
        }
        Some(password) => Some(
            bcrypt::hash(password, bcrypt::DEFAULT_COST)
                .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?,
        ),
        None => None,
    };

    let user = db::immediate(pool, |conn| -> AppResult<User> {
        let taken: Option<(String, String)> = conn
            .query_row(
                "SELECT nickname, email FROM users WHERE nickname = ?1 OR email = ?2",
                params![nickname, email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((existing_nickname, _)) = taken {
            let what = if existing_nickname == nickname {
                "Nickname"
            } else {
                "Email"
            };
            return Err(AppError::Conflict(format!("{} is already in use", what)));
        }

        conn.execute(
            "INSERT INTO users (nickname, email, password_hash) VALUES (?1, ?2, ?3)",
            params![nickname, email, password_hash],
        )?;
        let user_id = conn.last_insert_rowid();
        ledger::open_account(conn, user_id)?;
        find(conn, user_id)
    })?;

    tracing::info!(user_id = user.id, nickname = %user.nickname, "User registered");
    Ok(user)
}

pub fn profile(pool: &DbPool, user_id: i64) -> AppResult<UserProfile> {
    let conn = pool.get()?;
    let user = find(&conn, user_id)?;
    let balance = ledger::balance(&conn, user_id)?;
    Ok(UserProfile {
        id: user.id,
        nickname: user.nickname,
        email: user.email,
        balance,
        created_at: user.created_at,
    })
}
