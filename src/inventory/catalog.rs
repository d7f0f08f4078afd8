//! Photo-card templates and minting of their physical units.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::db::models::{Grade, PhotoCard};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;
use crate::users;

/// Upper bound on units minted in one request. Minting holds the write lock.
pub const MAX_MINT_QUANTITY: i64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewPhotoCard {
    pub name: String,
    pub grade: Grade,
    pub genre: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub price: i64,
    pub total_quantity: i64,
}

impl NewPhotoCard {
    fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Card name cannot be empty".into()));
        }
        if self.genre.trim().is_empty() {
            return Err(AppError::BadRequest("Card genre cannot be empty".into()));
        }
        if self.price < 0 {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
        if self.total_quantity < 1 {
            return Err(AppError::BadRequest(
                "Total quantity must be at least 1".into(),
            ));
        }
        if self.total_quantity > MAX_MINT_QUANTITY {
            return Err(AppError::BadRequest(format!(
                "Total quantity cannot exceed {}",
                MAX_MINT_QUANTITY
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MintedCard {
    pub photo_card: PhotoCard,
    pub card_ids: Vec<i64>,
}

/// One template in an owner's gallery with the idle units they hold of it.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryEntry {
    pub photo_card: PhotoCard,
    pub card_ids: Vec<i64>,
}

pub fn find_photo_card(conn: &Connection, photo_card_id: i64) -> AppResult<PhotoCard> {
    conn.query_row(
        &format!(
            "SELECT {} FROM photo_cards WHERE id = ?1",
            PhotoCard::COLUMNS
        ),
        params![photo_card_id],
        PhotoCard::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("photo card {}", photo_card_id)))
}

/// Create a template and `total_quantity` IDLE units owned by the creator.
pub fn mint(pool: &DbPool, creator_id: i64, new_card: NewPhotoCard) -> AppResult<MintedCard> {
    new_card.validate()?;

    let minted = db::immediate(pool, |conn| -> AppResult<MintedCard> {
        users::find(conn, creator_id)?;

        conn.execute(
            "INSERT INTO photo_cards
                 (creator_id, name, grade, genre, image_url, description, price, total_quantity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                creator_id,
                new_card.name.trim(),
                new_card.grade,
                new_card.genre.trim(),
                new_card.image_url,
                new_card.description,
                new_card.price,
                new_card.total_quantity,
            ],
        )?;
        let photo_card_id = conn.last_insert_rowid();

        let mut card_ids = Vec::new();
        let mut stmt = conn.prepare(
            "INSERT INTO user_cards (photo_card_id, owner_id, status) VALUES (?1, ?2, 'IDLE')",
        )?;
        for _ in 0..new_card.total_quantity {
            stmt.execute(params![photo_card_id, creator_id])?;
            card_ids.push(conn.last_insert_rowid());
        }

        Ok(MintedCard {
            photo_card: find_photo_card(conn, photo_card_id)?,
            card_ids,
        })
    })?;

    tracing::info!(
        photo_card_id = minted.photo_card.id,
        creator_id,
        quantity = minted.card_ids.len(),
        "Photo card minted"
    );
    Ok(minted)
}

pub fn get(pool: &DbPool, photo_card_id: i64) -> AppResult<PhotoCard> {
    let conn = pool.get()?;
    find_photo_card(&conn, photo_card_id)
}

/// The owner's IDLE units grouped by template. Listed units are in the shop,
/// not the gallery.
pub fn gallery(pool: &DbPool, owner_id: i64) -> AppResult<Vec<GalleryEntry>> {
    let conn = pool.get()?;
    users::find(&conn, owner_id)?;

    let mut stmt = conn.prepare(
        "SELECT photo_card_id, id FROM user_cards
         WHERE owner_id = ?1 AND status = 'IDLE'
         ORDER BY photo_card_id, id",
    )?;
    let rows = stmt
        .query_map(params![owner_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut entries: Vec<GalleryEntry> = Vec::new();
    for (photo_card_id, card_id) in rows {
        match entries.last_mut() {
            Some(entry) if entry.photo_card.id == photo_card_id => entry.card_ids.push(card_id),
            _ => entries.push(GalleryEntry {
                photo_card: find_photo_card(&conn, photo_card_id)?,
                card_ids: vec![card_id],
            }),
        }
    }
    Ok(entries)
}
