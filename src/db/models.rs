use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stores a fieldless enum as its upper-case TEXT name.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        "unknown {} value: {}",
                        stringify!($name),
                        other
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

/// Rarity tier of a photo card design, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
    Common,
    Rare,
    Epic,
    Legendary,
}

text_enum!(Grade {
    Common => "COMMON",
    Rare => "RARE",
    Epic => "EPIC",
    Legendary => "LEGENDARY",
});

/// Lifecycle of a physical card unit. A unit that changed hands through a
/// purchase or exchange goes back to `Idle` under its new owner; "sold" is
/// never a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Idle,
    Listed,
}

text_enum!(CardStatus {
    Idle => "IDLE",
    Listed => "LISTED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingType {
    ForSale,
    ForSaleAndTrade,
}

text_enum!(ListingType {
    ForSale => "FOR_SALE",
    ForSaleAndTrade => "FOR_SALE_AND_TRADE",
});

impl ListingType {
    /// Both listing types can be bought outright.
    pub fn permits_purchase(&self) -> bool {
        matches!(self, Self::ForSale | Self::ForSaleAndTrade)
    }

    pub fn permits_trade(&self) -> bool {
        matches!(self, Self::ForSaleAndTrade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeStatus {
    Requested,
    Accepted,
    Rejected,
    Cancelled,
}

text_enum!(ExchangeStatus {
    Requested => "REQUESTED",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
    Cancelled => "CANCELLED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointType {
    Draw,
    Purchase,
    Sale,
}

text_enum!(PointType {
    Draw => "DRAW",
    Purchase => "PURCHASE",
    Sale => "SALE",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub nickname: String,
    pub email: String,
    pub created_at: String,
}

impl User {
    pub const COLUMNS: &'static str = "id, nickname, email, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            nickname: row.get(1)?,
            email: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

/// The design that many physical units instantiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoCard {
    pub id: i64,
    pub creator_id: i64,
    pub name: String,
    pub grade: Grade,
    pub genre: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub price: i64,
    pub total_quantity: i64,
    pub created_at: String,
}

impl PhotoCard {
    pub const COLUMNS: &'static str = "id, creator_id, name, grade, genre, image_url, description, \
         price, total_quantity, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            name: row.get(2)?,
            grade: row.get(3)?,
            genre: row.get(4)?,
            image_url: row.get(5)?,
            description: row.get(6)?,
            price: row.get(7)?,
            total_quantity: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

/// One physical card unit. Rows are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCard {
    pub id: i64,
    pub photo_card_id: i64,
    pub owner_id: i64,
    pub status: CardStatus,
    pub shop_listing_id: Option<i64>,
}

impl UserCard {
    pub const COLUMNS: &'static str = "id, photo_card_id, owner_id, status, shop_listing_id";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            photo_card_id: row.get(1)?,
            owner_id: row.get(2)?,
            status: row.get(3)?,
            shop_listing_id: row.get(4)?,
        })
    }
}

/// What a trade-enabled seller would like in return. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePrefs {
    pub grade: Option<Grade>,
    pub genre: Option<String>,
    pub description: Option<String>,
}

impl ExchangePrefs {
    pub fn is_empty(&self) -> bool {
        self.grade.is_none() && self.genre.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopListing {
    pub id: i64,
    pub seller_id: i64,
    pub photo_card_id: i64,
    pub price: i64,
    pub listing_type: ListingType,
    pub initial_quantity: i64,
    pub remaining_quantity: i64,
    pub exchange_prefs: Option<ExchangePrefs>,
    pub created_at: String,
    pub updated_at: String,
}

impl ShopListing {
    pub const COLUMNS: &'static str = "id, seller_id, photo_card_id, price, listing_type, \
         initial_quantity, remaining_quantity, exchange_grade, exchange_genre, \
         exchange_description, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let prefs = ExchangePrefs {
            grade: row.get(7)?,
            genre: row.get(8)?,
            description: row.get(9)?,
        };
        Ok(Self {
            id: row.get(0)?,
            seller_id: row.get(1)?,
            photo_card_id: row.get(2)?,
            price: row.get(3)?,
            listing_type: row.get(4)?,
            initial_quantity: row.get(5)?,
            remaining_quantity: row.get(6)?,
            exchange_prefs: (!prefs.is_empty()).then_some(prefs),
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    pub fn sold_quantity(&self) -> i64 {
        self.initial_quantity - self.remaining_quantity
    }

    pub fn is_sold_out(&self) -> bool {
        self.remaining_quantity == 0
    }
}

/// A proposal to swap one idle card for one listed card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: i64,
    pub proposer_id: i64,
    pub request_card_id: i64,
    pub target_card_id: i64,
    /// `None` once the listing it was made against has been cancelled.
    pub shop_listing_id: Option<i64>,
    pub description: String,
    pub status: ExchangeStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Exchange {
    pub const COLUMNS: &'static str = "id, proposer_id, request_card_id, target_card_id, \
         shop_listing_id, description, status, created_at, updated_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            proposer_id: row.get(1)?,
            request_card_id: row.get(2)?,
            target_card_id: row.get(3)?,
            shop_listing_id: row.get(4)?,
            description: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointHistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub delta: i64,
    pub point_type: PointType,
    pub created_at: String,
}

impl PointHistoryEntry {
    pub const COLUMNS: &'static str = "id, user_id, delta, point_type, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            delta: row.get(2)?,
            point_type: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}
