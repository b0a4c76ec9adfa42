// SQLite-backed relational store
//
// All persistence goes through the CardStore/AuthStore traits so callers
// hold an explicitly constructed handle and tests can substitute a fake.
// Uniqueness on each master table's name column is enforced by the schema
// and surfaced to callers as the named DuplicateKey condition instead of a
// backend-specific error code.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::entities::{CardRow, Dimension, MasterRecord};

// ============================================================================
// STORE ERROR
// ============================================================================

/// Errors the store contract can raise. DuplicateKey is guaranteed to be
/// distinguishable so the resolver's race tolerance never has to sniff
/// backend error codes.
#[derive(Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    DuplicateKey,

    /// The addressed row does not exist (update/delete by id).
    NotFound,

    /// Anything else: connectivity, schema, malformed statement.
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DuplicateKey => write!(f, "duplicate key"),
            StoreError::NotFound => write!(f, "row not found"),
            StoreError::Backend(msg) => write!(f, "store backend error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

fn map_sqlite_err(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::DuplicateKey
        }
        other => StoreError::Backend(other.to_string()),
    }
}

// ============================================================================
// WRITE PAYLOAD
// ============================================================================

/// A card ready to write: all four labels already resolved to master ids,
/// scalars trimmed, image reference settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardWrite {
    pub category_id: i64,
    pub region_id: i64,
    pub organization_id: i64,
    pub representative_id: i64,
    pub phone: String,
    pub mobile: String,
    pub fax: String,
    pub email: String,
    pub address: String,
    pub notes: String,
    pub image_ref: Option<String>,
}

// ============================================================================
// AUTH RECORDS
// ============================================================================

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: i64,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// STORE CONTRACTS
// ============================================================================

pub trait CardStore: Send + Sync {
    /// Exact, case-sensitive lookup of a master row by name.
    fn find_master(
        &self,
        dimension: Dimension,
        name: &str,
    ) -> Result<Option<MasterRecord>, StoreError>;

    /// Insert a new master row, returning it. Raises DuplicateKey if the
    /// name already exists.
    fn insert_master(&self, dimension: Dimension, name: &str) -> Result<MasterRecord, StoreError>;

    fn list_masters(&self, dimension: Dimension) -> Result<Vec<MasterRecord>, StoreError>;

    fn insert_card(&self, card: &CardWrite) -> Result<i64, StoreError>;

    fn update_card(&self, id: i64, card: &CardWrite) -> Result<(), StoreError>;

    fn delete_card(&self, id: i64) -> Result<(), StoreError>;

    /// One card joined with its four master labels.
    fn get_card(&self, id: i64) -> Result<Option<CardRow>, StoreError>;

    /// All cards joined with their master labels, oldest first.
    fn list_cards(&self) -> Result<Vec<CardRow>, StoreError>;
}

pub trait AuthStore: Send + Sync {
    /// Raises DuplicateKey if the email already has an account.
    fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        salt: &str,
    ) -> Result<i64, StoreError>;

    fn find_user(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    fn insert_session(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn find_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError>;

    fn delete_session(&self, token: &str) -> Result<(), StoreError>;
}

// ============================================================================
// SQLITE IMPLEMENTATION
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_sqlite_err)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another thread panicked mid-statement;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(map_sqlite_err)?;

    // ==========================================================================
    // Master tables (unique name per table)
    // ==========================================================================
    for dim in Dimension::ALL {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )",
                dim.table()
            ),
            [],
        )
        .map_err(map_sqlite_err)?;
    }

    // ==========================================================================
    // Business cards
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS businesscard (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER NOT NULL REFERENCES category(id),
            region_id INTEGER NOT NULL REFERENCES region(id),
            organization_id INTEGER NOT NULL REFERENCES organization(id),
            representative_id INTEGER NOT NULL REFERENCES representative(id),
            phone TEXT NOT NULL DEFAULT '',
            mobile TEXT NOT NULL DEFAULT '',
            fax TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            notes TEXT NOT NULL DEFAULT '',
            image_ref TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .map_err(map_sqlite_err)?;

    // ==========================================================================
    // Auth tables
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .map_err(map_sqlite_err)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id),
            expires_at TEXT NOT NULL
        )",
        [],
    )
    .map_err(map_sqlite_err)?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_card_organization ON businesscard(organization_id)",
        [],
    )
    .map_err(map_sqlite_err)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_card_email ON businesscard(email)",
        [],
    )
    .map_err(map_sqlite_err)?;

    Ok(())
}

const CARD_JOIN_SELECT: &str = "SELECT b.id, c.name, r.name, o.name, p.name,
            b.phone, b.mobile, b.fax, b.email, b.address, b.notes, b.image_ref
     FROM businesscard b
     JOIN category c ON c.id = b.category_id
     JOIN region r ON r.id = b.region_id
     JOIN organization o ON o.id = b.organization_id
     JOIN representative p ON p.id = b.representative_id";

fn row_to_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<CardRow> {
    Ok(CardRow {
        id: row.get(0)?,
        category: row.get(1)?,
        region: row.get(2)?,
        organization: row.get(3)?,
        representative: row.get(4)?,
        phone: row.get(5)?,
        mobile: row.get(6)?,
        fax: row.get(7)?,
        email: row.get(8)?,
        address: row.get(9)?,
        notes: row.get(10)?,
        image_ref: row.get(11)?,
    })
}

impl CardStore for SqliteStore {
    fn find_master(
        &self,
        dimension: Dimension,
        name: &str,
    ) -> Result<Option<MasterRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, name FROM {} WHERE name = ?1",
                dimension.table()
            ))
            .map_err(map_sqlite_err)?;

        let mut rows = stmt
            .query_map(params![name], |row| {
                Ok(MasterRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(map_sqlite_err)?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(map_sqlite_err(e)),
            None => Ok(None),
        }
    }

    fn insert_master(&self, dimension: Dimension, name: &str) -> Result<MasterRecord, StoreError> {
        let conn = self.lock();
        conn.execute(
            &format!("INSERT INTO {} (name) VALUES (?1)", dimension.table()),
            params![name],
        )
        .map_err(map_sqlite_err)?;

        Ok(MasterRecord {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn list_masters(&self, dimension: Dimension) -> Result<Vec<MasterRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, name FROM {} ORDER BY name",
                dimension.table()
            ))
            .map_err(map_sqlite_err)?;

        let records = stmt
            .query_map([], |row| {
                Ok(MasterRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;

        Ok(records)
    }

    fn insert_card(&self, card: &CardWrite) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO businesscard (
                category_id, region_id, organization_id, representative_id,
                phone, mobile, fax, email, address, notes, image_ref
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                card.category_id,
                card.region_id,
                card.organization_id,
                card.representative_id,
                card.phone,
                card.mobile,
                card.fax,
                card.email,
                card.address,
                card.notes,
                card.image_ref,
            ],
        )
        .map_err(map_sqlite_err)?;

        Ok(conn.last_insert_rowid())
    }

    fn update_card(&self, id: i64, card: &CardWrite) -> Result<(), StoreError> {
        let conn = self.lock();
        let changed = conn
            .execute(
                "UPDATE businesscard SET
                    category_id = ?1, region_id = ?2, organization_id = ?3,
                    representative_id = ?4, phone = ?5, mobile = ?6, fax = ?7,
                    email = ?8, address = ?9, notes = ?10, image_ref = ?11
                 WHERE id = ?12",
                params![
                    card.category_id,
                    card.region_id,
                    card.organization_id,
                    card.representative_id,
                    card.phone,
                    card.mobile,
                    card.fax,
                    card.email,
                    card.address,
                    card.notes,
                    card.image_ref,
                    id,
                ],
            )
            .map_err(map_sqlite_err)?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn delete_card(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.lock();
        let changed = conn
            .execute("DELETE FROM businesscard WHERE id = ?1", params![id])
            .map_err(map_sqlite_err)?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn get_card(&self, id: i64) -> Result<Option<CardRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!("{} WHERE b.id = ?1", CARD_JOIN_SELECT))
            .map_err(map_sqlite_err)?;

        let mut rows = stmt
            .query_map(params![id], row_to_card)
            .map_err(map_sqlite_err)?;

        match rows.next() {
            Some(Ok(card)) => Ok(Some(card)),
            Some(Err(e)) => Err(map_sqlite_err(e)),
            None => Ok(None),
        }
    }

    fn list_cards(&self) -> Result<Vec<CardRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY b.id", CARD_JOIN_SELECT))
            .map_err(map_sqlite_err)?;

        let cards = stmt
            .query_map([], row_to_card)
            .map_err(map_sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;

        Ok(cards)
    }
}

impl AuthStore for SqliteStore {
    fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        salt: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO users (email, password_hash, salt) VALUES (?1, ?2, ?3)",
            params![email, password_hash, salt],
        )
        .map_err(map_sqlite_err)?;

        Ok(conn.last_insert_rowid())
    }

    fn find_user(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id, email, password_hash, salt FROM users WHERE email = ?1")
            .map_err(map_sqlite_err)?;

        let mut rows = stmt
            .query_map(params![email], |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    salt: row.get(3)?,
                })
            })
            .map_err(map_sqlite_err)?;

        match rows.next() {
            Some(Ok(user)) => Ok(Some(user)),
            Some(Err(e)) => Err(map_sqlite_err(e)),
            None => Ok(None),
        }
    }

    fn insert_session(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, expires_at.to_rfc3339()],
        )
        .map_err(map_sqlite_err)?;

        Ok(())
    }

    fn find_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT s.token, s.user_id, u.email, s.expires_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1",
            )
            .map_err(map_sqlite_err)?;

        let mut rows = stmt
            .query_map(params![token], |row| {
                let expires_str: String = row.get(3)?;
                let expires_at = DateTime::parse_from_rfc3339(&expires_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc);

                Ok(SessionRecord {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    email: row.get(2)?,
                    expires_at,
                })
            })
            .map_err(map_sqlite_err)?;

        match rows.next() {
            Some(Ok(session)) => Ok(Some(session)),
            Some(Err(e)) => Err(map_sqlite_err(e)),
            None => Ok(None),
        }
    }

    fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(map_sqlite_err)?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
