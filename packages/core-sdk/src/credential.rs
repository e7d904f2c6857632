use std::{path::Path, sync::Mutex};

use anyhow::{anyhow, Result};
use rusqlite::Connection;

use crate::db;

/** \brief Fixed key the Gemini API key is stored under. */
pub const CREDENTIAL_KEY: &str = "gemini_api_key";

/**
 * \brief Storage for the single API key.
 * \details No format validation happens here; callers reject empty keys before
 * calling `save`.
 */
pub trait CredentialStore {
    /** \brief Persist the key, overwriting any previous value. */
    fn save(&self, secret: &str) -> Result<()>;
    /** \brief Stored key, or `None` when absent. */
    fn load(&self) -> Result<Option<String>>;
    /** \brief Remove the key; a no-op when nothing is stored. */
    fn clear(&self) -> Result<()>;
}

/**
 * \brief Key stored as one row of the SQLite `app_config` table.
 */
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /**
     * \brief Open (and migrate) the database file at `path`.
     */
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = db::open_db(path)?;
        Self::from_connection(conn)
    }

    /**
     * \brief Store backed by an in-memory database; nothing outlives the process.
     */
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        db::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("credential database lock poisoned"))?;
        f(&conn)
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn save(&self, secret: &str) -> Result<()> {
        self.with_conn(|conn| db::set_config(conn, CREDENTIAL_KEY, secret))
    }

    fn load(&self) -> Result<Option<String>> {
        self.with_conn(|conn| db::get_config(conn, CREDENTIAL_KEY))
    }

    fn clear(&self) -> Result<()> {
        self.with_conn(|conn| db::delete_config(conn, CREDENTIAL_KEY))
    }
}

/**
 * \brief Process-local store.
 */
#[derive(Default)]
pub struct MemoryCredentialStore {
    secret: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: &str) -> Self {
        Self {
            secret: Mutex::new(Some(secret.to_string())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, secret: &str) -> Result<()> {
        let mut slot = self
            .secret
            .lock()
            .map_err(|_| anyhow!("credential lock poisoned"))?;
        *slot = Some(secret.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>> {
        let slot = self
            .secret
            .lock()
            .map_err(|_| anyhow!("credential lock poisoned"))?;
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .secret
            .lock()
            .map_err(|_| anyhow!("credential lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

/**
 * \brief Mask a key for display, keeping only the last four characters.
 */
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
