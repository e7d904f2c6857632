use anyhow::Result;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::{path::Path, thread, time::Duration};

/** \brief Default database file, relative to the working directory. */
pub const DEFAULT_DB_PATH: &str = "finai.db";

/**
 * \brief Open the database at `path` with a busy timeout.
 */
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief Create the key/value table. Idempotent.
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
        )
    })?;
    Ok(())
}

/**
 * \brief Write a value, overwriting any previous one.
 */
pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )
    })?;
    Ok(())
}

/**
 * \brief Read a value; `None` when the key was never written or has been removed.
 */
pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key=?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief Remove a value. Removing a missing key is not an error.
 */
pub fn delete_config(conn: &Connection, key: &str) -> Result<()> {
    retry_on_locked(|| conn.execute("DELETE FROM app_config WHERE key=?1", params![key]))?;
    Ok(())
}

/**
 * \brief Retry helper for SQLite lock conflicts.
 * \details Catches `database is locked` / `database table is locked` and backs off
 * linearly, at most 6 attempts.
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    let mut attempt = 0;
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(200 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        migrate(&conn).expect("migrate");
        conn
    }

    #[test]
    fn test_config_roundtrip_and_overwrite() {
        let conn = mem_conn();
        assert_eq!(get_config(&conn, "k").expect("get"), None);

        set_config(&conn, "k", "v1").expect("set v1");
        assert_eq!(get_config(&conn, "k").expect("get").as_deref(), Some("v1"));

        set_config(&conn, "k", "v2").expect("set v2");
        assert_eq!(get_config(&conn, "k").expect("get").as_deref(), Some("v2"));
    }

    #[test]
    fn test_delete_config_is_idempotent() {
        let conn = mem_conn();
        set_config(&conn, "k", "v").expect("set");
        delete_config(&conn, "k").expect("delete");
        delete_config(&conn, "k").expect("delete again");
        delete_config(&conn, "never-written").expect("delete missing");
        assert_eq!(get_config(&conn, "k").expect("get"), None);
    }

    #[test]
    fn test_migrate_twice_keeps_data() {
        let conn = mem_conn();
        set_config(&conn, "k", "v").expect("set");
        migrate(&conn).expect("migrate again");
        assert_eq!(get_config(&conn, "k").expect("get").as_deref(), Some("v"));
    }

    #[test]
    fn test_retry_on_locked_gives_up_on_other_errors() {
        let mut calls = 0;
        let result: Result<()> = retry_on_locked(|| {
            calls += 1;
            Err(rusqlite::Error::InvalidQuery)
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
