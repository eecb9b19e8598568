use crate::schema::MIG_0001_INIT;
use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

pub struct Db {
    pub conn: Connection,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening cpe store");
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn })
    }

    /// Scratch database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Db { conn })
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "page_size", 4096i64)?;
    conn.pragma_update(None, "cache_size", -65536i64)?; // 64 MiB
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='cpe_records'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        debug!("applying initial schema");
        conn.execute_batch(MIG_0001_INIT)?;
    }
    Ok(())
}
