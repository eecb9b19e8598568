use crate::{CpeEntry, CpeRecord, Db, ImportLog, ImportLogId, ImportOperation, ImportStatus};
use anyhow::Result;
use cpe_name::CpeComponents;
use ingest_core::Source;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row};

const RECORD_COLUMNS: &str = "record_id,cpe_name,cpe_name_id,part,vendor,product,version,update_field,edition,language,sw_edition,target_sw,target_hw,other,deprecated,deprecated_by,created_at,updated_at";
const LOG_COLUMNS: &str = "log_id,source,operation,status,records_processed,error_message,created_at,updated_at";

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn record_by_name_id(&self, cpe_name_id: &str) -> Result<Option<CpeRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM cpe_records WHERE cpe_name_id=?");
        Ok(self.conn.query_row(&sql, [cpe_name_id], record_from_row).optional()?)
    }

    pub fn record_by_name(&self, cpe_name: &str) -> Result<Option<CpeRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM cpe_records WHERE cpe_name=?");
        Ok(self.conn.query_row(&sql, [cpe_name], record_from_row).optional()?)
    }

    pub fn record_count(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(1) FROM cpe_records", [], |r| r.get(0))?)
    }

    pub fn deprecated_count(&self) -> Result<i64> {
        Ok(self.conn.query_row("SELECT COUNT(1) FROM cpe_records WHERE deprecated=1", [], |r| r.get(0))?)
    }

    pub fn import_log(&self, log_id: ImportLogId) -> Result<Option<ImportLog>> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM import_logs WHERE log_id=?");
        Ok(self.conn.query_row(&sql, [log_id], log_from_row).optional()?)
    }

    pub fn latest_import_log(&self, source: Source) -> Result<Option<ImportLog>> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM import_logs WHERE source=? ORDER BY created_at DESC, log_id DESC LIMIT 1");
        Ok(self.conn.query_row(&sql, [source.as_str()], log_from_row).optional()?)
    }

    /// Most recent attempts first.
    pub fn import_logs(&self, limit: usize) -> Result<Vec<ImportLog>> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM import_logs ORDER BY created_at DESC, log_id DESC LIMIT ?");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([limit as i64], log_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn record_from_row(r: &Row) -> rusqlite::Result<CpeRecord> {
    let deprecated_by: Option<String> = r.get(15)?;
    let deprecated_by = match deprecated_by {
        Some(json) => Some(
            serde_json::from_str::<Vec<String>>(&json)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?,
        ),
        None => None,
    };
    Ok(CpeRecord {
        record_id: r.get(0)?,
        entry: CpeEntry {
            cpe_name: r.get(1)?,
            cpe_name_id: r.get(2)?,
            components: CpeComponents {
                part: r.get(3)?,
                vendor: r.get(4)?,
                product: r.get(5)?,
                version: r.get(6)?,
                update: r.get(7)?,
                edition: r.get(8)?,
                language: r.get(9)?,
                sw_edition: r.get(10)?,
                target_sw: r.get(11)?,
                target_hw: r.get(12)?,
                other: r.get(13)?,
            },
            deprecated: r.get::<_, i64>(14)? != 0,
            deprecated_by,
        },
        created_at: r.get(16)?,
        updated_at: r.get(17)?,
    })
}

fn log_from_row(r: &Row) -> rusqlite::Result<ImportLog> {
    let source: String = r.get(1)?;
    let operation: String = r.get(2)?;
    let status: String = r.get(3)?;
    Ok(ImportLog {
        log_id: r.get(0)?,
        source: Source::parse(&source).ok_or_else(|| bad_enum(1, &source))?,
        operation: ImportOperation::parse(&operation).ok_or_else(|| bad_enum(2, &operation))?,
        status: ImportStatus::parse(&status).ok_or_else(|| bad_enum(3, &status))?,
        records_processed: r.get(4)?,
        error_message: r.get(5)?,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

fn bad_enum(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unexpected value {value:?}").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpe_name::parse_cpe_name;

    #[test]
    fn fresh_store_has_schema() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.table_exists("cpe_records").unwrap());
        assert!(db.table_exists("import_logs").unwrap());
        assert!(!db.table_exists("runs").unwrap());
        assert_eq!(db.record_count().unwrap(), 0);
    }

    #[test]
    fn lookups_by_either_key() {
        let mut db = Db::open_in_memory().unwrap();
        let name = "cpe:2.3:o:microsoft:windows:10:*:*:*:*:*:*:*";
        let entry = CpeEntry {
            cpe_name: name.into(),
            cpe_name_id: "win-10".into(),
            components: parse_cpe_name(name),
            deprecated: true,
            deprecated_by: Some(vec!["cpe:2.3:o:microsoft:windows_10:-:*:*:*:*:*:*:*".into()]),
        };
        db.insert_record(&entry).unwrap();

        let by_id = db.record_by_name_id("win-10").unwrap().unwrap();
        let by_name = db.record_by_name(name).unwrap().unwrap();
        assert_eq!(by_id, by_name);
        assert_eq!(by_id.entry, entry);
        assert!(by_id.entry.is_operating_system());
        assert_eq!(db.deprecated_count().unwrap(), 1);
        assert!(db.record_by_name_id("missing").unwrap().is_none());
    }

    #[test]
    fn logs_are_listed_newest_first() {
        let db = Db::open_in_memory().unwrap();
        let first = db.begin_import(Source::Cpe, ImportOperation::FullImport).unwrap();
        let second = db.begin_import(Source::Cpe, ImportOperation::Incremental).unwrap();
        db.begin_import(Source::Cve, ImportOperation::FullImport).unwrap();

        let latest = db.latest_import_log(Source::Cpe).unwrap().unwrap();
        assert_eq!(latest.log_id, second);
        assert_eq!(latest.operation, ImportOperation::Incremental);

        let logs = db.import_logs(2).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.log_id != first));
        assert!(db.latest_import_log(Source::Linux).unwrap().is_none());
    }

    #[test]
    fn file_backed_store_reopens_without_remigrating() {
        let path = std::env::temp_dir().join(format!("cpe-store-test-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let db = Db::open_or_create(&path).unwrap();
            db.begin_import(Source::Cpe, ImportOperation::FullImport).unwrap();
        }
        let db = Db::open_or_create(&path).unwrap();
        assert_eq!(db.import_logs(10).unwrap().len(), 1);
        drop(db);
        let _ = std::fs::remove_file(&path);
    }
}
