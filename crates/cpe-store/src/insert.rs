use crate::{now_ms, CpeEntry, Db, ImportLogId, ImportOperation, ImportStatus, RecordId, WriteOutcome};
use anyhow::Result;
use ingest_core::Source;
use rusqlite::{params, Connection, OptionalExtension};

const INSERT_RECORD: &str = "INSERT INTO cpe_records(cpe_name,cpe_name_id,part,vendor,product,version,update_field,edition,language,sw_edition,target_sw,target_hw,other,deprecated,deprecated_by,created_at,updated_at)
     VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)";

impl Db {
    /// Strict create: fails if `cpe_name` or `cpe_name_id` is already stored.
    pub fn insert_record(&mut self, entry: &CpeEntry) -> Result<RecordId> {
        let tx = self.conn.transaction()?;
        insert_entry(&tx, INSERT_RECORD, entry)?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Create the row unless one with the same `cpe_name_id` or `cpe_name`
    /// exists. Existing rows are left untouched.
    pub fn create_record_if_absent(&mut self, entry: &CpeEntry) -> Result<WriteOutcome> {
        let tx = self.conn.transaction()?;
        let sql = format!("{INSERT_RECORD} ON CONFLICT DO NOTHING");
        let changed = insert_entry(&tx, &sql, entry)?;
        tx.commit()?;
        Ok(if changed == 1 { WriteOutcome::Created } else { WriteOutcome::AlreadyExists })
    }

    /// Create or overwrite the row keyed by `cpe_name_id`. Every mutable
    /// column takes the new value; `created_at` is kept and `updated_at`
    /// always moves forward, even within the same millisecond.
    pub fn upsert_record(&mut self, entry: &CpeEntry) -> Result<WriteOutcome> {
        let tx = self.conn.transaction()?;
        let existing: Option<RecordId> = tx
            .query_row(
                "SELECT record_id FROM cpe_records WHERE cpe_name_id=?",
                [entry.cpe_name_id.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        let sql = format!(
            "{INSERT_RECORD} ON CONFLICT(cpe_name_id) DO UPDATE SET cpe_name=excluded.cpe_name, part=excluded.part, vendor=excluded.vendor, product=excluded.product, version=excluded.version, update_field=excluded.update_field, edition=excluded.edition, language=excluded.language, sw_edition=excluded.sw_edition, target_sw=excluded.target_sw, target_hw=excluded.target_hw, other=excluded.other, deprecated=excluded.deprecated, deprecated_by=excluded.deprecated_by, updated_at=MAX(excluded.updated_at, cpe_records.updated_at + 1)"
        );
        insert_entry(&tx, &sql, entry)?;
        tx.commit()?;
        Ok(if existing.is_some() { WriteOutcome::Updated } else { WriteOutcome::Created })
    }

    pub fn begin_import(&self, source: Source, operation: ImportOperation) -> Result<ImportLogId> {
        let now = now_ms();
        self.conn.execute(
            "INSERT INTO import_logs(source,operation,status,records_processed,error_message,created_at,updated_at) VALUES (?,?,?,0,'',?,?)",
            params![source.as_str(), operation.as_str(), ImportStatus::Started.as_str(), now, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finish_import(&self, log_id: ImportLogId, status: ImportStatus, records_processed: i64, error_message: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE import_logs SET status=?, records_processed=?, error_message=?, updated_at=? WHERE log_id=?",
            params![status.as_str(), records_processed, error_message, now_ms(), log_id],
        )?;
        if updated == 0 {
            anyhow::bail!("import log {log_id} not found");
        }
        Ok(())
    }
}

fn insert_entry(conn: &Connection, sql: &str, entry: &CpeEntry) -> Result<usize> {
    let e = entry.clone().clamped();
    let c = &e.components;
    let deprecated_by = match &e.deprecated_by {
        Some(list) => Some(serde_json::to_string(list)?),
        None => None,
    };
    let now = now_ms();
    let changed = conn.execute(
        sql,
        params![
            e.cpe_name, e.cpe_name_id, c.part, c.vendor, c.product, c.version, c.update, c.edition,
            c.language, c.sw_edition, c.target_sw, c.target_hw, c.other,
            if e.deprecated { 1i64 } else { 0i64 }, deprecated_by, now, now
        ],
    )?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpe_name::parse_cpe_name;

    fn entry(name_id: &str, name: &str) -> CpeEntry {
        CpeEntry {
            cpe_name: name.into(),
            cpe_name_id: name_id.into(),
            components: parse_cpe_name(name),
            deprecated: false,
            deprecated_by: None,
        }
    }

    #[test]
    fn strict_insert_rejects_duplicates() {
        let mut db = Db::open_in_memory().unwrap();
        let e = entry("id-1", "cpe:2.3:a:apache:http_server:2.4.41:*:*:*:*:*:*:*");
        db.insert_record(&e).unwrap();
        assert!(db.insert_record(&e).is_err());

        let mut same_name = e.clone();
        same_name.cpe_name_id = "id-2".into();
        assert!(db.insert_record(&same_name).is_err());
        assert_eq!(db.record_count().unwrap(), 1);
    }

    #[test]
    fn create_if_absent_keeps_existing_row() {
        let mut db = Db::open_in_memory().unwrap();
        let e = entry("id-1", "cpe:2.3:a:apache:http_server:2.4.41:*:*:*:*:*:*:*");
        assert_eq!(db.create_record_if_absent(&e).unwrap(), WriteOutcome::Created);

        let mut changed = e.clone();
        changed.components.version = "9.9".into();
        assert_eq!(db.create_record_if_absent(&changed).unwrap(), WriteOutcome::AlreadyExists);

        let stored = db.record_by_name_id("id-1").unwrap().unwrap();
        assert_eq!(stored.entry.components.version, "2.4.41");
        assert_eq!(db.record_count().unwrap(), 1);
    }

    #[test]
    fn upsert_overwrites_and_keeps_created_at() {
        let mut db = Db::open_in_memory().unwrap();
        let e = entry("id-1", "cpe:2.3:a:apache:http_server:2.4.41:*:*:*:*:*:*:*");
        assert_eq!(db.upsert_record(&e).unwrap(), WriteOutcome::Created);
        let first = db.record_by_name_id("id-1").unwrap().unwrap();

        let mut newer = e.clone();
        newer.components.version = "2.4.42".into();
        newer.deprecated = true;
        newer.deprecated_by = Some(vec!["cpe:2.3:a:apache:http_server:2.4.50:*:*:*:*:*:*:*".into()]);
        assert_eq!(db.upsert_record(&newer).unwrap(), WriteOutcome::Updated);

        let second = db.record_by_name_id("id-1").unwrap().unwrap();
        assert_eq!(second.record_id, first.record_id);
        assert_eq!(second.entry.components.version, "2.4.42");
        assert!(second.entry.deprecated);
        assert_eq!(second.entry.deprecated_by, newer.deprecated_by);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn back_to_back_upserts_advance_updated_at() {
        let mut db = Db::open_in_memory().unwrap();
        let e = entry("id-1", "cpe:2.3:a:apache:http_server:2.4.41:*:*:*:*:*:*:*");
        db.upsert_record(&e).unwrap();
        let mut last = db.record_by_name_id("id-1").unwrap().unwrap();
        for _ in 0..5 {
            assert_eq!(db.upsert_record(&e).unwrap(), WriteOutcome::Updated);
            let next = db.record_by_name_id("id-1").unwrap().unwrap();
            assert!(next.updated_at > last.updated_at, "{} <= {}", next.updated_at, last.updated_at);
            assert_eq!(next.created_at, last.created_at);
            last = next;
        }
    }

    #[test]
    fn writes_truncate_long_fields() {
        let mut db = Db::open_in_memory().unwrap();
        let mut e = entry("id-1", "cpe:2.3:a:v:p:1:*:*:*:*:*:*:*");
        e.components.product = "p".repeat(300);
        e.components.language = "l".repeat(30);
        db.insert_record(&e).unwrap();
        let stored = db.record_by_name_id("id-1").unwrap().unwrap();
        assert_eq!(stored.entry.components.product.len(), 200);
        assert_eq!(stored.entry.components.language.len(), 10);
    }

    #[test]
    fn import_log_lifecycle() {
        let db = Db::open_in_memory().unwrap();
        let id = db.begin_import(Source::Cpe, ImportOperation::FullImport).unwrap();
        let started = db.import_log(id).unwrap().unwrap();
        assert_eq!(started.status, ImportStatus::Started);
        assert_eq!(started.records_processed, 0);
        assert_eq!(started.error_message, "");

        db.finish_import(id, ImportStatus::Failed, 12, "boom").unwrap();
        let done = db.import_log(id).unwrap().unwrap();
        assert_eq!(done.status, ImportStatus::Failed);
        assert_eq!(done.records_processed, 12);
        assert_eq!(done.error_message, "boom");
        assert_eq!(done.created_at, started.created_at);

        assert!(db.finish_import(id + 100, ImportStatus::Success, 0, "").is_err());
    }
}
