pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE cpe_records (
  record_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  cpe_name        TEXT NOT NULL UNIQUE,
  cpe_name_id     TEXT NOT NULL UNIQUE,
  part            TEXT NOT NULL,
  vendor          TEXT NOT NULL,
  product         TEXT NOT NULL,
  version         TEXT NOT NULL DEFAULT '',
  update_field    TEXT NOT NULL DEFAULT '',
  edition         TEXT NOT NULL DEFAULT '',
  language        TEXT NOT NULL DEFAULT '',
  sw_edition      TEXT NOT NULL DEFAULT '',
  target_sw       TEXT NOT NULL DEFAULT '',
  target_hw       TEXT NOT NULL DEFAULT '',
  other           TEXT NOT NULL DEFAULT '',
  deprecated      INTEGER NOT NULL CHECK (deprecated IN (0,1)) DEFAULT 0,
  deprecated_by   TEXT,
  created_at      INTEGER NOT NULL,
  updated_at      INTEGER NOT NULL
);

CREATE TABLE import_logs (
  log_id            INTEGER PRIMARY KEY AUTOINCREMENT,
  source            TEXT NOT NULL CHECK (source IN ('CPE','CVE','LINUX')),
  operation         TEXT NOT NULL CHECK (operation IN ('FULL_IMPORT','INCREMENTAL')),
  status            TEXT NOT NULL CHECK (status IN ('STARTED','SUCCESS','FAILED','PARTIAL')),
  records_processed INTEGER NOT NULL DEFAULT 0,
  error_message     TEXT NOT NULL DEFAULT '',
  created_at        INTEGER NOT NULL,
  updated_at        INTEGER NOT NULL
);

CREATE INDEX idx_cpe_vendor_product ON cpe_records(vendor, product);
CREATE INDEX idx_cpe_part_vendor ON cpe_records(part, vendor);
CREATE INDEX idx_cpe_deprecated ON cpe_records(deprecated);
CREATE INDEX idx_cpe_created ON cpe_records(created_at);
CREATE INDEX idx_import_source_status ON import_logs(source, status);
CREATE INDEX idx_import_created ON import_logs(created_at);

COMMIT;
"#
;
