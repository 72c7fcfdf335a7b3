//! SQL migration definitions for the ToolHarvest database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: tools, batch_runs, FTS5",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Enriched tool records, keyed by the listing's data-id
CREATE TABLE IF NOT EXISTS tools (
    data_id          TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    task             TEXT NOT NULL,
    task_slug        TEXT NOT NULL,
    url              TEXT NOT NULL,
    use_case         TEXT NOT NULL,
    launch_date_text TEXT NOT NULL,
    launch_date      TEXT,
    thumbnail_url    TEXT,
    link_href        TEXT,
    summary          TEXT NOT NULL,
    screenshot       BLOB,
    favicon          TEXT,
    categories_json  TEXT NOT NULL,
    category         TEXT NOT NULL,
    category_1st     TEXT,
    category_2nd     TEXT,
    category_3rd     TEXT,
    keywords_raw     TEXT NOT NULL,
    keywords         TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tools_url ON tools(url);
CREATE INDEX IF NOT EXISTS idx_tools_created_at ON tools(created_at);
CREATE INDEX IF NOT EXISTS idx_tools_category_1st ON tools(category_1st);

-- Batch run history
CREATE TABLE IF NOT EXISTS batch_runs (
    id          TEXT PRIMARY KEY,
    source_url  TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

-- Full-text search on tools
CREATE VIRTUAL TABLE IF NOT EXISTS tools_fts USING fts5(
    name,
    summary,
    keywords,
    content=tools,
    content_rowid=rowid
);

-- Triggers to keep FTS in sync with tools table
CREATE TRIGGER IF NOT EXISTS tools_fts_insert AFTER INSERT ON tools BEGIN
    INSERT INTO tools_fts(rowid, name, summary, keywords)
    VALUES (new.rowid, new.name, new.summary, new.keywords);
END;

CREATE TRIGGER IF NOT EXISTS tools_fts_delete AFTER DELETE ON tools BEGIN
    INSERT INTO tools_fts(tools_fts, rowid, name, summary, keywords)
    VALUES ('delete', old.rowid, old.name, old.summary, old.keywords);
END;

CREATE TRIGGER IF NOT EXISTS tools_fts_update AFTER UPDATE ON tools BEGIN
    INSERT INTO tools_fts(tools_fts, rowid, name, summary, keywords)
    VALUES ('delete', old.rowid, old.name, old.summary, old.keywords);
    INSERT INTO tools_fts(rowid, name, summary, keywords)
    VALUES (new.rowid, new.name, new.summary, new.keywords);
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
