//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding enriched tool
//! records, batch-run history, and a full-text index over tools.
//!
//! **Access rules:**
//! - `run` and the maintenance commands: read-write via [`Storage::open`]
//! - `list` / `search` / `show`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use toolharvest_shared::{
    CandidateRecord, CategoryScore, EnrichedRecord, Result, ToolHarvestError,
};
use uuid::Uuid;

/// Columns read for every tool query, screenshot excluded.
const TOOL_COLUMNS: &str = "data_id, name, task, task_slug, url, use_case, launch_date_text, \
     launch_date, thumbnail_url, link_href, summary, favicon, categories_json, category, \
     keywords_raw, keywords, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ToolHarvestError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolHarvestError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ToolHarvestError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ToolHarvestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tool operations
    // -----------------------------------------------------------------------

    /// Whether a tool with this business key is already stored.
    pub async fn tool_exists(&self, data_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM tools WHERE data_id = ?1", params![data_id])
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(ToolHarvestError::Storage(e.to_string())),
        }
    }

    /// Upsert an enriched tool by `data_id`. `created_at` survives updates.
    pub async fn upsert_tool(&self, record: &EnrichedRecord) -> Result<()> {
        self.check_writable()?;
        let c = &record.candidate;
        let now = Utc::now().to_rfc3339();
        let categories_json = serde_json::to_string(&record.categories)
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;
        let top = |i: usize| record.categories.get(i).map(|s| s.category.label());
        let screenshot = if record.screenshot.is_empty() {
            None
        } else {
            Some(record.screenshot.clone())
        };

        self.conn
            .execute(
                "INSERT INTO tools (data_id, name, task, task_slug, url, use_case, launch_date_text,
                    launch_date, thumbnail_url, link_href, summary, screenshot, favicon,
                    categories_json, category, category_1st, category_2nd, category_3rd,
                    keywords_raw, keywords, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22)
                 ON CONFLICT(data_id) DO UPDATE SET
                   name = excluded.name,
                   task = excluded.task,
                   task_slug = excluded.task_slug,
                   url = excluded.url,
                   use_case = excluded.use_case,
                   launch_date_text = excluded.launch_date_text,
                   launch_date = excluded.launch_date,
                   thumbnail_url = excluded.thumbnail_url,
                   link_href = excluded.link_href,
                   summary = excluded.summary,
                   screenshot = excluded.screenshot,
                   favicon = excluded.favicon,
                   categories_json = excluded.categories_json,
                   category = excluded.category,
                   category_1st = excluded.category_1st,
                   category_2nd = excluded.category_2nd,
                   category_3rd = excluded.category_3rd,
                   keywords_raw = excluded.keywords_raw,
                   keywords = excluded.keywords,
                   updated_at = excluded.updated_at",
                params![
                    c.data_id.as_str(),
                    c.name.as_str(),
                    c.task.as_str(),
                    c.task_slug.as_str(),
                    c.url.as_str(),
                    c.use_case.as_str(),
                    c.launch_date_text.as_str(),
                    c.launch_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    c.thumbnail_url.as_deref(),
                    c.link_href.as_deref(),
                    record.summary.as_str(),
                    screenshot,
                    record.favicon.as_deref(),
                    categories_json.as_str(),
                    record.category.as_str(),
                    top(0),
                    top(1),
                    top(2),
                    record.keywords_raw.as_str(),
                    record.keywords.as_str(),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        tracing::debug!(data_id = %c.data_id, "upserted tool");
        Ok(())
    }

    /// Get a tool by `data_id`, screenshot included.
    pub async fn get_tool(&self, data_id: &str) -> Result<Option<StoredTool>> {
        let sql = format!("SELECT {TOOL_COLUMNS}, screenshot FROM tools WHERE data_id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![data_id])
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let mut tool = row_to_stored_tool(&row)?;
                tool.record.screenshot = row.get::<Vec<u8>>(18).unwrap_or_default();
                Ok(Some(tool))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ToolHarvestError::Storage(e.to_string())),
        }
    }

    /// List tools newest first. `page` is 1-based.
    pub async fn list_tools(&self, page: u32, per_page: u32) -> Result<Vec<StoredTool>> {
        let per_page = per_page.max(1);
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        let sql = format!(
            "SELECT {TOOL_COLUMNS} FROM tools
             ORDER BY created_at DESC, data_id DESC
             LIMIT ?1 OFFSET ?2"
        );
        self.query_tools(&sql, params![per_page, offset]).await
    }

    /// Total number of stored tools.
    pub async fn count_tools(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM tools", params![])
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map(|n| n.max(0) as u64).unwrap_or(0)),
            Ok(None) => Ok(0),
            Err(e) => Err(ToolHarvestError::Storage(e.to_string())),
        }
    }

    /// Tools whose stored ranking is missing or invalid.
    pub async fn list_tools_needing_categories(&self) -> Result<Vec<StoredTool>> {
        let sql = format!("SELECT {TOOL_COLUMNS} FROM tools ORDER BY created_at");
        let tools = self.query_tools(&sql, params![]).await?;
        Ok(tools
            .into_iter()
            .filter(|t| !t.record.has_valid_categories())
            .collect())
    }

    /// Replace a tool's categorization and the keyword fields derived from it.
    pub async fn update_categories(
        &self,
        data_id: &str,
        categories: &[CategoryScore],
        category: &str,
        keywords_raw: &str,
        keywords: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let categories_json = serde_json::to_string(categories)
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;
        let top = |i: usize| categories.get(i).map(|s| s.category.label());
        self.conn
            .execute(
                "UPDATE tools SET categories_json = ?1, category = ?2, category_1st = ?3,
                    category_2nd = ?4, category_3rd = ?5, keywords_raw = ?6, keywords = ?7,
                    updated_at = ?8
                 WHERE data_id = ?9",
                params![
                    categories_json.as_str(),
                    category,
                    top(0),
                    top(1),
                    top(2),
                    keywords_raw,
                    keywords,
                    now.as_str(),
                    data_id,
                ],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;
        Ok(())
    }

    /// `(data_id, url)` of tools stored without a favicon.
    pub async fn list_missing_favicons(&self) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT data_id, url FROM tools
                 WHERE favicon IS NULL OR favicon = ''
                 ORDER BY created_at",
                params![],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?
        {
            results.push((
                row.get::<String>(0)
                    .map_err(|e| ToolHarvestError::Storage(e.to_string()))?,
                row.get::<String>(1)
                    .map_err(|e| ToolHarvestError::Storage(e.to_string()))?,
            ));
        }
        Ok(results)
    }

    /// Set a tool's base64 favicon.
    pub async fn update_favicon(&self, data_id: &str, favicon: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE tools SET favicon = ?1, updated_at = ?2 WHERE data_id = ?3",
                params![favicon, now.as_str(), data_id],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete every tool whose target URL starts with `prefix`.
    /// Returns the number of deleted rows.
    pub async fn delete_by_url_prefix(&self, prefix: &str) -> Result<u64> {
        self.check_writable()?;
        if prefix.is_empty() {
            return Err(ToolHarvestError::validation("URL prefix must not be empty"));
        }
        let deleted = self
            .conn
            .execute(
                "DELETE FROM tools WHERE substr(url, 1, length(?1)) = ?1",
                params![prefix],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;
        tracing::info!(prefix, deleted, "deleted tools by url prefix");
        Ok(deleted)
    }

    async fn query_tools(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<StoredTool>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?
        {
            results.push(row_to_stored_tool(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Batch run operations
    // -----------------------------------------------------------------------

    /// Record the start of a batch. Returns the generated run ID.
    pub async fn begin_batch_run(&self, source_url: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO batch_runs (id, source_url, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), source_url, now.as_str()],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark a batch as finished with its final counters.
    pub async fn finish_batch_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE batch_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Mark a batch as finished after a fatal error. The error message is
    /// kept in the stats payload under `"error"`.
    pub async fn fail_batch_run(&self, run_id: &str, error: &str) -> Result<()> {
        let stats = serde_json::json!({ "error": error }).to_string();
        self.finish_batch_run(run_id, &stats).await
    }

    /// Most recent batch runs first.
    pub async fn list_batch_runs(&self, limit: u32) -> Result<Vec<BatchRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source_url, started_at, finished_at, stats_json
                 FROM batch_runs ORDER BY started_at DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?
        {
            results.push(BatchRun {
                id: row
                    .get::<String>(0)
                    .map_err(|e| ToolHarvestError::Storage(e.to_string()))?,
                source_url: row
                    .get::<String>(1)
                    .map_err(|e| ToolHarvestError::Storage(e.to_string()))?,
                started_at: parse_timestamp(
                    &row.get::<String>(2)
                        .map_err(|e| ToolHarvestError::Storage(e.to_string()))?,
                )?,
                finished_at: row
                    .get::<String>(3)
                    .ok()
                    .map(|s| parse_timestamp(&s))
                    .transpose()?,
                stats_json: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // FTS search
    // -----------------------------------------------------------------------

    /// Full-text search over tool name, summary and keywords.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchResult>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.data_id, t.name, t.url, t.category, rank
                 FROM tools_fts fts
                 JOIN tools t ON t.rowid = fts.rowid
                 WHERE tools_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
                params![query, limit],
            )
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))?
        {
            results.push(SearchResult {
                data_id: row
                    .get::<String>(0)
                    .map_err(|e| ToolHarvestError::Storage(e.to_string()))?,
                name: row
                    .get::<String>(1)
                    .map_err(|e| ToolHarvestError::Storage(e.to_string()))?,
                url: row
                    .get::<String>(2)
                    .map_err(|e| ToolHarvestError::Storage(e.to_string()))?,
                category: row.get::<String>(3).unwrap_or_default(),
                score: row.get(4).unwrap_or(0.0),
            });
        }
        Ok(results)
    }
}

/// A stored tool with its bookkeeping timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct StoredTool {
    #[serde(flatten)]
    pub record: EnrichedRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recorded batch run.
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub id: String,
    pub source_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats_json: Option<String>,
}

/// A search result from FTS5.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub data_id: String,
    pub name: String,
    pub url: String,
    /// Top-3 category label.
    pub category: String,
    /// FTS5 rank score (lower is better).
    pub score: f64,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ToolHarvestError::Storage(format!("invalid date: {e}")))
}

/// Convert a row selected with [`TOOL_COLUMNS`] to a [`StoredTool`].
fn row_to_stored_tool(row: &libsql::Row) -> Result<StoredTool> {
    let text = |i: i32| -> Result<String> {
        row.get::<String>(i)
            .map_err(|e| ToolHarvestError::Storage(e.to_string()))
    };

    // A ranking that no longer parses is treated as missing.
    let categories: Vec<CategoryScore> = serde_json::from_str(&text(12)?).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "unreadable categories_json, treating as empty");
        Vec::new()
    });

    let candidate = CandidateRecord {
        data_id: text(0)?,
        name: text(1)?,
        task: text(2)?,
        task_slug: text(3)?,
        url: text(4)?,
        use_case: text(5)?,
        launch_date_text: text(6)?,
        launch_date: row
            .get::<String>(7)
            .ok()
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        thumbnail_url: row.get::<String>(8).ok(),
        link_href: row.get::<String>(9).ok(),
    };

    Ok(StoredTool {
        record: EnrichedRecord {
            candidate,
            summary: text(10)?,
            screenshot: Vec::new(),
            favicon: row.get::<String>(11).ok().filter(|f| !f.is_empty()),
            categories,
            category: text(13)?,
            keywords_raw: text(14)?,
            keywords: text(15)?,
        },
        created_at: parse_timestamp(&text(16)?)?,
        updated_at: parse_timestamp(&text(17)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolharvest_shared::{Category, top_category_label};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("th_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn sample_record(data_id: &str, name: &str, url: &str) -> EnrichedRecord {
        let categories = vec![
            CategoryScore { category: Category::Images, score: 90 },
            CategoryScore { category: Category::ContentsCreation, score: 80 },
            CategoryScore { category: Category::Automation, score: 60 },
            CategoryScore { category: Category::Videos, score: 30 },
            CategoryScore { category: Category::Gaming, score: 5 },
        ];
        EnrichedRecord {
            candidate: CandidateRecord {
                data_id: data_id.into(),
                name: name.into(),
                task: "Image generation".into(),
                task_slug: "image-generation".into(),
                url: url.into(),
                use_case: "Generate images from prompts".into(),
                launch_date_text: "15 Mar 2023".into(),
                launch_date: NaiveDate::from_ymd_opt(2023, 3, 15),
                thumbnail_url: Some("https://cdn.example.com/thumb.png".into()),
                link_href: None,
            },
            summary: format!("{name} turns text prompts into pictures."),
            screenshot: vec![0xFF, 0xD8, 0xFF],
            favicon: Some("aWNvbg==".into()),
            category: top_category_label(&categories),
            categories,
            keywords_raw: "raw".into(),
            keywords: format!("{} pictures prompts", name.to_lowercase()),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("th_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn upsert_and_get_tool() {
        let storage = test_storage().await;
        assert!(!storage.tool_exists("42").await.unwrap());

        let record = sample_record("42", "Pixelate", "https://pixelate.example.com");
        storage.upsert_tool(&record).await.expect("upsert");
        assert!(storage.tool_exists("42").await.unwrap());

        let stored = storage.get_tool("42").await.expect("get").expect("present");
        assert_eq!(stored.record.candidate.name, "Pixelate");
        assert_eq!(stored.record.candidate.launch_date, NaiveDate::from_ymd_opt(2023, 3, 15));
        assert_eq!(stored.record.screenshot, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(stored.record.categories.len(), 5);
        assert_eq!(stored.record.category, "Images.Contents Creation.Automation");
        assert!(stored.record.has_valid_categories());
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row_and_created_at() {
        let storage = test_storage().await;
        let mut record = sample_record("7", "Echo", "https://echo.example.com");
        storage.upsert_tool(&record).await.unwrap();
        let first = storage.get_tool("7").await.unwrap().unwrap();

        record.summary = "Updated summary".into();
        storage.upsert_tool(&record).await.unwrap();
        let second = storage.get_tool("7").await.unwrap().unwrap();

        assert_eq!(storage.count_tools().await.unwrap(), 1);
        assert_eq!(second.record.summary, "Updated summary");
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn list_tools_paginates() {
        let storage = test_storage().await;
        for i in 0..5 {
            let record = sample_record(&i.to_string(), &format!("Tool{i}"), "https://t.example.com");
            storage.upsert_tool(&record).await.unwrap();
        }

        let page1 = storage.list_tools(1, 2).await.unwrap();
        let page3 = storage.list_tools(3, 2).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page3.len(), 1);
        assert!(page1.iter().all(|t| t.record.screenshot.is_empty()));
    }

    #[tokio::test]
    async fn recategorization_candidates() {
        let storage = test_storage().await;
        storage
            .upsert_tool(&sample_record("good", "Good", "https://good.example.com"))
            .await
            .unwrap();
        let mut bad = sample_record("bad", "Bad", "https://bad.example.com");
        bad.categories.truncate(2);
        storage.upsert_tool(&bad).await.unwrap();

        let needing = storage.list_tools_needing_categories().await.unwrap();
        assert_eq!(needing.len(), 1);
        assert_eq!(needing[0].record.candidate.data_id, "bad");

        let fixed = sample_record("bad", "Bad", "https://bad.example.com");
        storage
            .update_categories("bad", &fixed.categories, &fixed.category, "raw", "bad")
            .await
            .unwrap();
        assert!(storage.list_tools_needing_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn favicon_maintenance() {
        let storage = test_storage().await;
        let mut record = sample_record("1", "NoIcon", "https://noicon.example.com");
        record.favicon = None;
        storage.upsert_tool(&record).await.unwrap();

        let missing = storage.list_missing_favicons().await.unwrap();
        assert_eq!(missing, vec![("1".to_string(), "https://noicon.example.com".to_string())]);

        storage.update_favicon("1", "Zm9v").await.unwrap();
        assert!(storage.list_missing_favicons().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_by_prefix_is_literal() {
        let storage = test_storage().await;
        for (id, url) in [
            ("a", "https://apps.apple.com/us/app/one"),
            ("b", "https://apps.apple.com/us/app/two"),
            ("c", "https://example.com/apps.apple.com"),
        ] {
            storage.upsert_tool(&sample_record(id, id, url)).await.unwrap();
        }

        let deleted = storage
            .delete_by_url_prefix("https://apps.apple.com/")
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(storage.tool_exists("c").await.unwrap());
        assert!(storage.delete_by_url_prefix("").await.is_err());
    }

    #[tokio::test]
    async fn batch_run_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage
            .begin_batch_run("https://listing.example.com")
            .await
            .expect("begin");
        storage
            .finish_batch_run(&run_id, r#"{"inserted": 3}"#)
            .await
            .expect("finish");

        let runs = storage.list_batch_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].finished_at.is_some());
        assert_eq!(runs[0].stats_json.as_deref(), Some(r#"{"inserted": 3}"#));
    }

    #[tokio::test]
    async fn failed_batch_run_is_finished_with_error() {
        let storage = test_storage().await;
        let run_id = storage
            .begin_batch_run("https://listing.example.com")
            .await
            .expect("begin");
        storage
            .fail_batch_run(&run_id, "network error: listing page returned HTTP 503")
            .await
            .expect("fail");

        let runs = storage.list_batch_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].finished_at.is_some());
        let stats: serde_json::Value =
            serde_json::from_str(runs[0].stats_json.as_deref().expect("stats")).unwrap();
        assert_eq!(
            stats["error"],
            "network error: listing page returned HTTP 503"
        );
    }

    #[tokio::test]
    async fn row_error_mid_scan_is_returned() {
        let storage = test_storage().await;
        storage
            .upsert_tool(&sample_record("a", "Alpha", "https://a.example.com"))
            .await
            .unwrap();
        storage
            .upsert_tool(&sample_record("b", "Beta", "https://b.example.com"))
            .await
            .unwrap();

        // The second row fails while stepping, after the first was read.
        let sql = format!(
            "SELECT {TOOL_COLUMNS} FROM tools
             WHERE json(CASE WHEN data_id = 'b' THEN '{{bad' ELSE '{{}}' END) IS NOT NULL
             ORDER BY data_id"
        );
        assert!(storage.query_tools(&sql, params![]).await.is_err());
    }

    #[tokio::test]
    async fn fts_search() {
        let storage = test_storage().await;
        storage
            .upsert_tool(&sample_record("1", "Pixelate", "https://p.example.com"))
            .await
            .unwrap();
        storage
            .upsert_tool(&sample_record("2", "Voicebox", "https://v.example.com"))
            .await
            .unwrap();

        let results = storage.search("voicebox", 10).await.expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].data_id, "2");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("th_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.upsert_tool(&sample_record("1", "One", "https://one.example.com"))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.tool_exists("1").await.unwrap());
        let result = ro
            .upsert_tool(&sample_record("2", "Two", "https://two.example.com"))
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
