use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::config::DbConfig;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use time::{Duration, OffsetDateTime};

use crate::config::{ConfigPaths, StorageOptions};
use crate::gateway::{Gateway, GatewayError, GatewayResult, ALREADY_EXISTS};
use crate::model::{
    normalize_tags, word_count, JournalEntry, Letter, LetterKind, LetterStatus, Mood, Record,
    RecordId, Tags,
};
use crate::search::{FilterParams, SortDirection, SortField, SortSpec};

mod schema;

const FTS_ROW_LIMIT: usize = 200;
const BM25_TITLE_WEIGHT: f64 = 0.2;
const BM25_BODY_WEIGHT: f64 = 1.0;

const ENTRY_COLUMNS: &str = "e.id, e.title, e.body, e.mood, e.word_count, e.writing_seconds, \
                             e.favorite, e.created_at, e.updated_at";
const LETTER_COLUMNS: &str = "id, body, mood, kind, status, target_date, opened_at, word_count, \
                              writing_seconds, favorite, created_at, updated_at";

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::Backend(err.to_string())
    }
}

/// SQLite-backed gateway for entries and letters. Each call opens its own
/// connection on Tokio's blocking pool.
#[derive(Clone, Debug)]
pub struct SqliteGateway {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl SqliteGateway {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    async fn blocking<T, F>(&self, task: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> GatewayResult<T> + Send + 'static,
    {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = handle
                .connect()
                .map_err(|err| GatewayError::Backend(format!("{err:#}")))?;
            task(&mut conn)
        })
        .await
        .map_err(|err| GatewayError::Unexpected(format!("storage task failed: {err}")))?
    }
}

#[async_trait]
impl Gateway<JournalEntry> for SqliteGateway {
    async fn fetch_collection(&self, filter: &FilterParams) -> GatewayResult<Vec<JournalEntry>> {
        let filter = filter.clone();
        self.blocking(move |conn| fetch_entries(conn, &filter)).await
    }

    async fn create_record(&self, payload: JournalEntry) -> GatewayResult<JournalEntry> {
        self.blocking(move |conn| insert_entry(conn, &payload)).await
    }

    async fn update_record(
        &self,
        id: &RecordId,
        payload: JournalEntry,
    ) -> GatewayResult<Option<JournalEntry>> {
        let id = id.clone();
        self.blocking(move |conn| update_entry(conn, &id, &payload).map(Some))
            .await
    }

    async fn delete_record(&self, id: &RecordId) -> GatewayResult<()> {
        let id = id.clone();
        self.blocking(move |conn| {
            let deleted = conn.execute("DELETE FROM journal_entries WHERE id = ?1", params![id.as_str()])?;
            if deleted == 0 {
                return Err(GatewayError::missing(&id));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Gateway<Letter> for SqliteGateway {
    async fn fetch_collection(&self, filter: &FilterParams) -> GatewayResult<Vec<Letter>> {
        let filter = filter.clone();
        self.blocking(move |conn| fetch_letters(conn, &filter)).await
    }

    async fn create_record(&self, payload: Letter) -> GatewayResult<Letter> {
        self.blocking(move |conn| insert_letter(conn, &payload)).await
    }

    async fn update_record(&self, id: &RecordId, payload: Letter) -> GatewayResult<Option<Letter>> {
        let id = id.clone();
        self.blocking(move |conn| update_letter(conn, &id, &payload).map(Some))
            .await
    }

    async fn delete_record(&self, id: &RecordId) -> GatewayResult<()> {
        let id = id.clone();
        self.blocking(move |conn| {
            let deleted = conn.execute("DELETE FROM letters WHERE id = ?1", params![id.as_str()])?;
            if deleted == 0 {
                return Err(GatewayError::missing(&id));
            }
            Ok(())
        })
        .await
    }
}

fn fetch_entries(conn: &Connection, filter: &FilterParams) -> GatewayResult<Vec<JournalEntry>> {
    let mut entries = if filter.has_search() {
        search_entries(conn, filter)?
    } else {
        list_entries(conn, filter)?
    };

    // Text already went through FTS; the rest is checked here.
    let residual = FilterParams {
        search: None,
        ..filter.clone()
    };
    entries.retain(|entry| entry.matches(&residual));
    if let Some(limit) = filter.limit {
        entries.truncate(limit);
    }
    Ok(entries)
}

fn list_entries(conn: &Connection, filter: &FilterParams) -> GatewayResult<Vec<JournalEntry>> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    push_common_clauses("e.", filter, &mut clauses, &mut values);

    // Tags are matched after loading, so an SQL limit would undercount.
    let limit = match filter.limit {
        Some(limit) if filter.tags.is_empty() => limit as i64,
        _ => -1,
    };
    values.push(Value::Integer(limit));

    let sql = format!(
        "SELECT {ENTRY_COLUMNS}
         FROM journal_entries e
         {where_clause}
         ORDER BY {order}
         LIMIT ?{limit_index}",
        where_clause = where_clause(&clauses),
        order = order_clause("e.", filter.sort),
        limit_index = values.len(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut entries = stmt
        .query_map(params_from_iter(values), entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    attach_tags(conn, &mut entries)?;
    Ok(entries)
}

fn search_entries(conn: &Connection, filter: &FilterParams) -> GatewayResult<Vec<JournalEntry>> {
    let terms = filter.search_terms();
    let Some(match_expr) = build_match_expression(&terms) else {
        return Ok(Vec::new());
    };
    let fetch_limit = filter.limit.unwrap_or(FTS_ROW_LIMIT).max(FTS_ROW_LIMIT);
    let sql = format!(
        "SELECT {ENTRY_COLUMNS}
         FROM fts_entries
         INNER JOIN journal_entries e ON e.rowid = fts_entries.rowid
         WHERE fts_entries MATCH ?1
         ORDER BY bm25(fts_entries, {title_weight}, {body_weight}),
                  e.created_at DESC
         LIMIT ?2",
        title_weight = BM25_TITLE_WEIGHT,
        body_weight = BM25_BODY_WEIGHT
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut entries = stmt
        .query_map(params![match_expr, fetch_limit as i64], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    attach_tags(conn, &mut entries)?;
    Ok(prioritize_title_matches(entries, &terms))
}

fn load_entry(conn: &Connection, id: &RecordId) -> GatewayResult<Option<JournalEntry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM journal_entries e WHERE e.id = ?1");
    let entry = conn
        .query_row(&sql, params![id.as_str()], entry_from_row)
        .optional()?;
    match entry {
        Some(mut entry) => {
            entry.tags = load_tags(conn, &entry.id)?;
            Ok(Some(entry))
        }
        None => Ok(None),
    }
}

fn insert_entry(conn: &mut Connection, entry: &JournalEntry) -> GatewayResult<JournalEntry> {
    let tx = conn.transaction()?;
    if row_exists(&tx, "journal_entries", entry.id())? {
        return Err(GatewayError::rejected(ALREADY_EXISTS));
    }
    tx.execute(
        "INSERT INTO journal_entries
            (id, title, body, mood, word_count, writing_seconds, favorite, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.id.as_str(),
            entry.title,
            entry.body,
            entry.mood.code(),
            word_count(&entry.body),
            entry.writing_seconds,
            entry.favorite,
            entry.created_at.unix_timestamp(),
            entry.updated_at.unix_timestamp(),
        ],
    )?;
    replace_tags(&tx, &entry.id, &entry.tags)?;
    tx.commit()?;
    load_entry(conn, &entry.id)?
        .ok_or_else(|| GatewayError::Unexpected(format!("entry {} vanished after insert", entry.id)))
}

fn update_entry(
    conn: &mut Connection,
    id: &RecordId,
    entry: &JournalEntry,
) -> GatewayResult<JournalEntry> {
    let tx = conn.transaction()?;
    let updated = tx.execute(
        "UPDATE journal_entries
         SET title = ?2, body = ?3, mood = ?4, word_count = ?5, writing_seconds = ?6,
             favorite = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            id.as_str(),
            entry.title,
            entry.body,
            entry.mood.code(),
            word_count(&entry.body),
            entry.writing_seconds,
            entry.favorite,
            entry.updated_at.unix_timestamp(),
        ],
    )?;
    if updated == 0 {
        return Err(GatewayError::missing(id));
    }
    replace_tags(&tx, id, &entry.tags)?;
    tx.commit()?;
    load_entry(conn, id)?.ok_or_else(|| GatewayError::missing(id))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    Ok(JournalEntry {
        id: RecordId::from(row.get::<_, String>(0)?),
        title: row.get(1)?,
        body: row.get(2)?,
        tags: Tags::new(),
        mood: Mood::from_code(row.get(3)?).unwrap_or_default(),
        word_count: row.get(4)?,
        writing_seconds: row.get(5)?,
        favorite: row.get::<_, i64>(6)? != 0,
        created_at: timestamp(row.get(7)?),
        updated_at: timestamp(row.get(8)?),
    })
}

fn attach_tags(conn: &Connection, entries: &mut [JournalEntry]) -> GatewayResult<()> {
    for entry in entries {
        entry.tags = load_tags(conn, &entry.id)?;
    }
    Ok(())
}

fn load_tags(conn: &Connection, id: &RecordId) -> GatewayResult<Tags> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.name
         FROM entry_tags et
         INNER JOIN tags t ON t.id = et.tag_id
         WHERE et.entry_id = ?1
         ORDER BY et.position",
    )?;
    let names = stmt
        .query_map(params![id.as_str()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(normalize_tags(names))
}

fn replace_tags(conn: &Connection, id: &RecordId, tags: &Tags) -> GatewayResult<()> {
    conn.execute(
        "DELETE FROM entry_tags WHERE entry_id = ?1",
        params![id.as_str()],
    )?;
    for (position, tag) in tags.iter().enumerate() {
        let tag_id = match conn
            .query_row("SELECT id FROM tags WHERE name = ?1", params![tag], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?
        {
            Some(tag_id) => tag_id,
            None => {
                conn.execute("INSERT INTO tags (name) VALUES (?1)", params![tag])?;
                conn.last_insert_rowid()
            }
        };
        conn.execute(
            "INSERT OR IGNORE INTO entry_tags (entry_id, tag_id, position) VALUES (?1, ?2, ?3)",
            params![id.as_str(), tag_id, position as i64],
        )?;
    }
    Ok(())
}

fn fetch_letters(conn: &Connection, filter: &FilterParams) -> GatewayResult<Vec<Letter>> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    push_common_clauses("", filter, &mut clauses, &mut values);
    let sql = format!(
        "SELECT {LETTER_COLUMNS}
         FROM letters
         {where_clause}
         ORDER BY {order}",
        where_clause = where_clause(&clauses),
        order = order_clause("", filter.sort),
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut letters = stmt
        .query_map(params_from_iter(values), letter_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    letters.retain(|letter| letter.matches(filter));
    if let Some(limit) = filter.limit {
        letters.truncate(limit);
    }
    Ok(letters)
}

fn load_letter(conn: &Connection, id: &RecordId) -> GatewayResult<Option<Letter>> {
    let sql = format!("SELECT {LETTER_COLUMNS} FROM letters WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id.as_str()], letter_from_row)
        .optional()?)
}

fn insert_letter(conn: &mut Connection, letter: &Letter) -> GatewayResult<Letter> {
    let tx = conn.transaction()?;
    if row_exists(&tx, "letters", letter.id())? {
        return Err(GatewayError::rejected(ALREADY_EXISTS));
    }
    tx.execute(
        "INSERT INTO letters
            (id, body, mood, kind, status, target_date, opened_at, word_count, writing_seconds,
             favorite, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            letter.id.as_str(),
            letter.body,
            letter.mood.code(),
            letter.kind.to_string(),
            letter.status.to_string(),
            letter.target_date.unix_timestamp(),
            letter.opened_at.map(OffsetDateTime::unix_timestamp),
            word_count(&letter.body),
            letter.writing_seconds,
            letter.favorite,
            letter.created_at.unix_timestamp(),
            letter.updated_at.unix_timestamp(),
        ],
    )?;
    tx.commit()?;
    load_letter(conn, &letter.id)?
        .ok_or_else(|| GatewayError::Unexpected(format!("letter {} vanished after insert", letter.id)))
}

fn update_letter(conn: &mut Connection, id: &RecordId, letter: &Letter) -> GatewayResult<Letter> {
    let updated = conn.execute(
        "UPDATE letters
         SET body = ?2, mood = ?3, kind = ?4, status = ?5, target_date = ?6, opened_at = ?7,
             word_count = ?8, writing_seconds = ?9, favorite = ?10, updated_at = ?11
         WHERE id = ?1",
        params![
            id.as_str(),
            letter.body,
            letter.mood.code(),
            letter.kind.to_string(),
            letter.status.to_string(),
            letter.target_date.unix_timestamp(),
            letter.opened_at.map(OffsetDateTime::unix_timestamp),
            word_count(&letter.body),
            letter.writing_seconds,
            letter.favorite,
            letter.updated_at.unix_timestamp(),
        ],
    )?;
    if updated == 0 {
        return Err(GatewayError::missing(id));
    }
    load_letter(conn, id)?.ok_or_else(|| GatewayError::missing(id))
}

fn letter_from_row(row: &Row<'_>) -> rusqlite::Result<Letter> {
    let kind: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(Letter {
        id: RecordId::from(row.get::<_, String>(0)?),
        body: row.get(1)?,
        mood: Mood::from_code(row.get(2)?).unwrap_or_default(),
        kind: LetterKind::from_str(&kind).unwrap_or_default(),
        status: LetterStatus::from_str(&status).unwrap_or_default(),
        target_date: timestamp(row.get(5)?),
        opened_at: row.get::<_, Option<i64>>(6)?.map(timestamp),
        word_count: row.get(7)?,
        writing_seconds: row.get(8)?,
        favorite: row.get::<_, i64>(9)? != 0,
        created_at: timestamp(row.get(10)?),
        updated_at: timestamp(row.get(11)?),
    })
}

fn row_exists(conn: &Connection, table: &str, id: &RecordId) -> GatewayResult<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id.as_str()], |_row| Ok(()))
        .optional()?
        .is_some())
}

fn push_common_clauses(
    prefix: &str,
    filter: &FilterParams,
    clauses: &mut Vec<String>,
    values: &mut Vec<Value>,
) {
    if let Some(mood) = filter.mood {
        values.push(Value::Integer(i64::from(mood.code())));
        clauses.push(format!("{prefix}mood = ?{}", values.len()));
    }
    if let Some(favorite) = filter.favorite {
        values.push(Value::Integer(i64::from(favorite)));
        clauses.push(format!("{prefix}favorite = ?{}", values.len()));
    }
    if let Some(from) = filter.created.from {
        values.push(Value::Integer(from));
        clauses.push(format!("{prefix}created_at >= ?{}", values.len()));
    }
    if let Some(to) = filter.created.to {
        values.push(Value::Integer(to));
        clauses.push(format!("{prefix}created_at < ?{}", values.len()));
    }
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

fn order_clause(prefix: &str, sort: SortSpec) -> String {
    let column = match sort.field {
        SortField::Updated => format!("{prefix}updated_at"),
        SortField::Created => format!("{prefix}created_at"),
        // Letters have no title; fall back to creation order.
        SortField::Title if prefix.is_empty() => "created_at".to_string(),
        SortField::Title => format!("{prefix}title COLLATE NOCASE"),
    };
    let direction = match sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    format!("{column} {direction}, {prefix}rowid {direction}")
}

fn build_match_expression(terms: &[String]) -> Option<String> {
    let mut parts = Vec::new();
    for term in terms {
        let trimmed = term.trim();
        if trimmed.is_empty() {
            continue;
        }
        let escaped = trimmed.replace('"', "\"\"");
        if escaped.chars().all(|ch| ch.is_alphanumeric()) {
            parts.push(format!("{escaped}*"));
        } else {
            parts.push(format!("\"{escaped}\""));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

fn prioritize_title_matches(entries: Vec<JournalEntry>, tokens: &[String]) -> Vec<JournalEntry> {
    let (mut with_title, without_title): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| title_contains_any(entry.title.as_deref().unwrap_or_default(), tokens));
    with_title.extend(without_title);
    with_title
}

fn title_contains_any(title: &str, tokens: &[String]) -> bool {
    if tokens.is_empty() || title.is_empty() {
        return false;
    }
    let haystack = title.to_lowercase();
    tokens
        .iter()
        .any(|token| !token.is_empty() && haystack.contains(token.as_str()))
}

fn timestamp(seconds: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<SqliteGateway> {
    let db_path = &storage.database_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    if !existed {
        seed_first_run(&conn)?;
    }
    tracing::debug!(path = %db_path.display(), data_dir = %paths.data_dir.display(), "storage ready");
    Ok(SqliteGateway {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

fn seed_first_run(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM journal_entries LIMIT 1", [], |row| row.get(0))
        .optional()
        .context("checking for existing entries")?;
    if existing.is_some() {
        return Ok(());
    }

    tracing::info!("seeding first-run journal");
    let now = OffsetDateTime::now_utc();
    let welcome = "Welcome to your reading journal. Write about the books that move you, \
                   the places you read them, and how you felt turning the last page.";
    conn.execute(
        "INSERT INTO journal_entries
            (id, title, body, mood, word_count, writing_seconds, favorite, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, ?6)",
        params![
            RecordId::generate().as_str(),
            "Welcome to booknook",
            welcome,
            Mood::Healing.code(),
            word_count(welcome),
            now.unix_timestamp(),
        ],
    )
    .context("inserting seed entry")?;

    let letter = "Dear future me, I hope you finished the stack on the nightstand.";
    conn.execute(
        "INSERT INTO letters
            (id, body, mood, kind, status, target_date, opened_at, word_count, writing_seconds,
             favorite, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, 0, 0, ?8, ?8)",
        params![
            RecordId::generate().as_str(),
            letter,
            Mood::Joyful.code(),
            LetterKind::Future.to_string(),
            LetterStatus::Scheduled.to_string(),
            (now + Duration::days(7)).unix_timestamp(),
            word_count(letter),
            now.unix_timestamp(),
        ],
    )
    .context("inserting seed letter")?;
    Ok(())
}
