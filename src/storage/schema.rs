use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS journal_entries (
            id TEXT PRIMARY KEY,
            title TEXT,
            body TEXT NOT NULL,
            mood INTEGER NOT NULL,
            word_count INTEGER NOT NULL DEFAULT 0,
            writing_seconds INTEGER NOT NULL DEFAULT 0,
            favorite INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS entry_tags (
            entry_id TEXT NOT NULL,
            tag_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (entry_id, tag_id),
            FOREIGN KEY (entry_id) REFERENCES journal_entries(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS letters (
            id TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            mood INTEGER NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            target_date INTEGER NOT NULL,
            opened_at INTEGER,
            word_count INTEGER NOT NULL DEFAULT 0,
            writing_seconds INTEGER NOT NULL DEFAULT 0,
            favorite INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS journal_entries_created ON journal_entries(created_at);
        CREATE INDEX IF NOT EXISTS letters_target_date ON letters(target_date);

        CREATE VIRTUAL TABLE IF NOT EXISTS fts_entries USING fts5(
            title,
            body,
            content='journal_entries',
            content_rowid='rowid',
            tokenize='unicode61'
        );

        CREATE TRIGGER IF NOT EXISTS journal_entries_ai AFTER INSERT ON journal_entries BEGIN
            INSERT INTO fts_entries(rowid, title, body)
            VALUES (new.rowid, COALESCE(new.title, ''), new.body);
        END;

        CREATE TRIGGER IF NOT EXISTS journal_entries_ad AFTER DELETE ON journal_entries BEGIN
            INSERT INTO fts_entries(fts_entries, rowid, title, body)
            VALUES ('delete', old.rowid, COALESCE(old.title, ''), old.body);
        END;

        CREATE TRIGGER IF NOT EXISTS journal_entries_au AFTER UPDATE OF title, body ON journal_entries BEGIN
            INSERT INTO fts_entries(fts_entries, rowid, title, body)
            VALUES ('delete', old.rowid, COALESCE(old.title, ''), old.body);
            INSERT INTO fts_entries(rowid, title, body)
            VALUES (new.rowid, COALESCE(new.title, ''), new.body);
        END;
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
