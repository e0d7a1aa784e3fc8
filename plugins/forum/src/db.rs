use crate::error::Result;
use crate::settings::{self, Setting};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open a single connection, enable foreign keys and run migrations.
///
/// `":memory:"` gives a private in-memory database, which is what the tests use.
pub fn init_db<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(PRAGMAS)?;
    conn.execute_batch(SCHEMA)?;
    settings::ensure_defaults(&conn, &Setting::default())?;
    Ok(conn)
}

/// Build a connection pool over a database file and make sure the schema and
/// the settings row exist.
pub fn open_pool<P: AsRef<Path>>(path: P, max_size: u32, defaults: &Setting) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path.as_ref())
        .with_init(|c| c.execute_batch(&format!("{PRAGMAS}{FILE_PRAGMAS}")));
    let pool = Pool::builder().max_size(max_size).build(manager)?;
    migrate(&pool, defaults)?;
    Ok(pool)
}

/// Single-connection in-memory pool. Every pooled connection to `:memory:`
/// would be its own database, so the pool is pinned to one connection.
pub fn memory_pool(defaults: &Setting) -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(|c| c.execute_batch(PRAGMAS));
    let pool = Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)?;
    migrate(&pool, defaults)?;
    Ok(pool)
}

/// Start a write transaction holding the write lock from its first statement.
/// Concurrent writers queue on the busy timeout instead of failing a lock
/// upgrade with `SQLITE_BUSY`.
pub fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

fn migrate(pool: &DbPool, defaults: &Setting) -> Result<()> {
    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;
    settings::ensure_defaults(&conn, defaults)?;
    Ok(())
}

const PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

const FILE_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;";

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  messages_per_page INTEGER NOT NULL,
  topics_per_page INTEGER NOT NULL,
  user_signature_length INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT UNIQUE NOT NULL,
  slug TEXT UNIQUE NOT NULL,
  is_collapsible INTEGER NOT NULL DEFAULT 0,
  sort_order INTEGER NOT NULL DEFAULT 999999
);

CREATE TABLE IF NOT EXISTS boards (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  parent_board_id INTEGER REFERENCES boards(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  slug TEXT UNIQUE NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  webhook TEXT,
  use_webhook_for_replies INTEGER NOT NULL DEFAULT 0,
  is_announcement_board INTEGER NOT NULL DEFAULT 0,
  sort_order INTEGER NOT NULL DEFAULT 999999,
  first_message_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
  last_message_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
  UNIQUE(category_id, name)
);
CREATE INDEX IF NOT EXISTS boards_parent ON boards(parent_board_id);

CREATE TABLE IF NOT EXISTS board_groups (
  board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
  group_id INTEGER NOT NULL,
  PRIMARY KEY (board_id, group_id)
);

CREATE TABLE IF NOT EXISTS board_announcement_groups (
  board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
  group_id INTEGER NOT NULL,
  PRIMARY KEY (board_id, group_id)
);

CREATE TABLE IF NOT EXISTS topics (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
  subject TEXT NOT NULL,
  subject_key TEXT NOT NULL,
  slug TEXT UNIQUE NOT NULL,
  is_sticky INTEGER NOT NULL DEFAULT 0,
  is_locked INTEGER NOT NULL DEFAULT 0,
  first_message_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
  last_message_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
  UNIQUE(board_id, subject_key)
);

CREATE TABLE IF NOT EXISTS messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
  time_posted INTEGER NOT NULL,
  time_modified INTEGER NOT NULL,
  user_created INTEGER,
  user_updated INTEGER,
  body TEXT NOT NULL,
  body_plaintext TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS messages_topic_time ON messages(topic_id, time_posted, id);

CREATE TABLE IF NOT EXISTS last_message_seen (
  topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
  user_id INTEGER NOT NULL,
  message_time INTEGER NOT NULL,
  PRIMARY KEY (topic_id, user_id)
);
CREATE INDEX IF NOT EXISTS last_message_seen_user ON last_message_seen(user_id, topic_id, message_time);

CREATE TABLE IF NOT EXISTS personal_messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  sender_id INTEGER NOT NULL,
  recipient_id INTEGER NOT NULL,
  time_sent INTEGER NOT NULL,
  subject TEXT NOT NULL,
  body TEXT NOT NULL,
  message_head_id INTEGER REFERENCES personal_messages(id) ON DELETE SET NULL,
  is_read INTEGER NOT NULL DEFAULT 0,
  deleted_by_sender INTEGER NOT NULL DEFAULT 0,
  deleted_by_recipient INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS personal_messages_recipient ON personal_messages(recipient_id, deleted_by_recipient);
CREATE INDEX IF NOT EXISTS personal_messages_sender ON personal_messages(sender_id, deleted_by_sender);

CREATE TABLE IF NOT EXISTS user_profiles (
  user_id INTEGER PRIMARY KEY,
  signature TEXT NOT NULL DEFAULT '',
  website_title TEXT NOT NULL DEFAULT '',
  website_url TEXT NOT NULL DEFAULT '',
  notify_on_personal_message INTEGER NOT NULL DEFAULT 0
);
"#;
