//! Database schema and migrations for feedrelay.
//!
//! Migrations are applied in order when the database is opened; the
//! schema_version table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Source catalog
    r#"
CREATE TABLE sources (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    feed_url    TEXT NOT NULL UNIQUE,
    priority    INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_sources_priority ON sources(priority);
"#,
    // v2: Article store, deduplicated by link
    r#"
CREATE TABLE articles (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id     INTEGER NOT NULL REFERENCES sources(id),
    title         TEXT NOT NULL,
    link          TEXT NOT NULL UNIQUE,
    categories    TEXT NOT NULL DEFAULT '[]',  -- JSON array
    published_at  TEXT NOT NULL,
    posted_at     TEXT,                        -- NULL until selected by a notify cycle
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_articles_source_id ON articles(source_id);
CREATE INDEX idx_articles_posted_at ON articles(posted_at);
"#,
    // v3: Subscriber directory
    r#"
CREATE TABLE subscribers (
    chat_id     INTEGER PRIMARY KEY,
    name        TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE subscriptions (
    subscriber_id  INTEGER NOT NULL REFERENCES subscribers(chat_id) ON DELETE CASCADE,
    source_id      INTEGER NOT NULL REFERENCES sources(id),
    created_at     TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (subscriber_id, source_id)
);

CREATE INDEX idx_subscriptions_source_id ON subscriptions(source_id);
"#,
];
