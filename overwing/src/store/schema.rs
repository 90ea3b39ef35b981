//! Embedded schema.
//!
//! `CREATE TABLE IF NOT EXISTS` statements run on every open so the store is
//! usable against a fresh file or `sqlite::memory:` without an external
//! migration step.

pub(crate) const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS poi (
        qid TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        altitude_m REAL,
        category TEXT NOT NULL DEFAULT '',
        subcategory TEXT,
        dimension_multiplier REAL NOT NULL DEFAULT 1.0,
        sitelinks INTEGER NOT NULL DEFAULT 0,
        article_len INTEGER NOT NULL DEFAULT 0,
        source TEXT NOT NULL DEFAULT 'wikidata',
        size TEXT,
        created_at TEXT NOT NULL,
        last_played TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_poi_last_played ON poi(last_played)",
    "CREATE INDEX IF NOT EXISTS idx_poi_lat_lon ON poi(lat, lon)",
    "CREATE TABLE IF NOT EXISTS msfs_poi (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        category TEXT NOT NULL DEFAULT ''
    )",
    "CREATE INDEX IF NOT EXISTS idx_msfs_poi_lat_lon ON msfs_poi(lat, lon)",
    "CREATE TABLE IF NOT EXISTS wikidata_hierarchy (
        qid TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT '',
        parents TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wikipedia_articles (
        id TEXT PRIMARY KEY,
        names TEXT NOT NULL DEFAULT '{}',
        lengths TEXT NOT NULL DEFAULT '{}',
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS seen_entities (
        qid TEXT NOT NULL,
        instance TEXT NOT NULL,
        PRIMARY KEY (qid, instance)
    )",
    "CREATE TABLE IF NOT EXISTS cache (
        key TEXT PRIMARY KEY,
        data BLOB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cache_geodata (
        key TEXT PRIMARY KEY,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        radius_m REAL NOT NULL,
        data BLOB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_cache_geodata_lat_lon ON cache_geodata(lat, lon)",
    "CREATE TABLE IF NOT EXISTS persistent_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];
