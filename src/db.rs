use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("fanboard.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Split out so unit tests can run against an in-memory connection.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Draft store: one JSON-array payload per logical namespace, mirroring the
    // frontend's two draft keys. Filtering by content type / sub key happens at
    // read-modify-write time, not in the schema.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS draft_store(
            namespace TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )",
        [],
    )?;

    // Session handoff: plain string pairs written by the selection screen and
    // consumed once at session start.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS handoff(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Pairwise vote counts, keyed by the alphabetically-sorted option pair.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS vote_pairs(
            first_option TEXT NOT NULL,
            second_option TEXT NOT NULL,
            first_count INTEGER NOT NULL DEFAULT 0,
            second_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(first_option, second_option)
        )",
        [],
    )?;

    Ok(())
}
