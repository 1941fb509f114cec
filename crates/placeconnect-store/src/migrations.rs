use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS settings (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS favorites (
            place_id    TEXT PRIMARY KEY,
            added_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Local store migrations complete");
    Ok(())
}
