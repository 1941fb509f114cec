use crate::Store;
use crate::models::FavoriteRow;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::warn;
use uuid::Uuid;

const GUEST_NAME_KEY: &str = "guest_username";

impl Store {
    // -- Guest identity --

    pub fn guest_name(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let name = conn
                .query_row("SELECT value FROM settings WHERE key = ?1", [GUEST_NAME_KEY], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok(name.filter(|n| !n.is_empty()))
        })
    }

    pub fn set_guest_name(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (GUEST_NAME_KEY, name),
            )?;
            Ok(())
        })
    }

    pub fn clear_guest_name(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM settings WHERE key = ?1", [GUEST_NAME_KEY])?;
            Ok(())
        })
    }

    // -- Favorites --

    /// Returns true if the place was not already a favourite.
    pub fn add_favorite(&self, place_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO favorites (place_id) VALUES (?1)",
                [place_id.to_string()],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns true if the place was a favourite.
    pub fn remove_favorite(&self, place_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed =
                conn.execute("DELETE FROM favorites WHERE place_id = ?1", [place_id.to_string()])?;
            Ok(removed > 0)
        })
    }

    /// Flip the favourite flag, returning the new state.
    pub fn toggle_favorite(&self, place_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let id = place_id.to_string();
            let removed = conn.execute("DELETE FROM favorites WHERE place_id = ?1", [&id])?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute("INSERT INTO favorites (place_id) VALUES (?1)", [&id])?;
            Ok(true)
        })
    }

    pub fn is_favorite(&self, place_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM favorites WHERE place_id = ?1",
                    [place_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Favourite place ids, oldest first.
    pub fn favorites(&self) -> Result<Vec<Uuid>> {
        let rows = self.with_conn(query_favorites)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.place_id.parse::<Uuid>() {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Skipping corrupt favourite '{}' (added {}): {}", row.place_id, row.added_at, e);
                    None
                }
            })
            .collect())
    }
}

fn query_favorites(conn: &Connection) -> Result<Vec<FavoriteRow>> {
    let mut stmt =
        conn.prepare("SELECT place_id, added_at FROM favorites ORDER BY added_at, rowid")?;

    let rows = stmt
        .query_map([], |row| {
            Ok(FavoriteRow {
                place_id: row.get(0)?,
                added_at: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_name_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.guest_name().unwrap(), None);
        store.set_guest_name("nino").unwrap();
        store.set_guest_name("nino_g").unwrap();
        assert_eq!(store.guest_name().unwrap().as_deref(), Some("nino_g"));
        store.clear_guest_name().unwrap();
        assert_eq!(store.guest_name().unwrap(), None);
    }

    #[test]
    fn favorites_keep_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert!(store.add_favorite(b).unwrap());
        assert!(store.add_favorite(a).unwrap());
        assert!(!store.add_favorite(a).unwrap());
        assert_eq!(store.favorites().unwrap(), vec![b, a]);
    }

    #[test]
    fn toggle_flips() {
        let store = Store::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        assert!(store.toggle_favorite(id).unwrap());
        assert!(store.is_favorite(id).unwrap());
        assert!(!store.toggle_favorite(id).unwrap());
        assert!(!store.is_favorite(id).unwrap());
        assert!(!store.remove_favorite(id).unwrap());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!("placeconnect_store_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("local.db");
        let id = Uuid::new_v4();
        {
            let store = Store::open(&path).unwrap();
            store.add_favorite(id).unwrap();
            store.set_guest_name("ana").unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.favorites().unwrap(), vec![id]);
        assert_eq!(store.guest_name().unwrap().as_deref(), Some("ana"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
