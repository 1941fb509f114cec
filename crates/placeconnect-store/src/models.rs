//! Row types of the local store.

pub struct FavoriteRow {
    pub place_id: String,
    pub added_at: String,
}
