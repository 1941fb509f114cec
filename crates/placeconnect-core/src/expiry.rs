use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use placeconnect_types::models::Place;
use tracing::debug;
use uuid::Uuid;

use crate::error::ValidationError;

/// How often the live collection is re-checked for expired places.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A place with `is_temporary` but no `expires_at` never expires.
pub fn is_expired(place: &Place, now: DateTime<Utc>) -> bool {
    place.is_temporary && place.expires_at.is_some_and(|at| at <= now)
}

/// Drop expired places, returning the ids that were removed.
///
/// Display-only: the rows stay in the backend.
pub fn retain_live(places: &mut Vec<Place>, now: DateTime<Utc>) -> Vec<Uuid> {
    let mut removed = Vec::new();
    places.retain(|p| {
        if is_expired(p, now) {
            removed.push(p.id);
            false
        } else {
            true
        }
    });
    if !removed.is_empty() {
        debug!("Expired {} temporary places", removed.len());
    }
    removed
}

/// Lifetime picked when creating a temporary place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryChoice {
    Hours(u32),
    /// 23:59:59 of the current local day
    Tonight,
    Custom(DateTime<Utc>),
}

impl ExpiryChoice {
    pub const ONE_HOUR: Self = Self::Hours(1);
    pub const TWO_HOURS: Self = Self::Hours(2);
    pub const FOUR_HOURS: Self = Self::Hours(4);

    /// Absolute expiry relative to `now`, in the caller's time zone.
    pub fn resolve<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<DateTime<Utc>, ValidationError> {
        let now_utc = now.with_timezone(&Utc);
        let at = match *self {
            Self::Hours(hours) => now_utc
                .checked_add_signed(chrono::Duration::hours(i64::from(hours)))
                .ok_or(ValidationError::EndTimeOutOfRange)?,
            Self::Tonight => {
                let end_of_day = now
                    .date_naive()
                    .and_hms_opt(23, 59, 59)
                    .ok_or(ValidationError::EndTimeInPast)?;
                now.timezone()
                    .from_local_datetime(&end_of_day)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| end_of_day.and_utc())
            }
            Self::Custom(at) => at,
        };

        if at <= now_utc {
            return Err(ValidationError::EndTimeInPast);
        }
        Ok(at)
    }
}
