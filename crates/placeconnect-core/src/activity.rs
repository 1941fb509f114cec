use placeconnect_types::models::MAX_ACTIVITY;

/// Place activity counter, clamped to `0..=MAX_ACTIVITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ActivityLevel(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityTier {
    Quiet,
    Low,
    Moderate,
    Busy,
}

impl ActivityLevel {
    pub fn new(level: u8) -> Self {
        Self(level.min(MAX_ACTIVITY))
    }

    /// Level derived from how many messages a room currently holds.
    pub fn from_message_count(count: usize) -> Self {
        Self(count.min(MAX_ACTIVITY as usize) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn tier(self) -> ActivityTier {
        match self.0 {
            0 => ActivityTier::Quiet,
            1..=5 => ActivityTier::Low,
            6..=15 => ActivityTier::Moderate,
            _ => ActivityTier::Busy,
        }
    }
}

impl ActivityTier {
    pub fn label(self) -> &'static str {
        match self {
            Self::Quiet => "Quiet",
            Self::Low => "Low activity",
            Self::Moderate => "Moderate activity",
            Self::Busy => "Busy",
        }
    }
}
