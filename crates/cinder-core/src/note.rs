//! Note identifier and lifetime.

use std::{fmt, str::FromStr, time::Duration};

use uuid::{Builder, Uuid};

use crate::{CoreError, env::Environment};

/// Length of `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
const HYPHENATED_LEN: usize = 36;

/// Bearer identifier of a stored note.
///
/// A version 4 UUID built from 16 bytes of environment randomness (122 random
/// bits). Anyone holding the id may read the note once, so `Debug` only shows
/// a prefix; `Display` gives the full hyphenated form for share links.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Generate a fresh identifier.
    pub fn generate(env: &impl Environment) -> Self {
        let mut bytes = [0u8; 16];
        env.random_bytes(&mut bytes);
        Self(Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Parse the hyphenated text form. Simple, braced and URN spellings are
    /// rejected so every note has exactly one link.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let text = text.trim();
        if text.len() != HYPHENATED_LEN {
            return Err(CoreError::InvalidNoteId);
        }
        Uuid::try_parse(text).map(Self).map_err(|_| CoreError::InvalidNoteId)
    }

    /// Rebuild from storage key bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Storage key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.simple().to_string();
        write!(f, "NoteId({}..)", &text[..8])
    }
}

impl FromStr for NoteId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validated note lifetime in `(0, 72h]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl(Duration);

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

impl Ttl {
    /// Longest lifetime a note may have.
    pub const MAX: Duration = Duration::from_secs(3 * DAY);

    /// One hour.
    pub const ONE_HOUR: Self = Self(Duration::from_secs(HOUR));
    /// Three hours.
    pub const THREE_HOURS: Self = Self(Duration::from_secs(3 * HOUR));
    /// One day.
    pub const ONE_DAY: Self = Self(Duration::from_secs(DAY));
    /// Three days, the maximum.
    pub const THREE_DAYS: Self = Self(Self::MAX);

    /// Lifetimes offered to note creators.
    pub const PRESETS: [Self; 4] =
        [Self::ONE_HOUR, Self::THREE_HOURS, Self::ONE_DAY, Self::THREE_DAYS];

    /// Validate a duration. Sub-second precision is dropped.
    pub fn new(duration: Duration) -> Result<Self, CoreError> {
        let duration = Duration::from_secs(duration.as_secs());
        if duration.is_zero() {
            return Err(CoreError::InvalidTtl(format!("{duration:?}")));
        }
        if duration > Self::MAX {
            return Err(CoreError::TtlTooLong { requested: duration, max: Self::MAX });
        }
        Ok(Self(duration))
    }

    /// Parse unit text such as `5m`, `1h`, `24h`, `1h30m` or `3d`.
    ///
    /// Units are `s`, `m`, `h`, `d`, `w`. Components may repeat in any order
    /// and are summed. A well-formed lifetime above [`Self::MAX`] (such as
    /// `1w`) is `TtlTooLong`, not `InvalidTtl`.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidTtl(text.to_string());
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut total: u64 = 0;
        let mut digits = String::new();
        for ch in trimmed.chars() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                continue;
            }

            let unit = match ch {
                's' => 1,
                'm' => MINUTE,
                'h' => HOUR,
                'd' => DAY,
                'w' => WEEK,
                _ => return Err(invalid()),
            };
            let value: u64 = digits.parse().map_err(|_| invalid())?;
            digits.clear();

            total = value
                .checked_mul(unit)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(invalid)?;
        }

        if !digits.is_empty() {
            return Err(invalid());
        }

        Self::new(Duration::from_secs(total))
    }

    /// Lifetime as a duration.
    pub fn as_duration(self) -> Duration {
        self.0
    }

    /// Lifetime in seconds.
    pub fn as_secs(self) -> u64 {
        self.0.as_secs()
    }

    /// Wall-clock second at which a note created at `now_secs` expires.
    pub fn expires_at(self, now_secs: u64) -> u64 {
        now_secs.saturating_add(self.as_secs())
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::ONE_HOUR
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.as_secs();
        for (unit, suffix) in [(DAY, 'd'), (HOUR, 'h'), (MINUTE, 'm'), (1, 's')] {
            if rest >= unit {
                write!(f, "{}{suffix}", rest / unit)?;
                rest %= unit;
            }
        }
        Ok(())
    }
}

impl FromStr for Ttl {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[derive(Clone)]
    struct FixedEnv([u8; 16]);

    impl Environment for FixedEnv {
        type Instant = Duration;

        fn now(&self) -> Self::Instant {
            Duration::ZERO
        }

        fn wall_clock_secs(&self) -> u64 {
            0
        }

        async fn sleep(&self, _duration: Duration) {}

        fn random_bytes(&self, buffer: &mut [u8]) {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = self.0[i % 16];
            }
        }
    }

    #[test]
    fn generated_id_is_v4() {
        let id = NoteId::generate(&FixedEnv([0xFF; 16]));
        let text = id.to_string();

        assert_eq!(text.len(), 36);
        assert_eq!(&text[14..15], "4");
        assert_eq!(NoteId::parse(&text).unwrap(), id);
    }

    #[test]
    fn debug_hides_most_of_the_id() {
        let id = NoteId::generate(&FixedEnv([0xAB; 16]));
        let debug = format!("{id:?}");
        assert!(!debug.contains(&id.to_string()));
        assert!(debug.starts_with("NoteId(abababab"));
    }

    #[test]
    fn garbage_id_is_rejected() {
        assert_eq!(NoteId::parse("../etc/passwd"), Err(CoreError::InvalidNoteId));
        assert_eq!(NoteId::parse(""), Err(CoreError::InvalidNoteId));
    }

    #[test]
    fn only_hyphenated_ids_parse() {
        let id = NoteId::generate(&FixedEnv([0x5A; 16]));
        let hyphenated = id.to_string();
        let simple = hyphenated.replace('-', "");

        assert_eq!(NoteId::parse(&format!(" {hyphenated} ")).unwrap(), id);
        for other in [simple.clone(), format!("{{{hyphenated}}}"), format!("urn:uuid:{hyphenated}")] {
            assert_eq!(NoteId::parse(&other), Err(CoreError::InvalidNoteId), "{other}");
        }
    }

    #[test]
    fn presets_parse() {
        assert_eq!(Ttl::parse("1h").unwrap(), Ttl::ONE_HOUR);
        assert_eq!(Ttl::parse("3h").unwrap(), Ttl::THREE_HOURS);
        assert_eq!(Ttl::parse("24h").unwrap(), Ttl::ONE_DAY);
        assert_eq!(Ttl::parse("1d").unwrap(), Ttl::ONE_DAY);
        assert_eq!(Ttl::parse("72h").unwrap(), Ttl::THREE_DAYS);
        assert_eq!(Ttl::parse("5m").unwrap().as_secs(), 300);
        assert_eq!(Ttl::parse("1h30m").unwrap().as_secs(), 5400);
    }

    #[test]
    fn too_long_is_rejected() {
        assert!(matches!(Ttl::parse("1w"), Err(CoreError::TtlTooLong { .. })));
        assert!(matches!(Ttl::parse("7d"), Err(CoreError::TtlTooLong { .. })));
        assert!(matches!(Ttl::parse("72h1s"), Err(CoreError::TtlTooLong { .. })));
    }

    #[test]
    fn malformed_is_rejected() {
        for text in ["", "h", "1", "0h", "-1h", "1.5h", "1 h", "99999999999999999999h"] {
            assert!(Ttl::parse(text).is_err(), "{text:?} should be rejected");
        }
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(Ttl::ONE_DAY.to_string(), "1d");
        assert_eq!(Ttl::parse("90m").unwrap().to_string(), "1h30m");
        assert_eq!(Ttl::parse("45s").unwrap().to_string(), "45s");
    }

    #[test]
    fn expiry_saturates() {
        assert_eq!(Ttl::ONE_HOUR.expires_at(1_000), 1_000 + 3_600);
        assert_eq!(Ttl::ONE_HOUR.expires_at(u64::MAX), u64::MAX);
    }

    proptest! {
        #[test]
        fn display_parses_back(secs in 1u64..=Ttl::MAX.as_secs()) {
            let ttl = Ttl::new(Duration::from_secs(secs)).unwrap();
            prop_assert_eq!(Ttl::parse(&ttl.to_string()).unwrap(), ttl);
        }
    }
}
