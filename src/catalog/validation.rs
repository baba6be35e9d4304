//! Validation for catalog entries.
//!
//! Every write to the store goes through `validate_entry` first; a failing
//! rule rejects the write and leaves the store untouched.

use super::models::MixEntry;
use std::fmt;

/// Artist name the analyzer emits when a file carries no artist tag.
/// Entries are not persisted until real metadata is known.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

pub const MAX_ID_LEN: usize = 100;
pub const MAX_TITLE_LEN: usize = 500;
pub const MAX_ARTIST_LEN: usize = 200;
pub const MAX_GENRE_LEN: usize = 100;

/// Seconds in 24 hours; no single mix runs longer than that.
pub const MAX_DURATION_SECONDS: i64 = 86_400;

/// Validation error types
#[derive(Debug, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField { field: &'static str },
    FieldTooLong { field: &'static str, max: usize },
    TitleEqualsId,
    ForbiddenArtist,
    DurationOutOfRange { value: i64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField { field } => {
                write!(f, "Field '{}' is required but was empty", field)
            }
            ValidationError::FieldTooLong { field, max } => {
                write!(f, "Field '{}' exceeds the maximum length of {}", field, max)
            }
            ValidationError::TitleEqualsId => {
                write!(f, "Title cannot be the same as the entry id")
            }
            ValidationError::ForbiddenArtist => {
                write!(f, "Artist cannot be '{}'", UNKNOWN_ARTIST)
            }
            ValidationError::DurationOutOfRange { value } => {
                write!(
                    f,
                    "Duration must be between 1 and {} seconds, got {}",
                    MAX_DURATION_SECONDS, value
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

fn check_field(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    if value.len() > max {
        return Err(ValidationError::FieldTooLong { field, max });
    }
    Ok(())
}

/// Validate a catalog entry before any write.
///
/// Checks run in a fixed order and stop at the first failure, so callers get
/// one message naming the offending field.
pub fn validate_entry(entry: &MixEntry) -> ValidationResult<()> {
    check_field("id", &entry.id, MAX_ID_LEN)?;
    check_field("title", &entry.title, MAX_TITLE_LEN)?;
    check_field("artist", &entry.artist, MAX_ARTIST_LEN)?;
    check_field("genre", &entry.genre, MAX_GENRE_LEN)?;

    if entry.title == entry.id {
        return Err(ValidationError::TitleEqualsId);
    }

    if entry.artist == UNKNOWN_ARTIST {
        return Err(ValidationError::ForbiddenArtist);
    }

    if entry.duration_seconds <= 0 || entry.duration_seconds > MAX_DURATION_SECONDS {
        return Err(ValidationError::DurationOutOfRange {
            value: entry.duration_seconds,
        });
    }

    Ok(())
}
