use sqlx::SqliteConnection;

use crate::error::AppError;

const NUMBER_WIDTH: usize = 5;

/// Counters backing the human-readable entity numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Trip,
    Job,
}

impl Sequence {
    pub fn tag(&self) -> &'static str {
        match self {
            Sequence::Trip => "TRIP",
            Sequence::Job => "JOB",
        }
    }
}

pub fn format_number(sequence: Sequence, value: i64) -> String {
    format!("{}-{:0width$}", sequence.tag(), value, width = NUMBER_WIDTH)
}

pub fn parse_number(sequence: Sequence, number: &str) -> Option<i64> {
    let (tag, digits) = number.split_once('-')?;
    if tag != sequence.tag() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Bumps the counter and returns the formatted number. The increment is a
/// single statement, so callers racing on the same sequence each get their own
/// value. Run it as the first write of the inserting transaction so a rollback
/// also returns the number.
pub async fn next_number(
    conn: &mut SqliteConnection,
    sequence: Sequence,
) -> Result<String, AppError> {
    let value: i64 =
        sqlx::query_scalar("UPDATE sequences SET value = value + 1 WHERE name = ? RETURNING value")
            .bind(sequence.tag())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::Config(format!("missing sequence {}", sequence.tag())))?;
    Ok(format_number(sequence, value))
}
