use thiserror::Error;
use time::{Date, Duration, Month, OffsetDateTime};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
}

/// A relative period such as `-1m` or `2w`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Period {
    pub amount: i64,
    pub unit: PeriodUnit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DateRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PeriodError {
    #[error("period is empty")]
    Empty,
    #[error("invalid period {0:?} (expected e.g. -1m, 2w, -10d)")]
    Invalid(String),
    #[error("unknown period unit {0:?} (use d, w or m)")]
    UnknownUnit(char),
    #[error("period {0:?} is out of range")]
    OutOfRange(String),
}

impl Period {
    pub fn parse(expression: &str) -> Result<Self, PeriodError> {
        let text = expression.trim();
        if text.is_empty() {
            return Err(PeriodError::Empty);
        }

        let invalid = || PeriodError::Invalid(text.to_string());
        let (negative, rest) = match text.as_bytes()[0] {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };

        let digits_len = rest.chars().take_while(char::is_ascii_digit).count();
        if digits_len == 0 {
            return Err(invalid());
        }
        let (digits, unit_text) = rest.split_at(digits_len);

        let mut unit_chars = unit_text.chars();
        let unit = match (unit_chars.next(), unit_chars.next()) {
            (Some('d'), None) => PeriodUnit::Day,
            (Some('w'), None) => PeriodUnit::Week,
            (Some('m'), None) => PeriodUnit::Month,
            (Some(other), None) if other.is_alphabetic() => {
                return Err(PeriodError::UnknownUnit(other));
            }
            _ => return Err(invalid()),
        };

        let magnitude: i64 = digits
            .parse()
            .map_err(|_| PeriodError::OutOfRange(text.to_string()))?;
        let amount = if negative { -magnitude } else { magnitude };
        Ok(Self { amount, unit })
    }

    /// The other endpoint of the range anchored at `anchor`.
    pub fn shift(self, anchor: OffsetDateTime) -> Option<OffsetDateTime> {
        match self.unit {
            PeriodUnit::Day => anchor.checked_add(Duration::days(self.amount)),
            PeriodUnit::Week => {
                let days = self.amount.checked_mul(7)?;
                anchor.checked_add(Duration::days(days))
            }
            PeriodUnit::Month => {
                let date = add_months(anchor.date(), self.amount)?;
                Some(anchor.replace_date(date))
            }
        }
    }
}

/// Resolves `expression` against `anchor`. The result is ordered so that
/// `start <= end` whichever direction the period points.
pub fn resolve_period(expression: &str, anchor: OffsetDateTime) -> Result<DateRange, PeriodError> {
    let period = Period::parse(expression)?;
    let other = period
        .shift(anchor)
        .ok_or_else(|| PeriodError::OutOfRange(expression.trim().to_string()))?;
    Ok(DateRange {
        start: other.min(anchor),
        end: other.max(anchor),
    })
}

/// Calendar month arithmetic without clamping: the day of month is carried
/// from the first of the target month, so Jan 31 + 1 month lands in March.
fn add_months(date: Date, months: i64) -> Option<Date> {
    let zero_based = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1;
    let target = zero_based.checked_add(months)?;
    let year = i32::try_from(target.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(target.rem_euclid(12) + 1).ok()?).ok()?;
    let first = Date::from_calendar_date(year, month, 1).ok()?;
    first.checked_add(Duration::days(i64::from(date.day()) - 1))
}
