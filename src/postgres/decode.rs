//! Column decoders for types without a Rust counterpart in the driver.

use std::error::Error;
use std::fmt;

use tokio_postgres::types::{FromSql, Type};

type DecodeError = Box<dyn Error + Sync + Send>;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// A postgres `interval`, kept in its three wire fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgInterval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let (micros, rest) = raw
            .split_first_chunk::<8>()
            .ok_or("interval value too short")?;
        let (days, rest) = rest.split_first_chunk::<4>().ok_or("interval value too short")?;
        let months: [u8; 4] = rest.try_into().map_err(|_| "interval value has wrong length")?;
        Ok(PgInterval {
            months: i32::from_be_bytes(months),
            days: i32::from_be_bytes(*days),
            microseconds: i64::from_be_bytes(*micros),
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

/// Renders like postgres' default `IntervalStyle`, e.g. `1 year 2 mons 3 days 04:05:06`.
impl fmt::Display for PgInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let (years, months) = (self.months / 12, self.months % 12);
        for (n, unit) in [(years, "year"), (months, "mon"), (self.days, "day")] {
            if n != 0 {
                let plural = if n.abs() == 1 { "" } else { "s" };
                parts.push(format!("{n} {unit}{plural}"));
            }
        }

        if self.microseconds != 0 || parts.is_empty() {
            let sign = if self.microseconds < 0 { "-" } else { "" };
            let total = self.microseconds.unsigned_abs();
            let secs = total / MICROS_PER_SECOND;
            let frac = total % MICROS_PER_SECOND;
            let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
            let mut clock = format!("{sign}{hours:02}:{minutes:02}:{seconds:02}");
            if frac != 0 {
                let digits = format!("{frac:06}");
                clock.push('.');
                clock.push_str(digits.trim_end_matches('0'));
            }
            parts.push(clock);
        }
        f.write_str(&parts.join(" "))
    }
}

/// Undecoded column bytes, for types nothing else accepts.
pub(crate) struct RawValue(pub(crate) Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(RawValue(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
