//! Literal parsing for staged field text.
//!
//! The accepted forms are pinned by the session prologue that precedes every
//! unload (see [`crate::export::unload::session_prologue`]). Changing an output
//! format there requires the matching change here.
//!
//! The functions return simple `Result<T, String>` so callers can wrap errors
//! with row and column context.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Date format produced by `DATE_OUTPUT_FORMAT = 'YYYY-MM-DD'`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time format produced by `TIME_OUTPUT_FORMAT = 'HH24:MI:SS.FF6'`.
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Timestamp format produced by `TIMESTAMP_NTZ_OUTPUT_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF6'`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Timestamp format produced by `TIMESTAMP_[LT]TZ_OUTPUT_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF6 TZHTZM'`.
pub const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Parses a boolean literal.
pub fn parse_boolean(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err(format!("Invalid boolean value: {value}")),
    }
}

/// Parses a 64-bit integer literal.
pub fn parse_int64(value: &str) -> Result<i64, String> {
    value
        .parse::<i64>()
        .map_err(|e| format!("Invalid integer value '{value}': {e}"))
}

/// Parses a floating point literal, including the remote engine's spellings of
/// infinity and NaN.
pub fn parse_float64(value: &str) -> Result<f64, String> {
    match value {
        "inf" | "Infinity" | "INF" => Ok(f64::INFINITY),
        "-inf" | "-Infinity" | "-INF" => Ok(f64::NEG_INFINITY),
        "NaN" | "nan" => Ok(f64::NAN),
        _ => value
            .parse::<f64>()
            .map_err(|e| format!("Invalid float value '{value}': {e}")),
    }
}

/// Parses a decimal string to an unscaled i128 with the given precision and scale.
///
/// Supports `123`, `123.45`, `-123.45`, `-0.5` and `.5`. Values with more
/// fractional digits than `scale`, or more total digits than `precision`, are
/// rejected rather than rounded.
pub fn parse_decimal_to_i128(value_str: &str, precision: u8, scale: i8) -> Result<i128, String> {
    let (negative, digits) = match value_str.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value_str.strip_prefix('+').unwrap_or(value_str)),
    };

    let (integer_part, decimal_part) = match digits.split_once('.') {
        Some((i, d)) => (i, d),
        None => (digits, ""),
    };

    if (integer_part.is_empty() && decimal_part.is_empty())
        || !integer_part.bytes().all(|b| b.is_ascii_digit())
        || !decimal_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(format!("Invalid decimal format: {value_str}"));
    }

    let scale_digits = scale.max(0) as usize;
    let decimal_part = decimal_part.trim_end_matches('0');
    if decimal_part.len() > scale_digits {
        return Err(format!(
            "Decimal value {value_str} has more than {scale} fractional digits"
        ));
    }

    let integer_part = integer_part.trim_start_matches('0');
    if integer_part.len() + scale_digits > precision as usize {
        return Err(format!(
            "Decimal value {value_str} exceeds precision {precision}"
        ));
    }

    let mut unscaled_text = String::with_capacity(integer_part.len() + scale_digits);
    unscaled_text.push_str(integer_part);
    unscaled_text.push_str(decimal_part);
    for _ in decimal_part.len()..scale_digits {
        unscaled_text.push('0');
    }

    let magnitude: i128 = if unscaled_text.is_empty() {
        0
    } else {
        unscaled_text
            .parse()
            .map_err(|_| format!("Numeric overflow for value: {value_str}"))?
    };

    Ok(if negative { -magnitude } else { magnitude })
}

/// Parses a date string (YYYY-MM-DD) to days since Unix epoch (1970-01-01).
pub fn parse_date_to_days(date_str: &str) -> Result<i32, String> {
    let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT)
        .map_err(|e| format!("Invalid date '{date_str}' (expected YYYY-MM-DD): {e}"))?;
    let days = date.signed_duration_since(unix_epoch()).num_days();
    i32::try_from(days).map_err(|_| format!("Date out of range: {date_str}"))
}

/// Parses a time string (HH:MM:SS[.ffffff]) to microseconds since midnight.
pub fn parse_time_to_micros(time_str: &str) -> Result<i64, String> {
    let time = NaiveTime::parse_from_str(time_str, TIME_FORMAT)
        .map_err(|e| format!("Invalid time '{time_str}' (expected HH:MM:SS.ffffff): {e}"))?;
    Ok(i64::from(time.num_seconds_from_midnight()) * 1_000_000
        + i64::from(time.nanosecond() / 1_000))
}

/// Parses a zone-less timestamp (YYYY-MM-DD HH:MM:SS[.ffffff]) to microseconds
/// since Unix epoch.
pub fn parse_timestamp_to_micros(timestamp_str: &str) -> Result<i64, String> {
    let ts = NaiveDateTime::parse_from_str(timestamp_str, TIMESTAMP_FORMAT).map_err(|e| {
        format!("Invalid timestamp '{timestamp_str}' (expected YYYY-MM-DD HH:MM:SS.ffffff): {e}")
    })?;
    Ok(ts.and_utc().timestamp_micros())
}

/// Parses a zoned timestamp (YYYY-MM-DD HH:MM:SS[.ffffff] +HHMM) to microseconds
/// since Unix epoch in UTC.
pub fn parse_timestamp_tz_to_micros(timestamp_str: &str) -> Result<i64, String> {
    let ts = DateTime::parse_from_str(timestamp_str, TIMESTAMP_TZ_FORMAT).map_err(|e| {
        format!(
            "Invalid timestamp '{timestamp_str}' (expected YYYY-MM-DD HH:MM:SS.ffffff +HHMM): {e}"
        )
    })?;
    Ok(ts.timestamp_micros())
}

/// Decodes a hex-encoded binary value.
pub fn parse_hex_binary(value: &str) -> Result<Vec<u8>, String> {
    hex::decode(value).map_err(|e| format!("Invalid hex binary value '{value}': {e}"))
}
