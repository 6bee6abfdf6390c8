use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::errors::{FinanceError, FinanceResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
// 99,999,999.99, the DECIMAL(10,2) range.
pub const MAX_AMOUNT_CENTS: i64 = 9_999_999_999;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(f64),
}

impl AmountInput {
    pub fn to_cents(&self) -> FinanceResult<i64> {
        match self {
            Self::Text(text) => parse_amount_to_cents(text),
            Self::Number(value) => {
                if !value.is_finite() {
                    return Err(FinanceError::validation("amount must be a finite number"));
                }
                parse_amount_to_cents(&value.to_string())
            }
        }
    }
}

pub fn cents_to_text(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}

pub fn parse_amount_to_cents(raw: &str) -> FinanceResult<i64> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return Ok(0);
    }
    s = s
        .replace(',', "")
        .replace('$', "")
        .replace('€', "")
        .replace('£', "")
        .replace('₹', "")
        .replace(' ', "");
    if s.is_empty() {
        return Ok(0);
    }
    let negative = s.starts_with('-');
    if s.starts_with('-') || s.starts_with('+') {
        s = s[1..].to_string();
    }
    if s.is_empty() {
        return Err(FinanceError::validation("invalid amount format"));
    }
    let parts = s.split('.').collect::<Vec<_>>();
    if parts.len() > 2 {
        return Err(FinanceError::validation("invalid amount format"));
    }
    let int_part = if parts[0].is_empty() { "0" } else { parts[0] };
    if !int_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(FinanceError::validation("invalid amount format"));
    }
    let frac_part = if parts.len() == 2 { parts[1] } else { "" };
    if !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(FinanceError::validation("invalid amount format"));
    }
    if frac_part.len() > 2 {
        return Err(FinanceError::validation(
            "amount supports at most two decimal places",
        ));
    }
    let int_val = int_part
        .parse::<i64>()
        .map_err(|_| FinanceError::validation("amount out of range"))?;
    let frac_val = match frac_part.len() {
        0 => 0_i64,
        1 => {
            frac_part
                .parse::<i64>()
                .map_err(|_| FinanceError::validation("invalid amount format"))?
                * 10
        }
        _ => frac_part
            .parse::<i64>()
            .map_err(|_| FinanceError::validation("invalid amount format"))?,
    };
    let mut cents = int_val
        .checked_mul(100)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(|| FinanceError::validation("amount out of range"))?;
    if negative {
        cents = -cents;
    }
    Ok(cents)
}

fn check_amount_range(cents: i64, field_name: &str) -> FinanceResult<i64> {
    if cents > MAX_AMOUNT_CENTS {
        return Err(FinanceError::validation(format!(
            "{field_name} must not exceed {}",
            cents_to_text(MAX_AMOUNT_CENTS)
        )));
    }
    Ok(cents)
}

pub fn parse_positive_amount(raw: Option<&AmountInput>, field_name: &str) -> FinanceResult<i64> {
    let input =
        raw.ok_or_else(|| FinanceError::validation(format!("{field_name} is required")))?;
    let cents = check_amount_range(input.to_cents()?, field_name)?;
    if cents <= 0 {
        return Err(FinanceError::validation(format!(
            "{field_name} must be greater than zero"
        )));
    }
    Ok(cents)
}

pub fn parse_non_negative_amount(
    raw: Option<&AmountInput>,
    field_name: &str,
    default: i64,
) -> FinanceResult<i64> {
    let cents = match raw {
        Some(input) => check_amount_range(input.to_cents()?, field_name)?,
        None => default,
    };
    if cents < 0 {
        return Err(FinanceError::validation(format!(
            "{field_name} cannot be negative"
        )));
    }
    Ok(cents)
}

pub fn parse_optional_text(raw: Option<String>) -> String {
    raw.unwrap_or_default().trim().to_string()
}

pub fn parse_required_text(raw: Option<String>, field_name: &str) -> FinanceResult<String> {
    let text = parse_optional_text(raw);
    if text.is_empty() {
        return Err(FinanceError::validation(format!("{field_name} is required")));
    }
    Ok(text)
}

pub fn parse_limit(raw: Option<u32>, default_limit: u32, max_limit: u32) -> u32 {
    raw.unwrap_or(default_limit).clamp(1, max_limit)
}

pub fn parse_date(text: &str, field_name: &str) -> FinanceResult<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).map_err(|_| {
        FinanceError::validation(format!("{field_name} must be a date formatted YYYY-MM-DD"))
    })
}

pub fn parse_required_date(raw: Option<String>, field_name: &str) -> FinanceResult<NaiveDate> {
    let text = parse_required_text(raw, field_name)?;
    parse_date(&text, field_name)
}

pub fn parse_optional_date(
    raw: Option<String>,
    field_name: &str,
) -> FinanceResult<Option<NaiveDate>> {
    let text = parse_optional_text(raw);
    if text.is_empty() {
        return Ok(None);
    }
    parse_date(&text, field_name).map(Some)
}

pub fn parse_datetime(text: &str, field_name: &str) -> FinanceResult<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(FinanceError::validation(format!(
        "{field_name} must be a date (YYYY-MM-DD) or date-time (YYYY-MM-DD HH:MM:SS)"
    )))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub fn resolve_today(raw: Option<String>) -> FinanceResult<NaiveDate> {
    Ok(parse_optional_date(raw, "today")?.unwrap_or_else(|| chrono::Local::now().date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_text_parses_to_cents() {
        assert_eq!(parse_amount_to_cents("12.34").unwrap(), 1234);
        assert_eq!(parse_amount_to_cents("$1,200.5").unwrap(), 120050);
        assert_eq!(parse_amount_to_cents("-0.07").unwrap(), -7);
        assert_eq!(parse_amount_to_cents("  ").unwrap(), 0);
        assert!(parse_amount_to_cents("1.234").is_err());
        assert!(parse_amount_to_cents("12a").is_err());
        assert!(parse_amount_to_cents("1.2.3").is_err());
    }

    #[test]
    fn json_number_amounts_keep_two_decimals() {
        assert_eq!(AmountInput::Number(100.01).to_cents().unwrap(), 10001);
        assert_eq!(AmountInput::Number(30.0).to_cents().unwrap(), 3000);
        assert!(AmountInput::Number(f64::NAN).to_cents().is_err());
    }

    #[test]
    fn cents_render_with_two_decimals() {
        assert_eq!(cents_to_text(0), "0.00");
        assert_eq!(cents_to_text(1), "0.01");
        assert_eq!(cents_to_text(-1050), "-10.50");
        assert_eq!(cents_to_text(123456), "1234.56");
    }

    #[test]
    fn datetime_accepts_date_only_and_rfc3339() {
        let d = parse_datetime("2026-03-05", "date").unwrap();
        assert_eq!(format_datetime(d), "2026-03-05 00:00:00");
        let d = parse_datetime("2026-03-05T10:15:00.000Z", "date").unwrap();
        assert_eq!(format_datetime(d), "2026-03-05 10:15:00");
        let d = parse_datetime("2026-03-05 10:15", "date").unwrap();
        assert_eq!(format_datetime(d), "2026-03-05 10:15:00");
        assert!(parse_datetime("05/03/2026", "date").is_err());
    }

    #[test]
    fn positive_amount_rejects_zero_and_missing() {
        assert!(parse_positive_amount(None, "amount").is_err());
        assert!(parse_positive_amount(Some(&AmountInput::Text("0".into())), "amount").is_err());
        assert_eq!(
            parse_positive_amount(Some(&AmountInput::Text("5".into())), "amount").unwrap(),
            500
        );
    }

    #[test]
    fn amounts_above_decimal_10_2_are_rejected() {
        let at_cap = AmountInput::Text("99,999,999.99".into());
        assert_eq!(parse_positive_amount(Some(&at_cap), "amount").unwrap(), MAX_AMOUNT_CENTS);
        assert_eq!(
            parse_non_negative_amount(Some(&at_cap), "cost", 0).unwrap(),
            MAX_AMOUNT_CENTS
        );

        let over = AmountInput::Text("100000000.00".into());
        let err = parse_positive_amount(Some(&over), "amount").unwrap_err();
        assert_eq!(err.category(), "VALIDATION_ERROR");
        let err = parse_non_negative_amount(Some(&over), "cost", 0).unwrap_err();
        assert_eq!(err.category(), "VALIDATION_ERROR");
        assert!(parse_positive_amount(Some(&AmountInput::Number(9e16)), "amount").is_err());
    }
}
