//! Request validators. Every failure is a 400 with a readable message.

use api_types::transaction::{AmountInput, TransactionQuery};
use axum::{
    Json,
    extract::{
        Query,
        rejection::{JsonRejection, QueryRejection},
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use email_address::EmailAddress;
use engine::{AmountRange, DateRange, TransactionFilter};

use crate::ServerError;

fn invalid(message: impl Into<String>) -> ServerError {
    ServerError::Generic(message.into())
}

/// Unwraps a JSON body, turning extractor rejections into 400s.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| invalid(rejection.body_text()))
}

pub fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ServerError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| invalid(rejection.body_text()))
}

/// A present, non blank attribute, trimmed.
pub fn required(value: Option<String>, name: &str) -> Result<String, ServerError> {
    let value = value.ok_or_else(|| invalid(format!("missing attribute: {name}")))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("empty attribute: {name}")));
    }
    Ok(trimmed.to_string())
}

/// A present, non blank password, kept exactly as submitted.
pub fn password(value: Option<String>) -> Result<String, ServerError> {
    required(value.clone(), "password")?;
    Ok(value.unwrap_or_default())
}

pub fn email(value: Option<String>) -> Result<String, ServerError> {
    let value = required(value, "email")?;
    check_email(&value)?;
    Ok(value)
}

fn check_email(value: &str) -> Result<(), ServerError> {
    if EmailAddress::is_valid(value) {
        Ok(())
    } else {
        Err(invalid(format!("invalid email: {value}")))
    }
}

/// A present list whose entries are all non blank, well formed emails.
pub fn emails(values: Option<Vec<String>>, name: &str) -> Result<Vec<String>, ServerError> {
    let values = values.ok_or_else(|| invalid(format!("missing attribute: {name}")))?;
    values
        .into_iter()
        .map(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(invalid("emails must not be empty"));
            }
            check_email(trimmed)?;
            Ok(trimmed.to_string())
        })
        .collect()
}

fn parse_number(raw: &str, name: &str) -> Result<f64, ServerError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| invalid(format!("invalid {name}: {raw}")))
}

pub fn amount(value: Option<AmountInput>) -> Result<f64, ServerError> {
    match value {
        None => Err(invalid("missing attribute: amount")),
        Some(AmountInput::Number(value)) if value.is_finite() => Ok(value),
        Some(AmountInput::Number(value)) => Err(invalid(format!("invalid amount: {value}"))),
        Some(AmountInput::Text(raw)) => parse_number(&raw, "amount"),
    }
}

fn parse_day(raw: &str, name: &str) -> Result<NaiveDate, ServerError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| invalid(format!("invalid {name}: expected YYYY-MM-DD, got {raw}")))
}

fn start_of(day: NaiveDate) -> Result<DateTime<Utc>, ServerError> {
    day.and_hms_milli_opt(0, 0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| invalid("invalid date"))
}

fn end_of(day: NaiveDate) -> Result<DateTime<Utc>, ServerError> {
    day.and_hms_milli_opt(23, 59, 59, 999)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| invalid("invalid date"))
}

/// Date bounds from `date`, or from `from`/`upTo`. Days are whole UTC days.
pub fn date_range(query: &TransactionQuery) -> Result<DateRange, ServerError> {
    if let Some(date) = &query.date {
        if query.from.is_some() || query.up_to.is_some() {
            return Err(invalid("date cannot be combined with from or upTo"));
        }
        let day = parse_day(date, "date")?;
        return Ok(DateRange {
            from: Some(start_of(day)?),
            up_to: Some(end_of(day)?),
        });
    }

    Ok(DateRange {
        from: query
            .from
            .as_deref()
            .map(|raw| parse_day(raw, "from").and_then(start_of))
            .transpose()?,
        up_to: query
            .up_to
            .as_deref()
            .map(|raw| parse_day(raw, "upTo").and_then(end_of))
            .transpose()?,
    })
}

pub fn amount_range(query: &TransactionQuery) -> Result<AmountRange, ServerError> {
    Ok(AmountRange {
        min: query
            .min
            .as_deref()
            .map(|raw| parse_number(raw, "min"))
            .transpose()?,
        max: query
            .max
            .as_deref()
            .map(|raw| parse_number(raw, "max"))
            .transpose()?,
    })
}

pub fn transaction_filter(query: &TransactionQuery) -> Result<TransactionFilter, ServerError> {
    Ok(TransactionFilter {
        date: date_range(query)?,
        amount: amount_range(query)?,
        category: None,
    })
}
