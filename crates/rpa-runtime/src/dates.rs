use std::fmt::Write as _;

use chrono::{Local, Months, NaiveDate, NaiveDateTime, TimeDelta};
use rpa_core::{DateOperation, DateUnit, EngineError};

pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq)]
pub struct DateRequest<'a> {
    /// Empty input means "now".
    pub input: &'a str,
    pub input_format: Option<&'a str>,
    pub operation: DateOperation,
    pub unit: DateUnit,
    /// Ignored by `Next` and `Previous`.
    pub amount: i64,
    pub output_format: Option<&'a str>,
}

pub fn calculate(request: &DateRequest<'_>) -> Result<String, EngineError> {
    let (start, parsed_format) = parse_input(request.input, request.input_format)?;
    let delta = match request.operation {
        DateOperation::Add => request.amount,
        DateOperation::Subtract => request.amount.checked_neg().ok_or_else(overflow)?,
        DateOperation::Next => 1,
        DateOperation::Previous => -1,
    };
    let shifted = shift(start, request.unit, delta)?;
    let format = request.output_format.unwrap_or(parsed_format);

    let mut output = String::new();
    write!(output, "{}", shifted.format(format)).map_err(|_| {
        EngineError::new(
            "ENGINE_DATE_FORMAT",
            format!("Output format \"{}\" is not valid.", format),
        )
    })?;
    Ok(output)
}

fn parse_input<'a>(
    input: &str,
    input_format: Option<&'a str>,
) -> Result<(NaiveDateTime, &'a str), EngineError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok((
            Local::now().naive_local(),
            input_format.unwrap_or(DEFAULT_DATETIME_FORMAT),
        ));
    }

    let candidates: Vec<&'a str> = match input_format {
        Some(format) => vec![format],
        None => vec![DEFAULT_DATETIME_FORMAT, DEFAULT_DATE_FORMAT],
    };
    for format in candidates {
        if let Ok(value) = NaiveDateTime::parse_from_str(input, format) {
            return Ok((value, format));
        }
        if let Some(value) = NaiveDate::parse_from_str(input, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
        {
            return Ok((value, format));
        }
    }

    Err(EngineError::new(
        "ENGINE_DATE_PARSE",
        format!("\"{}\" is not a recognised date.", input),
    ))
}

fn shift(start: NaiveDateTime, unit: DateUnit, delta: i64) -> Result<NaiveDateTime, EngineError> {
    let shifted = match unit {
        DateUnit::Second => TimeDelta::try_seconds(delta).and_then(|d| start.checked_add_signed(d)),
        DateUnit::Minute => TimeDelta::try_minutes(delta).and_then(|d| start.checked_add_signed(d)),
        DateUnit::Hour => TimeDelta::try_hours(delta).and_then(|d| start.checked_add_signed(d)),
        DateUnit::Day => TimeDelta::try_days(delta).and_then(|d| start.checked_add_signed(d)),
        DateUnit::Month => shift_months(start, delta),
        DateUnit::Year => delta
            .checked_mul(12)
            .and_then(|months| shift_months(start, months)),
    };
    shifted.ok_or_else(overflow)
}

// chrono clamps to the last valid day of the target month.
fn shift_months(start: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = u32::try_from(months.unsigned_abs()).ok()?;
    if months >= 0 {
        start.checked_add_months(Months::new(magnitude))
    } else {
        start.checked_sub_months(Months::new(magnitude))
    }
}

fn overflow() -> EngineError {
    EngineError::new("ENGINE_DATE_OVERFLOW", "Date calculation is out of range.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(input: &str, operation: DateOperation, unit: DateUnit, amount: i64) -> DateRequest<'_> {
        DateRequest {
            input,
            input_format: None,
            operation,
            unit,
            amount,
            output_format: None,
        }
    }

    #[test]
    fn adds_and_subtracts_days_keeping_the_input_format() {
        assert_eq!(
            calculate(&request("2024-02-27", DateOperation::Add, DateUnit::Day, 3)).expect("add"),
            "2024-03-01"
        );
        assert_eq!(
            calculate(&request(
                "2024-03-01 08:30:00",
                DateOperation::Subtract,
                DateUnit::Hour,
                9
            ))
            .expect("subtract"),
            "2024-02-29 23:30:00"
        );
    }

    #[test]
    fn month_arithmetic_clamps_to_month_end() {
        assert_eq!(
            calculate(&request("2024-01-31", DateOperation::Add, DateUnit::Month, 1)).expect("month"),
            "2024-02-29"
        );
        assert_eq!(
            calculate(&request("2024-02-29", DateOperation::Next, DateUnit::Year, 99)).expect("year"),
            "2025-02-28"
        );
        assert_eq!(
            calculate(&request("2024-03-31", DateOperation::Previous, DateUnit::Month, 0))
                .expect("previous"),
            "2024-02-29"
        );
    }

    #[test]
    fn explicit_formats_are_honoured() {
        let mut req = request("31/12/2023", DateOperation::Add, DateUnit::Day, 1);
        req.input_format = Some("%d/%m/%Y");
        req.output_format = Some("%Y%m%d");
        assert_eq!(calculate(&req).expect("formats"), "20240101");
    }

    #[test]
    fn bad_input_is_a_command_error() {
        let error = calculate(&request("yesterday-ish", DateOperation::Add, DateUnit::Day, 1))
            .expect_err("parse");
        assert_eq!(error.code, "ENGINE_DATE_PARSE");

        let error = calculate(&request("2024-01-01", DateOperation::Add, DateUnit::Year, i64::MAX))
            .expect_err("overflow");
        assert_eq!(error.code, "ENGINE_DATE_OVERFLOW");
    }

    #[test]
    fn empty_input_means_now() {
        let output = calculate(&request("", DateOperation::Add, DateUnit::Second, 0)).expect("now");
        assert!(NaiveDateTime::parse_from_str(&output, DEFAULT_DATETIME_FORMAT).is_ok());
    }
}
