use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use common::{Error, Result};
use datafusion::arrow::array::{Array, Int32Array, Int64Array};
use datafusion::arrow::datatypes::DataType;
use datafusion::common::{DataFusionError, ScalarValue};
use datafusion::logical_expr::{ColumnarValue, ScalarUDF, Volatility, create_udf};
use datafusion::prelude::Expr;
use std::sync::Arc;

/// Calendar component of an epoch-milliseconds timestamp, read in UTC with no zone attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarPart {
    Hour,
    Day,
    WeekOfYear,
    Month,
    Year,
    /// 0 = Sunday through 6 = Saturday.
    Weekday,
}

impl CalendarPart {
    pub fn udf_name(&self) -> &'static str {
        match self {
            Self::Hour => "epoch_ms_hour",
            Self::Day => "epoch_ms_day",
            Self::WeekOfYear => "epoch_ms_week_of_year",
            Self::Month => "epoch_ms_month",
            Self::Year => "epoch_ms_year",
            Self::Weekday => "epoch_ms_weekday",
        }
    }

    fn of(&self, dt: &NaiveDateTime) -> i32 {
        match self {
            Self::Hour => dt.hour() as i32,
            Self::Day => dt.day() as i32,
            Self::WeekOfYear => dt.iso_week().week() as i32,
            Self::Month => dt.month() as i32,
            Self::Year => dt.year(),
            Self::Weekday => dt.weekday().num_days_from_sunday() as i32,
        }
    }

    /// Applies this part's UDF to an Int64 epoch-milliseconds expression.
    pub fn apply(self, expr: Expr) -> Expr {
        calendar_udf(self).call(vec![expr])
    }
}

pub fn calendar_udf(part: CalendarPart) -> ScalarUDF {
    create_udf(
        part.udf_name(),
        vec![DataType::Int64],
        DataType::Int32,
        Volatility::Immutable,
        Arc::new(move |args: &[ColumnarValue]| {
            extract_calendar_part(args, part).map_err(|e| DataFusionError::Internal(e.to_string()))
        }),
    )
}

pub fn epoch_millis_to_datetime(ms: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| Error::InvalidInput(format!("Timestamp {} ms is out of range", ms)))
}

pub fn calendar_part(ms: i64, part: CalendarPart) -> Result<i32> {
    Ok(part.of(&epoch_millis_to_datetime(ms)?))
}

fn extract_calendar_part(args: &[ColumnarValue], part: CalendarPart) -> Result<ColumnarValue> {
    match args.first() {
        Some(ColumnarValue::Array(array)) => {
            let millis = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| Error::Other("Expected int64 array".to_string()))?;

            let result = millis
                .iter()
                .map(|opt_ms| opt_ms.map(|ms| calendar_part(ms, part)).transpose())
                .collect::<Result<Int32Array>>()?;

            Ok(ColumnarValue::Array(Arc::new(result)))
        }
        Some(ColumnarValue::Scalar(ScalarValue::Int64(value))) => {
            let result = value.map(|ms| calendar_part(ms, part)).transpose()?;
            Ok(ColumnarValue::Scalar(ScalarValue::Int32(result)))
        }
        Some(other) => Err(Error::Other(format!(
            "Unsupported argument for {}: {:?}",
            part.udf_name(),
            other.data_type()
        ))),
        None => Err(Error::Other(format!("{} expects one argument", part.udf_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2018-11-01T21:01:46.796 UTC, a Thursday
    const TS: i64 = 1541106106796;

    #[test]
    fn test_calendar_parts_of_known_timestamp() {
        assert_eq!(calendar_part(TS, CalendarPart::Hour).unwrap(), 21);
        assert_eq!(calendar_part(TS, CalendarPart::Day).unwrap(), 1);
        assert_eq!(calendar_part(TS, CalendarPart::WeekOfYear).unwrap(), 44);
        assert_eq!(calendar_part(TS, CalendarPart::Month).unwrap(), 11);
        assert_eq!(calendar_part(TS, CalendarPart::Year).unwrap(), 2018);
        assert_eq!(calendar_part(TS, CalendarPart::Weekday).unwrap(), 4);
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2018-12-31 is a Monday and belongs to ISO week 1 of 2019
        let ms = 1546214400000;
        assert_eq!(calendar_part(ms, CalendarPart::WeekOfYear).unwrap(), 1);
        assert_eq!(calendar_part(ms, CalendarPart::Year).unwrap(), 2018);
        assert_eq!(calendar_part(ms, CalendarPart::Weekday).unwrap(), 1);
    }

    #[test]
    fn test_sunday_is_zero() {
        // 2018-11-04T00:00:00 UTC
        assert_eq!(calendar_part(1541289600000, CalendarPart::Weekday).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_timestamp_is_error() {
        assert!(calendar_part(i64::MAX, CalendarPart::Hour).is_err());
    }

    #[test]
    fn test_extract_array_keeps_nulls() {
        let input = Int64Array::from(vec![Some(TS), None, Some(0)]);

        let result =
            extract_calendar_part(&[ColumnarValue::Array(Arc::new(input))], CalendarPart::Year)
                .unwrap();

        if let ColumnarValue::Array(array) = result {
            let years = array.as_any().downcast_ref::<Int32Array>().unwrap();
            assert_eq!(years.value(0), 2018);
            assert!(years.is_null(1));
            assert_eq!(years.value(2), 1970);
        } else {
            panic!("Expected Array result");
        }
    }

    #[test]
    fn test_extract_scalar() {
        let result = extract_calendar_part(
            &[ColumnarValue::Scalar(ScalarValue::Int64(Some(TS)))],
            CalendarPart::Hour,
        )
        .unwrap();

        match result {
            ColumnarValue::Scalar(ScalarValue::Int32(Some(hour))) => assert_eq!(hour, 21),
            _ => panic!("Expected Int32 scalar"),
        }
    }

    #[test]
    fn test_extract_rejects_wrong_type() {
        let input = Int32Array::from(vec![1, 2]);
        let result =
            extract_calendar_part(&[ColumnarValue::Array(Arc::new(input))], CalendarPart::Day);
        assert!(result.is_err());
    }
}
