//! Read locations and flow records from Arrow record batches
//!
//! File formats are the caller's concern: anything that yields `RecordBatch`es
//! (CSV or Parquet readers, PyArrow/Polars tables) can feed the bundler.

use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, LargeStringArray,
    RecordBatch, StringArray, StringViewArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;

use crate::error::ConfigurationError;
use crate::graph::{FlowRecord, Location};

pub const X_COLUMN: &str = "X";
pub const Y_COLUMN: &str = "Y";
pub const ORIGIN_COLUMN: &str = "ORIGIN";
pub const DESTINATION_COLUMN: &str = "DESTINATION";
pub const OD_ID_COLUMN: &str = "OD_ID";
pub const COUNT_COLUMN: &str = "COUNT";

/// Expected schema for location tables.
///
/// - `id_column` (Utf8): unique location key; LargeUtf8, Utf8View and Int64 also accepted
/// - `X`, `Y` (Float64): planar coordinates; Float32 and Int64 also accepted
pub fn location_schema(id_column: &str) -> Schema {
    Schema::new(vec![
        Field::new(id_column, DataType::Utf8, false),
        Field::new(X_COLUMN, DataType::Float64, false),
        Field::new(Y_COLUMN, DataType::Float64, false),
    ])
}

/// Expected schema for flow tables.
///
/// - `ORIGIN`, `DESTINATION` (Utf8): location keys
/// - `OD_ID` (Utf8, optional): defaults to `"{ORIGIN}_{DESTINATION}"`
/// - `COUNT` (Int64): non-negative intensity; Int32 and UInt64 also accepted
pub fn flow_schema() -> Schema {
    Schema::new(vec![
        Field::new(ORIGIN_COLUMN, DataType::Utf8, false),
        Field::new(DESTINATION_COLUMN, DataType::Utf8, false),
        Field::new(OD_ID_COLUMN, DataType::Utf8, true),
        Field::new(COUNT_COLUMN, DataType::Int64, false),
    ])
}

/// Key column in any of the string layouts (Polars hands over view types)
enum KeyColumn<'a> {
    String(&'a StringArray),
    LargeString(&'a LargeStringArray),
    StringView(&'a StringViewArray),
    Int64(&'a Int64Array),
}

impl<'a> KeyColumn<'a> {
    fn from_batch(batch: &'a RecordBatch, name: &str) -> Result<Self, ConfigurationError> {
        let col = required_column(batch, name)?;
        let any = col.as_any();
        if let Some(arr) = any.downcast_ref::<StringArray>() {
            Ok(KeyColumn::String(arr))
        } else if let Some(arr) = any.downcast_ref::<LargeStringArray>() {
            Ok(KeyColumn::LargeString(arr))
        } else if let Some(arr) = any.downcast_ref::<StringViewArray>() {
            Ok(KeyColumn::StringView(arr))
        } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
            Ok(KeyColumn::Int64(arr))
        } else {
            Err(type_error(name, "Utf8, LargeUtf8, Utf8View or Int64", col))
        }
    }

    fn is_null(&self, row: usize) -> bool {
        match self {
            KeyColumn::String(arr) => arr.is_null(row),
            KeyColumn::LargeString(arr) => arr.is_null(row),
            KeyColumn::StringView(arr) => arr.is_null(row),
            KeyColumn::Int64(arr) => arr.is_null(row),
        }
    }

    fn value(&self, row: usize) -> String {
        match self {
            KeyColumn::String(arr) => arr.value(row).to_string(),
            KeyColumn::LargeString(arr) => arr.value(row).to_string(),
            KeyColumn::StringView(arr) => arr.value(row).to_string(),
            KeyColumn::Int64(arr) => arr.value(row).to_string(),
        }
    }

    fn required(&self, name: &str, row: usize) -> Result<String, ConfigurationError> {
        if self.is_null(row) {
            return Err(null_error(name, row));
        }
        Ok(self.value(row))
    }

    fn optional(&self, row: usize) -> Option<String> {
        if self.is_null(row) {
            None
        } else {
            Some(self.value(row))
        }
    }
}

enum CoordColumn<'a> {
    Float64(&'a Float64Array),
    Float32(&'a Float32Array),
    Int64(&'a Int64Array),
}

impl<'a> CoordColumn<'a> {
    fn from_batch(batch: &'a RecordBatch, name: &str) -> Result<Self, ConfigurationError> {
        let col = required_column(batch, name)?;
        let any = col.as_any();
        if let Some(arr) = any.downcast_ref::<Float64Array>() {
            Ok(CoordColumn::Float64(arr))
        } else if let Some(arr) = any.downcast_ref::<Float32Array>() {
            Ok(CoordColumn::Float32(arr))
        } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
            Ok(CoordColumn::Int64(arr))
        } else {
            Err(type_error(name, "Float64, Float32 or Int64", col))
        }
    }

    fn required(&self, name: &str, row: usize) -> Result<f64, ConfigurationError> {
        let value = match self {
            CoordColumn::Float64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            CoordColumn::Float32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as f64),
            CoordColumn::Int64(arr) => (!arr.is_null(row)).then(|| arr.value(row) as f64),
        };
        value.ok_or_else(|| null_error(name, row))
    }
}

enum CountColumn<'a> {
    Int64(&'a Int64Array),
    Int32(&'a Int32Array),
    UInt64(&'a UInt64Array),
}

impl<'a> CountColumn<'a> {
    fn from_batch(batch: &'a RecordBatch, name: &str) -> Result<Self, ConfigurationError> {
        let col = required_column(batch, name)?;
        let any = col.as_any();
        if let Some(arr) = any.downcast_ref::<Int64Array>() {
            Ok(CountColumn::Int64(arr))
        } else if let Some(arr) = any.downcast_ref::<Int32Array>() {
            Ok(CountColumn::Int32(arr))
        } else if let Some(arr) = any.downcast_ref::<UInt64Array>() {
            Ok(CountColumn::UInt64(arr))
        } else {
            Err(type_error(name, "Int64, Int32 or UInt64", col))
        }
    }

    fn required(&self, name: &str, row: usize) -> Result<u64, ConfigurationError> {
        let signed = match self {
            CountColumn::UInt64(arr) => {
                if arr.is_null(row) {
                    return Err(null_error(name, row));
                }
                return Ok(arr.value(row));
            }
            CountColumn::Int64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
            CountColumn::Int32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
        };
        let value = signed.ok_or_else(|| null_error(name, row))?;
        u64::try_from(value).map_err(|_| ConfigurationError::NegativeCount {
            column: name.to_string(),
            row,
            value,
        })
    }
}

fn required_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a ArrayRef, ConfigurationError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ConfigurationError::MissingColumn {
            column: name.to_string(),
        })
}

fn type_error(name: &str, expected: &'static str, col: &ArrayRef) -> ConfigurationError {
    ConfigurationError::ColumnType {
        column: name.to_string(),
        expected,
        found: col.data_type().to_string(),
    }
}

fn null_error(name: &str, row: usize) -> ConfigurationError {
    ConfigurationError::NullValue {
        column: name.to_string(),
        row,
    }
}

/// Read locations from record batches.
///
/// Rows are numbered across batches in error messages.
pub fn locations_from_batches<I>(
    batches: I,
    id_column: &str,
) -> Result<Vec<Location>, ConfigurationError>
where
    I: IntoIterator<Item = Result<RecordBatch, ArrowError>>,
{
    let mut locations = Vec::new();
    let mut row_offset = 0;

    for batch_result in batches {
        let batch = batch_result?;
        let keys = KeyColumn::from_batch(&batch, id_column)?;
        let xs = CoordColumn::from_batch(&batch, X_COLUMN)?;
        let ys = CoordColumn::from_batch(&batch, Y_COLUMN)?;

        locations.reserve(batch.num_rows());
        for row in 0..batch.num_rows() {
            let global_row = row_offset + row;
            let key = keys.required(id_column, row).map_err(|e| renumber(e, global_row))?;
            let x = xs.required(X_COLUMN, row).map_err(|e| renumber(e, global_row))?;
            let y = ys.required(Y_COLUMN, row).map_err(|e| renumber(e, global_row))?;
            locations.push(Location::new(key, x, y));
        }
        row_offset += batch.num_rows();
    }

    tracing::debug!(rows = locations.len(), "locations loaded");
    Ok(locations)
}

/// Read flow records from record batches.
pub fn flows_from_batches<I>(batches: I) -> Result<Vec<FlowRecord>, ConfigurationError>
where
    I: IntoIterator<Item = Result<RecordBatch, ArrowError>>,
{
    let mut flows = Vec::new();
    let mut row_offset = 0;

    for batch_result in batches {
        let batch = batch_result?;
        let origins = KeyColumn::from_batch(&batch, ORIGIN_COLUMN)?;
        let destinations = KeyColumn::from_batch(&batch, DESTINATION_COLUMN)?;
        let counts = CountColumn::from_batch(&batch, COUNT_COLUMN)?;
        let od_ids = match batch.column_by_name(OD_ID_COLUMN) {
            Some(_) => Some(KeyColumn::from_batch(&batch, OD_ID_COLUMN)?),
            None => None,
        };

        flows.reserve(batch.num_rows());
        for row in 0..batch.num_rows() {
            let global_row = row_offset + row;
            let origin = origins
                .required(ORIGIN_COLUMN, row)
                .map_err(|e| renumber(e, global_row))?;
            let destination = destinations
                .required(DESTINATION_COLUMN, row)
                .map_err(|e| renumber(e, global_row))?;
            let count = counts
                .required(COUNT_COLUMN, row)
                .map_err(|e| renumber(e, global_row))?;

            let mut record = FlowRecord::new(origin, destination, count);
            if let Some(od_id) = od_ids.as_ref().and_then(|col| col.optional(row)) {
                record = record.with_od_id(od_id);
            }
            flows.push(record);
        }
        row_offset += batch.num_rows();
    }

    tracing::debug!(rows = flows.len(), "flow records loaded");
    Ok(flows)
}

/// Replace a batch-local row number with one counted across all batches
fn renumber(err: ConfigurationError, global_row: usize) -> ConfigurationError {
    match err {
        ConfigurationError::NullValue { column, .. } => ConfigurationError::NullValue {
            column,
            row: global_row,
        },
        ConfigurationError::NegativeCount { column, value, .. } => {
            ConfigurationError::NegativeCount {
                column,
                row: global_row,
                value,
            }
        }
        other => other,
    }
}
