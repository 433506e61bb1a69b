use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, BooleanBuilder, Float32Array, Float64Array,
    Float64Builder, Int32Array, Int64Array, Int64Builder, LargeListArray, ListArray,
    ListBuilder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{AttributeValue, Record, Series};
use super::store::SeriesStore;

/// Field metadata key marking a Utf8 column whose cells hold JSON text.
const ENCODING_KEY: &str = "encoding";
const JSON_ENCODING: &str = "json";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a series collection from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per series, one column per record key (recommended)
/// * `.json`    – `[{ "y": [...], "group": 0, ... }, ...]`
/// * `.csv`     – one row per series, arrays as semicolon-separated floats
pub fn load_file(path: &Path) -> Result<SeriesStore> {
    let records = match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };
    log::info!("Loaded {} series from {}", records.len(), path.display());
    Ok(SeriesStore::from_series(
        records.into_iter().map(Series::from_record).collect(),
    ))
}

/// Save a series collection. The format follows the file extension, as for
/// [`load_file`].
pub fn save_file(store: &SeriesStore, path: &Path) -> Result<()> {
    let records: Vec<Record> = store.series().iter().map(Series::to_record).collect();
    match extension(path).as_str() {
        "parquet" | "pq" => save_parquet(&records, path)?,
        "json" => save_json(&records, path)?,
        "csv" => save_csv(&records, path)?,
        other => bail!("Unsupported file extension: .{other}"),
    }
    log::info!("Saved {} series to {}", records.len(), path.display());
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Union of keys in first-seen order, so columns come out stable.
fn column_names(records: &[Record]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for rec in records {
        for key in rec.keys() {
            if seen.insert(key.clone()) {
                names.push(key.clone());
            }
        }
    }
    names
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "x": 0.0001, "y": [0.12, 0.14, ...], "group": 0, "ylabel": "Current (pA)" },
///   { "y": [1.0, 2.0], "episode": 3, "name": "fit" },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let rows = root.as_array().context("Expected top-level JSON array")?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let obj = row
                .as_object()
                .with_context(|| format!("Row {i} is not a JSON object"))?;
            let rec: Record = obj
                .iter()
                .map(|(key, val)| (key.clone(), json_to_value(val)))
                .collect();
            Ok(rec)
        })
        .collect()
}

fn save_json(records: &[Record], path: &Path) -> Result<()> {
    let rows: Vec<JsonValue> = records
        .iter()
        .map(|rec| {
            JsonValue::Object(
                rec.iter()
                    .map(|(k, v)| (k.clone(), value_to_json(v)))
                    .collect(),
            )
        })
        .collect();
    let text = serde_json::to_string_pretty(&rows).context("serializing JSON")?;
    std::fs::write(path, text).context("writing JSON file")
}

pub(crate) fn json_to_value(val: &JsonValue) -> AttributeValue {
    match val {
        JsonValue::String(s) => AttributeValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttributeValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                AttributeValue::Float(f)
            } else {
                AttributeValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Array(items) if items.iter().all(|v| v.is_number() || v.is_null()) => {
            // JSON has no NaN; nulls inside numeric arrays stand in for it
            AttributeValue::Array(items.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect())
        }
        JsonValue::Object(obj) => AttributeValue::Map(
            obj.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ),
        other => AttributeValue::String(other.to_string()),
    }
}

pub(crate) fn value_to_json(val: &AttributeValue) -> JsonValue {
    let number = |f: f64| {
        serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    };
    match val {
        AttributeValue::String(s) => JsonValue::String(s.clone()),
        AttributeValue::Integer(i) => JsonValue::from(*i),
        AttributeValue::Float(f) => number(*f),
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Array(values) => JsonValue::Array(values.iter().map(|&f| number(f)).collect()),
        AttributeValue::Map(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        AttributeValue::Null => JsonValue::Null,
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// CSV layout: header row with record keys, one row per series.
/// Array cells contain semicolon-separated floats (`"0.12;0.14;0.11"`; a
/// single-sample array keeps a trailing `;`), strings are JSON string
/// literals (`"\"Vm (mV)\""`), map cells hold JSON text, `null` is an
/// explicit null and empty cells mean the record lacks that key.
///
/// Unquoted text is still accepted for hand-written files.
fn load_csv(path: &Path) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut records = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let row = result.with_context(|| format!("CSV row {row_no}"))?;

        let mut rec = Record::new();
        for (col_idx, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let key = &headers[col_idx];
            rec.insert(key.clone(), csv_value(cell, key, row_no)?);
        }
        records.push(rec);
    }

    Ok(records)
}

fn csv_value(cell: &str, key: &str, row_no: usize) -> Result<AttributeValue> {
    let value = if cell.starts_with('"') {
        let text: String = serde_json::from_str(cell)
            .with_context(|| format!("Row {row_no}, {key}: invalid quoted string"))?;
        AttributeValue::String(text)
    } else if cell.starts_with('{') {
        let parsed: JsonValue = serde_json::from_str(cell)
            .with_context(|| format!("Row {row_no}, {key}: invalid JSON map"))?;
        json_to_value(&parsed)
    } else if matches!(key, "name" | "xlabel" | "ylabel") {
        AttributeValue::String(cell.to_string())
    } else if cell == "null" {
        AttributeValue::Null
    } else if cell.contains(';') {
        AttributeValue::Array(parse_semicolon_floats(cell, row_no, key)?)
    } else {
        guess_value_type(cell)
    };
    Ok(value)
}

fn save_csv(records: &[Record], path: &Path) -> Result<()> {
    let columns = column_names(records);
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    writer.write_record(&columns).context("writing CSV headers")?;
    for rec in records {
        let cells: Vec<String> = columns
            .iter()
            .map(|key| rec.get(key).map(csv_cell).unwrap_or_default())
            .collect();
        writer.write_record(&cells).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn csv_cell(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Array(values) => {
            let mut cell = values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(";");
            if values.len() < 2 {
                cell.push(';');
            }
            cell
        }
        AttributeValue::Map(_) | AttributeValue::String(_) => value_to_json(value).to_string(),
        // keep the decimal point so floats do not read back as integers
        AttributeValue::Float(f) => format!("{f:?}"),
        AttributeValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .enumerate()
        .map(|(j, tok)| {
            tok.parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn guess_value_type(s: &str) -> AttributeValue {
    if let Ok(i) = s.parse::<i64>() {
        return AttributeValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return AttributeValue::Float(f);
    }
    if s == "true" || s == "false" {
        return AttributeValue::Bool(s == "true");
    }
    AttributeValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Storage kind of one Parquet column, chosen from the values it must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    List,
    Int,
    Float,
    Str,
    Bool,
    /// Mixed kinds, maps or explicit nulls: Utf8 cells with JSON text.
    Json,
}

impl ColumnKind {
    fn infer<'a>(values: impl Iterator<Item = &'a AttributeValue>) -> ColumnKind {
        let mut kind = None;
        for v in values {
            let this = match v {
                AttributeValue::Array(_) => ColumnKind::List,
                AttributeValue::Integer(_) => ColumnKind::Int,
                AttributeValue::Float(_) => ColumnKind::Float,
                AttributeValue::String(_) => ColumnKind::Str,
                AttributeValue::Bool(_) => ColumnKind::Bool,
                AttributeValue::Map(_) | AttributeValue::Null => return ColumnKind::Json,
            };
            match kind {
                None => kind = Some(this),
                Some(k) if k != this => return ColumnKind::Json,
                Some(_) => {}
            }
        }
        kind.unwrap_or(ColumnKind::Json)
    }

    fn data_type(self) -> DataType {
        match self {
            ColumnKind::List => {
                DataType::List(Arc::new(Field::new("item", DataType::Float64, true)))
            }
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Str | ColumnKind::Json => DataType::Utf8,
        }
    }
}

/// Write one row per record and one nullable column per key. A null cell
/// means the record does not have that key.
fn save_parquet(records: &[Record], path: &Path) -> Result<()> {
    let names = column_names(records);
    let mut fields = Vec::with_capacity(names.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(names.len());

    for name in &names {
        let cells: Vec<Option<&AttributeValue>> = records.iter().map(|r| r.get(name)).collect();
        let kind = ColumnKind::infer(cells.iter().flatten().copied());

        let mut field = Field::new(name, kind.data_type(), true);
        if kind == ColumnKind::Json {
            field = field.with_metadata(HashMap::from([(
                ENCODING_KEY.to_string(),
                JSON_ENCODING.to_string(),
            )]));
        }
        fields.push(field);
        columns.push(build_column(kind, &cells));
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
    let batch = RecordBatch::try_new_with_options(schema.clone(), columns, &options)
        .context("assembling record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn build_column(kind: ColumnKind, cells: &[Option<&AttributeValue>]) -> ArrayRef {
    match kind {
        ColumnKind::List => {
            let mut builder = ListBuilder::new(Float64Builder::new());
            for cell in cells {
                match cell {
                    Some(AttributeValue::Array(values)) => {
                        builder.values().append_slice(values);
                        builder.append(true);
                    }
                    _ => builder.append(false),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Int => {
            let mut builder = Int64Builder::new();
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.as_i64()));
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Float => {
            let mut builder = Float64Builder::new();
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.as_f64()));
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Bool => {
            let mut builder = BooleanBuilder::new();
            for cell in cells {
                builder.append_option(cell.and_then(|v| match v {
                    AttributeValue::Bool(b) => Some(*b),
                    _ => None,
                }));
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Str => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.as_str()));
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Json => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                builder.append_option(cell.map(|v| value_to_json(v).to_string()));
            }
            Arc::new(builder.finish())
        }
    }
}

/// Load a Parquet file of series records.
///
/// Every column becomes a record key; null cells are left out of the record.
/// List columns (List<Float64|Float32> or LargeList) become arrays, Utf8
/// columns tagged `encoding=json` are decoded back into structured values.
///
/// Works with files written by [`save_file`] as well as by **Pandas**
/// (`df.to_parquet()`) and **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<Vec<Record>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let columns: Vec<(&Field, &ArrayRef, bool)> = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let json = f.metadata().get(ENCODING_KEY).map(String::as_str) == Some(JSON_ENCODING);
                (f.as_ref(), batch.column(i), json)
            })
            .collect();

        for row in 0..batch.num_rows() {
            let mut rec = Record::new();
            for (field, col, json) in &columns {
                if col.is_null(row) {
                    continue;
                }
                let value = extract_value(col, row, *json)
                    .with_context(|| format!("Row {row}: failed to read '{}'", field.name()))?;
                rec.insert(field.name().clone(), value);
            }
            records.push(rec);
        }
    }

    Ok(records)
}

// -- Parquet / Arrow helpers --

/// Extract a single record value from an Arrow column at a given row.
fn extract_value(col: &ArrayRef, row: usize, json: bool) -> Result<AttributeValue> {
    let value = match col.data_type() {
        DataType::List(_) | DataType::LargeList(_) => {
            AttributeValue::Array(extract_f64_list(col, row)?)
        }
        DataType::Utf8 | DataType::LargeUtf8 => {
            let text = if matches!(col.data_type(), DataType::Utf8) {
                col.as_string::<i32>().value(row)
            } else {
                col.as_string::<i64>().value(row)
            };
            if json {
                let parsed: JsonValue = serde_json::from_str(text).context("decoding JSON cell")?;
                json_to_value(&parsed)
            } else {
                AttributeValue::String(text.to_string())
            }
        }
        DataType::Int32 => {
            let arr = col
                .as_any()
                .downcast_ref::<Int32Array>()
                .context("expected Int32Array")?;
            AttributeValue::Integer(arr.value(row) as i64)
        }
        DataType::Int64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Int64Array>()
                .context("expected Int64Array")?;
            AttributeValue::Integer(arr.value(row))
        }
        DataType::Float32 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("expected Float32Array")?;
            AttributeValue::Float(arr.value(row) as f64)
        }
        DataType::Float64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("expected Float64Array")?;
            AttributeValue::Float(arr.value(row))
        }
        DataType::Boolean => {
            let arr = col
                .as_any()
                .downcast_ref::<BooleanArray>()
                .context("expected BooleanArray")?;
            AttributeValue::Bool(arr.value(row))
        }
        other => AttributeValue::String(format!("{other:?}")),
    };
    Ok(value)
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}
