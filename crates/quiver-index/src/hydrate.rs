//! Bulk hydration from Arrow IPC edge streams.
//!
//! The durable store hands the index a byte buffer containing an Arrow IPC
//! stream of edge rows. Record batches are consumed one at a time, never
//! materializing the full decoded form, and each row is interned and appended
//! to the topology with its validity interval preserved.
//!
//! ## Expected schema
//!
//! Exactly these columns, in any order (extra columns are ignored):
//!
//! | column       | type             | nulls                          |
//! |--------------|------------------|--------------------------------|
//! | `source`     | utf8             | no                             |
//! | `target`     | utf8             | no                             |
//! | `type`       | utf8             | no                             |
//! | `valid_from` | int64 or float64 | no (microseconds since epoch)  |
//! | `valid_to`   | int64 or float64 | yes (null means still active)  |
//!
//! Schema violations are detected before any row of the offending batch is
//! applied, so failures are all-or-nothing at batch granularity. After a
//! successful load the caller is expected (not required) to
//! [`compact`](crate::GraphIndex::compact).

use crate::config::QuiverConfig;
use crate::topology::AllocError;
use crate::GraphIndex;
use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Schema};
use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use arrow::record_batch::RecordBatch;
use quiver_core::STILL_ACTIVE;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

/// Errors that can occur during Arrow hydration.
#[derive(Debug, Error)]
pub enum HydrateError {
    /// The stream decoded but its schema does not match the edge contract.
    #[error("arrow schema mismatch: {0}")]
    Schema(String),

    /// The IPC framing or a record batch failed to decode.
    #[error("arrow decode error: {0}")]
    Decode(#[from] ArrowError),

    /// File access failed (file-based loading only).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Adjacency growth failed while applying rows.
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Result type for hydration operations.
pub type Result<T> = std::result::Result<T, HydrateError>;

/// Resolved column positions for the edge schema.
struct EdgeColumns {
    source: usize,
    target: usize,
    etype: usize,
    valid_from: usize,
    valid_to: usize,
}

impl EdgeColumns {
    fn resolve(schema: &Schema) -> Result<Self> {
        let utf8 = |name: &str| -> Result<usize> {
            let (idx, field) = schema
                .column_with_name(name)
                .ok_or_else(|| HydrateError::Schema(format!("missing required column `{name}`")))?;
            if field.data_type() != &DataType::Utf8 {
                return Err(HydrateError::Schema(format!(
                    "column `{name}` must be utf8, found {}",
                    field.data_type()
                )));
            }
            Ok(idx)
        };
        let micros = |name: &str| -> Result<usize> {
            let (idx, field) = schema
                .column_with_name(name)
                .ok_or_else(|| HydrateError::Schema(format!("missing required column `{name}`")))?;
            match field.data_type() {
                DataType::Int64 | DataType::Float64 => Ok(idx),
                other => Err(HydrateError::Schema(format!(
                    "column `{name}` must be int64 or float64, found {other}"
                ))),
            }
        };
        Ok(Self {
            source: utf8("source")?,
            target: utf8("target")?,
            etype: utf8("type")?,
            valid_from: micros("valid_from")?,
            valid_to: micros("valid_to")?,
        })
    }
}

/// A timestamp column in either of its accepted physical types.
/// Float values carry microseconds and are truncated.
enum TimeColumn<'a> {
    Int(&'a Int64Array),
    Float(&'a Float64Array),
}

impl<'a> TimeColumn<'a> {
    fn downcast(name: &str, array: &'a dyn Array) -> Result<Self> {
        if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
            Ok(TimeColumn::Int(ints))
        } else if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
            Ok(TimeColumn::Float(floats))
        } else {
            Err(HydrateError::Schema(format!(
                "column `{name}` must be int64 or float64, found {}",
                array.data_type()
            )))
        }
    }

    fn null_count(&self) -> usize {
        match self {
            TimeColumn::Int(a) => a.null_count(),
            TimeColumn::Float(a) => a.null_count(),
        }
    }

    fn is_null(&self, row: usize) -> bool {
        match self {
            TimeColumn::Int(a) => a.is_null(row),
            TimeColumn::Float(a) => a.is_null(row),
        }
    }

    fn value(&self, row: usize) -> i64 {
        match self {
            TimeColumn::Int(a) => a.value(row),
            TimeColumn::Float(a) => a.value(row) as i64,
        }
    }
}

fn downcast_utf8<'a>(name: &str, array: &'a dyn Array) -> Result<&'a StringArray> {
    array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| {
            HydrateError::Schema(format!(
                "column `{name}` must be utf8, found {}",
                array.data_type()
            ))
        })
}

impl GraphIndex {
    /// Hydrates the index from an Arrow IPC stream held in memory.
    ///
    /// Returns the number of edge rows applied. On error, batches decoded
    /// before the failure remain applied; the caller is expected to discard
    /// the index and retry from the source of truth.
    pub fn load_arrow_stream(&mut self, bytes: &[u8]) -> Result<usize> {
        let started = Instant::now();
        let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
        let columns = EdgeColumns::resolve(&reader.schema())?;

        let mut total = 0usize;
        for batch in reader {
            let batch = batch?;
            let rows = self.apply_edge_batch(&batch, &columns)?;
            tracing::debug!(rows, "hydrated arrow batch");
            total += rows;
        }

        tracing::info!(
            edges = total,
            nodes = self.node_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "arrow hydration complete"
        );
        Ok(total)
    }

    /// Reads an Arrow IPC stream file and hydrates from it.
    pub fn load_arrow_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let bytes = std::fs::read(path)?;
        self.load_arrow_stream(&bytes)
    }

    /// Configuration-driven hydration: loads the stream, compacts when
    /// `hydration.compact_after_load` is set, and warns when the resulting
    /// topology exceeds the configured memory limit.
    pub fn hydrate_with(&mut self, bytes: &[u8], config: &QuiverConfig) -> Result<usize> {
        let edges = self.load_arrow_stream(bytes)?;
        if config.hydration.compact_after_load {
            self.compact();
        }
        if let Some(limit_mb) = config.memory.limit_mb {
            let stats = self.stats();
            let limit = limit_mb * 1024 * 1024;
            let warn_at = (limit as f64 * config.memory.warn_percent / 100.0) as usize;
            if stats.memory_bytes >= warn_at {
                tracing::warn!(
                    memory_bytes = stats.memory_bytes,
                    limit_mb,
                    "topology memory near configured limit"
                );
            }
        }
        Ok(edges)
    }

    /// Validates one record batch against the edge contract and applies its
    /// rows. Validation happens entirely before the first insert, keeping the
    /// batch all-or-nothing.
    fn apply_edge_batch(&mut self, batch: &RecordBatch, columns: &EdgeColumns) -> Result<usize> {
        let source = downcast_utf8("source", batch.column(columns.source).as_ref())?;
        let target = downcast_utf8("target", batch.column(columns.target).as_ref())?;
        let etype = downcast_utf8("type", batch.column(columns.etype).as_ref())?;
        let valid_from =
            TimeColumn::downcast("valid_from", batch.column(columns.valid_from).as_ref())?;
        let valid_to = TimeColumn::downcast("valid_to", batch.column(columns.valid_to).as_ref())?;

        for (name, nulls) in [
            ("source", source.null_count()),
            ("target", target.null_count()),
            ("type", etype.null_count()),
            ("valid_from", valid_from.null_count()),
        ] {
            if nulls > 0 {
                return Err(HydrateError::Schema(format!(
                    "column `{name}` contains {nulls} null(s)"
                )));
            }
        }

        for row in 0..batch.num_rows() {
            let src = self.intern_node(source.value(row))?;
            let dst = self.intern_node(target.value(row))?;
            let t = self.intern_etype(etype.value(row));
            let vf = valid_from.value(row);
            let vt = if valid_to.is_null(row) {
                STILL_ACTIVE
            } else {
                valid_to.value(row)
            };
            self.insert_edge(src, dst, t, vf, vt)?;
        }
        Ok(batch.num_rows())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::Field;
    use arrow::ipc::writer::StreamWriter;
    use quiver_core::NOW;
    use std::sync::Arc;

    fn utf8_col(values: &[&str]) -> ArrayRef {
        Arc::new(StringArray::from(values.to_vec()))
    }

    fn edges_ipc(
        sources: &[&str],
        targets: &[&str],
        types: &[&str],
        valid_from: &[i64],
        valid_to: &[Option<i64>],
    ) -> Vec<u8> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("source", DataType::Utf8, false),
            Field::new("target", DataType::Utf8, false),
            Field::new("type", DataType::Utf8, false),
            Field::new("valid_from", DataType::Int64, false),
            Field::new("valid_to", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                utf8_col(sources),
                utf8_col(targets),
                utf8_col(types),
                Arc::new(Int64Array::from(valid_from.to_vec())),
                Arc::new(Int64Array::from(valid_to.to_vec())),
            ],
        )
        .unwrap();
        write_stream(&schema, &[batch])
    }

    fn write_stream(schema: &Arc<Schema>, batches: &[RecordBatch]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut buf, schema).unwrap();
            for batch in batches {
                writer.write(batch).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_load_basic_stream() {
        let bytes = edges_ipc(
            &["a", "b"],
            &["b", "c"],
            &["NEXT", "NEXT"],
            &[0, 0],
            &[None, None],
        );
        let mut index = GraphIndex::new();
        assert_eq!(index.load_arrow_stream(&bytes).unwrap(), 2);

        let a = index.lookup_node("a").unwrap();
        let b = index.lookup_node("b").unwrap();
        let t = index.lookup_etype("NEXT").unwrap();
        assert_eq!(index.active_out(a, t, NOW), vec![b]);
        assert_eq!(index.node_count(), 3);
    }

    #[test]
    fn test_null_valid_to_means_active() {
        let bytes = edges_ipc(
            &["a", "a"],
            &["b", "c"],
            &["LINK", "LINK"],
            &[1_000, 1_000],
            &[None, Some(2_000)],
        );
        let mut index = GraphIndex::new();
        index.load_arrow_stream(&bytes).unwrap();

        let a = index.lookup_node("a").unwrap();
        let t = index.lookup_etype("LINK").unwrap();
        let now_peers = index.active_out(a, t, NOW);
        assert_eq!(now_peers, vec![index.lookup_node("b").unwrap()]);
        assert_eq!(index.active_out(a, t, 1_500).len(), 2);
    }

    #[test]
    fn test_float_timestamps_accepted() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("source", DataType::Utf8, false),
            Field::new("target", DataType::Utf8, false),
            Field::new("type", DataType::Utf8, false),
            Field::new("valid_from", DataType::Float64, false),
            Field::new("valid_to", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                utf8_col(&["a"]),
                utf8_col(&["b"]),
                utf8_col(&["LINK"]),
                Arc::new(Float64Array::from(vec![1_000.0])),
                Arc::new(Float64Array::from(vec![Some(2_000.5)])),
            ],
        )
        .unwrap();
        let bytes = write_stream(&schema, &[batch]);

        let mut index = GraphIndex::new();
        index.load_arrow_stream(&bytes).unwrap();
        let a = index.lookup_node("a").unwrap();
        let t = index.lookup_etype("LINK").unwrap();
        assert_eq!(index.active_out(a, t, 1_500).len(), 1);
        assert!(index.active_out(a, t, 2_000).is_empty());
    }

    #[test]
    fn test_extra_columns_ignored() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("weight", DataType::Float64, true),
            Field::new("target", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("type", DataType::Utf8, false),
            Field::new("valid_from", DataType::Int64, false),
            Field::new("valid_to", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Float64Array::from(vec![Some(0.5)])),
                utf8_col(&["b"]),
                utf8_col(&["a"]),
                utf8_col(&["LINK"]),
                Arc::new(Int64Array::from(vec![0])),
                Arc::new(Int64Array::from(vec![None::<i64>])),
            ],
        )
        .unwrap();
        let bytes = write_stream(&schema, &[batch]);

        let mut index = GraphIndex::new();
        assert_eq!(index.load_arrow_stream(&bytes).unwrap(), 1);
        // Column order did not matter either.
        let a = index.lookup_node("a").unwrap();
        let t = index.lookup_etype("LINK").unwrap();
        assert_eq!(index.active_out(a, t, NOW).len(), 1);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("source", DataType::Utf8, false),
            Field::new("target", DataType::Utf8, false),
            Field::new("valid_from", DataType::Int64, false),
            Field::new("valid_to", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                utf8_col(&["a"]),
                utf8_col(&["b"]),
                Arc::new(Int64Array::from(vec![0])),
                Arc::new(Int64Array::from(vec![None::<i64>])),
            ],
        )
        .unwrap();
        let bytes = write_stream(&schema, &[batch]);

        let mut index = GraphIndex::new();
        let err = index.load_arrow_stream(&bytes).unwrap_err();
        assert!(matches!(err, HydrateError::Schema(_)), "{err}");
        assert!(index.is_empty());
    }

    #[test]
    fn test_wrong_type_is_schema_error() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("source", DataType::Int64, false),
            Field::new("target", DataType::Utf8, false),
            Field::new("type", DataType::Utf8, false),
            Field::new("valid_from", DataType::Int64, false),
            Field::new("valid_to", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1])),
                utf8_col(&["b"]),
                utf8_col(&["LINK"]),
                Arc::new(Int64Array::from(vec![0])),
                Arc::new(Int64Array::from(vec![None::<i64>])),
            ],
        )
        .unwrap();
        let bytes = write_stream(&schema, &[batch]);

        let mut index = GraphIndex::new();
        let err = index.load_arrow_stream(&bytes).unwrap_err();
        assert!(matches!(err, HydrateError::Schema(_)), "{err}");
    }

    #[test]
    fn test_garbage_bytes_are_decode_error() {
        let mut index = GraphIndex::new();
        let err = index.load_arrow_stream(b"not an arrow stream").unwrap_err();
        assert!(matches!(err, HydrateError::Decode(_)), "{err}");
    }

    #[test]
    fn test_multiple_batches() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("source", DataType::Utf8, false),
            Field::new("target", DataType::Utf8, false),
            Field::new("type", DataType::Utf8, false),
            Field::new("valid_from", DataType::Int64, false),
            Field::new("valid_to", DataType::Int64, true),
        ]));
        let batch = |s: &str, t: &str| {
            RecordBatch::try_new(
                schema.clone(),
                vec![
                    utf8_col(&[s]),
                    utf8_col(&[t]),
                    utf8_col(&["NEXT"]),
                    Arc::new(Int64Array::from(vec![0])),
                    Arc::new(Int64Array::from(vec![None::<i64>])),
                ],
            )
            .unwrap()
        };
        let bytes = write_stream(&schema, &[batch("a", "b"), batch("b", "c")]);

        let mut index = GraphIndex::new();
        assert_eq!(index.load_arrow_stream(&bytes).unwrap(), 2);
        assert_eq!(index.edge_count(), 2);
    }

    #[test]
    fn test_hydrate_with_compacts() {
        let bytes = edges_ipc(
            &["a", "a", "a"],
            &["b", "b", "b"],
            &["K", "K", "K"],
            &[0, 0, 0],
            &[None, None, None],
        );
        let mut index = GraphIndex::new();
        let config = QuiverConfig::default();
        assert_eq!(index.hydrate_with(&bytes, &config).unwrap(), 3);
        // Default config compacts, so the duplicates are suppressed.
        assert_eq!(index.edge_count(), 1);
    }
}
