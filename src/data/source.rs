use std::{ops::Range, sync::Arc};

use ndarray::{Array2, Axis, concatenate};
use polars::prelude::DataFrame;
use tracing::debug;

use crate::{
    data::metadata::DatasetMetadata,
    error::{DataError, MarketGymResult},
};

/// Random-access handle over the strictly time-ordered rows of one dataset.
///
/// Rows are flat `f64` vectors whose layout is described by the dataset's
/// [`ColumnSchema`](crate::data::metadata::ColumnSchema). Implementations
/// must return rows in ascending time order and never re-order them.
pub trait RowReader: Send + Sync {
    fn n_rows(&self) -> usize;

    /// Materializes the rows in `range` as a `(rows, features)` matrix.
    fn read(&self, range: Range<usize>) -> MarketGymResult<Array2<f64>>;
}

/// External data collaborator: resolves a dataset name to its immutable
/// metadata and a row handle.
///
/// Passing `None` selects all datasets of the source, joined column-wise
/// into one wider asset universe.
pub trait MarketSource {
    fn open(
        &self,
        dataset_name: Option<&str>,
    ) -> MarketGymResult<(DatasetMetadata, Arc<dyn RowReader>)>;
}

// ================================================================================================
// In-memory implementation
// ================================================================================================

/// Row reader backed by a fully materialized matrix.
#[derive(Debug, Clone)]
pub struct InMemoryReader {
    rows: Array2<f64>,
}

impl InMemoryReader {
    pub fn new(rows: Array2<f64>, metadata: &DatasetMetadata) -> MarketGymResult<Self> {
        let width = rows.ncols();
        if width != metadata.n_features() {
            return Err(DataError::RowWidthMismatch {
                expected: metadata.n_features(),
                got: width,
            }
            .into());
        }
        if rows.nrows() == 0 {
            return Err(DataError::EmptyDataset(metadata.name().to_string()).into());
        }
        Ok(Self { rows })
    }

    /// Extracts rows from a polars frame whose columns are named
    /// `{asset}_{column}` in metadata order.
    pub fn from_frame(df: &DataFrame, metadata: &DatasetMetadata) -> MarketGymResult<Self> {
        let n_rows = df.height();
        let n_features = metadata.n_features();
        let mut rows = Array2::<f64>::zeros((n_rows, n_features));

        let mut flat_idx = 0;
        for asset in metadata.assets() {
            for column in metadata.schema().column_names() {
                let name = format!("{asset}_{column}");
                let ca = df
                    .column(&name)
                    .map_err(|e| DataError::DataFrame(format!("missing column '{name}': {e}")))?
                    .f64()
                    .map_err(|e| {
                        DataError::DataFrame(format!("column '{name}' is not f64: {e}"))
                    })?;

                for (row_idx, value) in ca.into_iter().enumerate() {
                    let v = value.ok_or_else(|| {
                        DataError::DataFrame(format!("null value in '{name}' at row {row_idx}"))
                    })?;
                    rows[(row_idx, flat_idx)] = v;
                }
                flat_idx += 1;
            }
        }

        debug!(
            dataset = metadata.name(),
            n_rows, n_features, "extracted rows from data frame"
        );
        Self::new(rows, metadata)
    }
}

impl RowReader for InMemoryReader {
    fn n_rows(&self) -> usize {
        self.rows.nrows()
    }

    fn read(&self, range: Range<usize>) -> MarketGymResult<Array2<f64>> {
        if range.end > self.rows.nrows() || range.start > range.end {
            return Err(DataError::RowsOutOfBounds {
                start: range.start,
                end: range.end,
                n_rows: self.rows.nrows(),
            }
            .into());
        }
        Ok(self.rows.slice(ndarray::s![range, ..]).to_owned())
    }
}

/// Source holding one or more named in-memory datasets.
#[derive(Default)]
pub struct InMemorySource {
    datasets: Vec<(DatasetMetadata, Arc<InMemoryReader>)>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(
        mut self,
        metadata: DatasetMetadata,
        rows: Array2<f64>,
    ) -> MarketGymResult<Self> {
        let reader = InMemoryReader::new(rows, &metadata)?;
        self.datasets.push((metadata, Arc::new(reader)));
        Ok(self)
    }
}

impl MarketSource for InMemorySource {
    fn open(
        &self,
        dataset_name: Option<&str>,
    ) -> MarketGymResult<(DatasetMetadata, Arc<dyn RowReader>)> {
        match dataset_name {
            Some(name) => {
                let (metadata, reader) = self
                    .datasets
                    .iter()
                    .find(|(md, _)| md.name() == name)
                    .ok_or_else(|| DataError::DatasetNotFound(name.to_string()))?;
                Ok((metadata.clone(), reader.clone()))
            }
            None => self.open_joined(),
        }
    }
}

impl InMemorySource {
    /// Joins every dataset of the source column-wise: one wider universe,
    /// identical row count required.
    fn open_joined(&self) -> MarketGymResult<(DatasetMetadata, Arc<dyn RowReader>)> {
        let mut iter = self.datasets.iter();
        let (first_md, first_reader) = iter.next().ok_or(DataError::EmptySource)?;

        let mut metadata = first_md.clone();
        let mut parts = vec![first_reader.rows.view()];

        for (md, reader) in iter {
            if reader.n_rows() != first_reader.n_rows() {
                return Err(DataError::IncompatibleJoin(format!(
                    "dataset '{}' has {} rows, expected {}",
                    md.name(),
                    reader.n_rows(),
                    first_reader.n_rows()
                ))
                .into());
            }
            metadata = metadata.join(md)?;
            parts.push(reader.rows.view());
        }

        let rows = concatenate(Axis(1), &parts)
            .map_err(|e| DataError::IncompatibleJoin(e.to_string()))?;
        let reader = InMemoryReader::new(rows, &metadata)?;
        Ok((metadata, Arc::new(reader)))
    }
}
