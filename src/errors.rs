//! Errors
//!
//! Custom error types used throughout the `shapley_sampling` crate.
use thiserror::Error;

/// Errors that can occur while estimating Shapley values.
#[derive(Debug, Error, PartialEq)]
pub enum ShapleyError {
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// No column was selected for the given purpose.
    #[error("At least one {0} column must be included.")]
    EmptyColumnSelection(String),
    /// The table is missing some of the configured columns.
    #[error("The input table does not contain all {purpose} columns, missing: {}.", .columns.join(", "))]
    MissingColumns { purpose: String, columns: Vec<String> },
    /// A prediction column has a non numeric type.
    #[error("The prediction column '{0}' is not numerical.")]
    NonNumericColumn(String),
    /// The sampling table did not contain any rows.
    #[error("The sampling set may not be empty.")]
    EmptySamplingSet,
    /// A row does not have the same number of features as the sampling set.
    #[error("Expected a row with {expected} features but the row has {found}.")]
    FeatureCountMismatch { expected: usize, found: usize },
    /// A row key was not created by the Shapley row key generator.
    #[error("The row key '{0}' was not created by an instance of this row key generator.")]
    MalformedRowKey(String),
    /// The first row of a batch does not designate a batch start.
    #[error("The row with key '{0}' is not the first row in a row batch.")]
    NotBatchStart(String),
    /// A row belongs to another original row than the current batch.
    #[error("The row with key '{key}' does not belong to the current batch of rows of '{original}'.")]
    ForeignRowKey { key: String, original: String },
    /// The rows of a batch did not arrive in the nested feature/iteration/variant order.
    #[error("The rows corresponding to the original row key '{original}' are not in the expected order, expected '{expected}' but found '{found}'.")]
    UnexpectedOrder {
        original: String,
        expected: String,
        found: String,
    },
    /// The stream ended before all rows of a batch arrived.
    #[error("Not all transformed rows of '{0}' arrived in the loop end.")]
    IncompleteBatch(String),
    /// The stream contains more rows for a batch than expected.
    #[error("More transformed rows than expected arrived in the loop end for '{0}'.")]
    TrailingRows(String),
    /// A prediction cell is not numeric.
    #[error("The prediction column {column} of row '{row}' is not numerical.")]
    NonNumericPrediction { row: String, column: usize },
    /// Execution was canceled by the user.
    #[error("Execution canceled.")]
    Canceled,
    /// An operation was called in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Unable to write configuration.
    #[error("Unable to write configuration: {0}")]
    UnableToWrite(String),
    /// Unable to read configuration.
    #[error("Unable to read configuration: {0}")]
    UnableToRead(String),
}
