//! Domain error types.

use chrono::NaiveDateTime;

/// Per-step failures raised while executing a single row.
///
/// None of these abort a run: the engine logs them and moves on to the next
/// row. The account is never left half-updated when one is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("insufficient capital: cash {cash:.2} cannot cover any quantity at {price}")]
    InsufficientCapital { cash: f64, price: f64 },

    #[error("insufficient position: requested {requested}, held {held}")]
    InsufficientPosition { requested: f64, held: f64 },

    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("data gap at {timestamp}: missing {field}")]
    DataGap {
        timestamp: NaiveDateTime,
        field: String,
    },

    #[error("fill at {timestamp} precedes last recorded fill at {last}")]
    OutOfOrderFill {
        timestamp: NaiveDateTime,
        last: NaiveDateTime,
    },
}

/// Top-level error type for chaintrader.
#[derive(Debug, thiserror::Error)]
pub enum ChaintraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy type: {name}")]
    UnknownStrategy { name: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no rows to backtest{}", range_suffix(.start, .end))]
    EmptyInputRange {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn range_suffix(start: &Option<NaiveDateTime>, end: &Option<NaiveDateTime>) -> String {
    match (start, end) {
        (None, None) => String::new(),
        (Some(s), None) => format!(" from {s}"),
        (None, Some(e)) => format!(" until {e}"),
        (Some(s), Some(e)) => format!(" between {s} and {e}"),
    }
}

impl From<&ChaintraderError> for std::process::ExitCode {
    fn from(err: &ChaintraderError) -> Self {
        let code: u8 = match err {
            ChaintraderError::Io(_) | ChaintraderError::Execution(_) => 1,
            ChaintraderError::ConfigParse { .. }
            | ChaintraderError::ConfigMissing { .. }
            | ChaintraderError::ConfigInvalid { .. } => 2,
            ChaintraderError::Data { .. } => 3,
            ChaintraderError::UnknownStrategy { .. } => 4,
            ChaintraderError::EmptyInputRange { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
