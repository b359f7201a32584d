use thiserror::Error;

/// Errors from reading, editing, or writing MSB data.
#[derive(Debug, Error)]
pub enum MsbError {
    /// The underlying byte source or sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The decoding layer rejected the data (bad magic, unexpected
    /// end of input, no matching subtype variant).
    #[error("failed to decode MSB data: {0:?}")]
    BinRead(binread::Error),

    /// A structural violation not caught by the decoding layer.
    #[error("invalid data at offset {offset:#x}: {reason}")]
    Format { offset: u64, reason: String },

    /// A packed record failed its validation predicate.
    #[error("invalid {record}.{field} at offset {offset:#x}: {reason}")]
    Validation {
        record: &'static str,
        field: &'static str,
        offset: u64,
        reason: String,
    },

    /// An on-disk reference index points outside its entry param.
    #[error("reference index {index} is out of range for {param} ({count} entries)")]
    BadReferenceIndex {
        param: &'static str,
        index: i32,
        count: usize,
    },

    /// A live reference points at an entry that is no longer in the map.
    #[error("entry \"{from}\" references \"{target}\", which is not in the map")]
    DanglingReference { from: String, target: String },

    /// The data model is in a state that cannot be serialized.
    #[error("{0}")]
    Invariant(String),

    /// Context added by the path-based entry points.
    #[error("failed to {operation} `{path}`: {source}")]
    File {
        path: String,
        operation: &'static str,
        #[source]
        source: Box<MsbError>,
    },
}

impl From<binread::Error> for MsbError {
    fn from(e: binread::Error) -> Self {
        match e {
            binread::Error::Io(io) => Self::Io(io),
            other => Self::BinRead(other),
        }
    }
}

impl MsbError {
    pub(crate) fn format(offset: u64, reason: impl Into<String>) -> Self {
        Self::Format {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::Invariant(reason.into())
    }

    pub(crate) fn in_file(self, path: &std::path::Path, operation: &'static str) -> Self {
        Self::File {
            path: path.display().to_string(),
            operation,
            source: Box::new(self),
        }
    }
}
