use thiserror::Error;

pub type FinanceResult<T> = Result<T, FinanceError>;

#[derive(Debug, Error)]
pub enum FinanceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },
}

impl FinanceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND_ERROR",
            Self::Conflict(_) => "CONFLICT_ERROR",
            Self::Database { .. } | Self::Io { .. } => "STORAGE_ERROR",
            Self::Serialization { .. } | Self::Csv { .. } => "INTERNAL_ERROR",
        }
    }
}

pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> FinanceResult<T>;
}

impl<T> ResultExt<T> for Result<T, rusqlite::Error> {
    fn context(self, context: impl Into<String>) -> FinanceResult<T> {
        self.map_err(|source| FinanceError::Database {
            context: context.into(),
            source,
        })
    }
}

impl<T> ResultExt<T> for Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> FinanceResult<T> {
        self.map_err(|source| FinanceError::Io {
            context: context.into(),
            source,
        })
    }
}

impl<T> ResultExt<T> for Result<T, serde_json::Error> {
    fn context(self, context: impl Into<String>) -> FinanceResult<T> {
        self.map_err(|source| FinanceError::Serialization {
            context: context.into(),
            source,
        })
    }
}

impl<T> ResultExt<T> for Result<T, csv::Error> {
    fn context(self, context: impl Into<String>) -> FinanceResult<T> {
        self.map_err(|source| FinanceError::Csv {
            context: context.into(),
            source,
        })
    }
}
