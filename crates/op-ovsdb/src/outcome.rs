//! Terminal result of a logical request

use std::fmt;

use crate::error::OvsdbError;
use crate::notation::RowUuid;

/// Status taxonomy handed back to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    /// One operation in the batch carried an error
    OperationFailed,
    /// The server returned more results than operations were sent
    ProtocolAnomaly,
    /// A precondition row is missing from the local cache
    NotFound,
    /// No usable connection to the server
    ServiceUnavailable,
    InternalError,
    NotImplemented,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Success => "success",
            StatusCode::OperationFailed => "operation failed",
            StatusCode::ProtocolAnomaly => "protocol anomaly",
            StatusCode::NotFound => "not found",
            StatusCode::ServiceUnavailable => "service unavailable",
            StatusCode::InternalError => "internal error",
            StatusCode::NotImplemented => "not implemented",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status per logical request, plus the committed uuid of the row it
/// created when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    code: StatusCode,
    description: Option<String>,
    uuid: Option<RowUuid>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            description: None,
            uuid: None,
        }
    }

    pub fn success_with_uuid(uuid: RowUuid) -> Self {
        Self {
            code: StatusCode::Success,
            description: None,
            uuid: Some(uuid),
        }
    }

    pub fn failure(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
            uuid: None,
        }
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::failure(StatusCode::NotFound, description)
    }

    pub fn not_implemented(description: impl Into<String>) -> Self {
        Self::failure(StatusCode::NotImplemented, description)
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Committed uuid of the inserted row, if the request asked for one
    pub fn uuid(&self) -> Option<&RowUuid> {
        self.uuid.as_ref()
    }

    pub fn into_uuid(self) -> Option<RowUuid> {
        self.uuid
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(description) = &self.description {
            write!(f, ": {}", description)?;
        }
        if let Some(uuid) = &self.uuid {
            write!(f, " ({})", uuid)?;
        }
        Ok(())
    }
}

impl From<OvsdbError> for Outcome {
    fn from(err: OvsdbError) -> Self {
        let code = match &err {
            OvsdbError::NotFound(_) => StatusCode::NotFound,
            OvsdbError::OperationFailed { .. } => StatusCode::OperationFailed,
            OvsdbError::ProtocolAnomaly(_) => StatusCode::ProtocolAnomaly,
            e if e.is_connection_failure() => StatusCode::ServiceUnavailable,
            _ => StatusCode::InternalError,
        };
        Outcome::failure(code, err.to_string())
    }
}
