use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SdkErrorCode {
    InvalidConfiguration,
    Storage,
    Internal,
}

impl SdkErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkErrorCode::InvalidConfiguration => "sdk/invalid-configuration",
            SdkErrorCode::Storage => "sdk/storage",
            SdkErrorCode::Internal => "sdk/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SdkError {
    pub code: SdkErrorCode,
    message: String,
}

impl SdkError {
    pub fn new(code: SdkErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SdkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for SdkError {}

impl From<crate::persistence::StorageError> for SdkError {
    fn from(err: crate::persistence::StorageError) -> Self {
        storage_error(err.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

pub fn invalid_configuration(message: impl Into<String>) -> SdkError {
    SdkError::new(SdkErrorCode::InvalidConfiguration, message)
}

pub fn storage_error(message: impl Into<String>) -> SdkError {
    SdkError::new(SdkErrorCode::Storage, message)
}

pub fn internal_error(message: impl Into<String>) -> SdkError {
    SdkError::new(SdkErrorCode::Internal, message)
}
