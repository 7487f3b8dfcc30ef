/*!
The result envelope returned by every public controller operation.
*/

use crate::status::StatusCode;
use serde::{Deserialize, Serialize};

/// A value (present iff the operation succeeded) plus the normalised status code.
///
/// A successful outcome normally carries [`StatusCode::Success`], but may carry an
/// informational code instead: a redundant `close` reports `NotOpen`, a redundant
/// `abort` reports `NotAcquiring`, and a temperature poll reports the cooler state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Outcome<T> {
    value: Option<T>,
    code: StatusCode,
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self {
            value: Some(value),
            code: StatusCode::Success,
        }
    }

    /// A success that reports something other than plain `Success`.
    pub fn informational(value: T, code: StatusCode) -> Self {
        Self {
            value: Some(value),
            code,
        }
    }

    pub fn failure(code: StatusCode) -> Self {
        Self { value: None, code }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: self.value.map(f),
            code: self.code,
        }
    }

    /// Outcome of an operation whose success carries its own status code.
    pub fn reported(result: Result<(T, StatusCode), StatusCode>) -> Self {
        match result {
            Ok((value, code)) => Self::informational(value, code),
            Err(code) => Self::failure(code),
        }
    }

    /// The value, or the failure code as an error.
    pub fn into_result(self) -> Result<T, StatusCode> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(self.code),
        }
    }
}

impl<T> From<Result<T, StatusCode>> for Outcome<T> {
    fn from(result: Result<T, StatusCode>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(code) => Self::failure(code),
        }
    }
}
