// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! TaskMesh status/error types.
//!
//! Caller-precondition violations in the scheduling core are fatal and do
//! not go through this type; `TaskMeshError` covers the fallible surfaces
//! that consume external input (wire payloads, config strings).

use std::fmt;

/// Status codes for fallible operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    OK,
    Invalid,
    KeyError,
    NotFound,
    IOError,
    UnknownError,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OK => "OK",
            Self::Invalid => "Invalid",
            Self::KeyError => "KeyError",
            Self::NotFound => "NotFound",
            Self::IOError => "IOError",
            Self::UnknownError => "UnknownError",
        }
    }
}

/// An error carrying a status code and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMeshError {
    code: StatusCode,
    message: String,
}

impl TaskMeshError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Invalid, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::IOError, message)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskMeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for TaskMeshError {}

pub type Result<T> = std::result::Result<T, TaskMeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TaskMeshError::invalid("bad record");
        assert_eq!(err.to_string(), "Invalid: bad record");
        assert_eq!(err.code(), StatusCode::Invalid);
        assert_eq!(err.message(), "bad record");
    }

    #[test]
    fn test_status_code_names() {
        assert_eq!(StatusCode::OK.as_str(), "OK");
        assert_eq!(StatusCode::NotFound.as_str(), "NotFound");
    }
}
