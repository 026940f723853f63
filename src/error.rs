// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for the chat session engine
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum DeckError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Tool dispatch errors (unknown tool, duplicate registration)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Persistence-store collaborator errors
    #[error("Store error: {0}")]
    Store(String),

    /// Session/orchestration errors
    #[error("Session error: {0}")]
    Session(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transport and protocol error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from the inference server
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Server returned a non-success status
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Streaming error (mid-stream read failure)
    #[error("Streaming error: {0}")]
    StreamError(String),

    /// The stream was cancelled by the abort signal
    #[error("Stream cancelled")]
    Cancelled,
}

/// Result type alias using DeckError
pub type Result<T> = std::result::Result<T, DeckError>;

impl DeckError {
    /// Whether this error represents user-initiated cancellation rather
    /// than a genuine failure. Cancellation must never surface as an error
    /// to the caller.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DeckError::Api(ApiError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeckError::Tool("duplicate tool name: web_search".to_string());
        assert!(err.to_string().contains("web_search"));

        let err = DeckError::Api(ApiError::ServerError {
            status: 503,
            message: "loading model".to_string(),
        });
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_error_from_api() {
        // Transport failures are always typed ApiError, never a raw
        // variant of their own
        let err: DeckError = ApiError::Network("connection refused".to_string()).into();
        assert!(matches!(err, DeckError::Api(ApiError::Network(_))));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DeckError = io_err.into();
        assert!(matches!(err, DeckError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: DeckError = json_err.into();
        assert!(matches!(err, DeckError::Json(_)));
    }

    #[test]
    fn test_is_cancellation() {
        assert!(DeckError::Api(ApiError::Cancelled).is_cancellation());
        assert!(!DeckError::Api(ApiError::StreamError("eof".into())).is_cancellation());
        assert!(!DeckError::Session("oops".into()).is_cancellation());
    }
}
