// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! SSE stream client
//!
//! Opens a single POST request to a streaming endpoint and yields parsed
//! [`SseMessage`]s until clean end of stream, a transport failure, or
//! cancellation. The client never reconnects on its own; callers retry
//! with [`super::Backoff`] and may resume by passing the last seen event
//! id, which is sent in a `Last-Event-ID` request header.

use std::pin::Pin;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, DeckError, Result};
use crate::sse::parser::{SseMessage, SseParser};

/// A streaming request to an SSE endpoint
#[derive(Debug, Clone)]
pub struct SseRequest {
    /// Endpoint URL
    pub url: String,
    /// JSON request body
    pub body: serde_json::Value,
    /// Extra request headers (authorization and the like)
    pub headers: Vec<(String, String)>,
    /// Resumption id from a previous connection, sent as `Last-Event-ID`
    pub last_event_id: Option<String>,
}

impl SseRequest {
    /// Create a request with no extra headers
    pub fn new(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            body,
            headers: Vec::new(),
            last_event_id: None,
        }
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the resumption id for reconnection
    pub fn with_last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }
}

/// Single-connection SSE client
#[derive(Clone)]
pub struct SseClient {
    client: Client,
}

impl SseClient {
    /// Create a client with a fresh connection pool
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a client around an existing `reqwest` client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Open the stream, yielding messages until end of stream, a fatal
    /// error, or cancellation.
    ///
    /// A non-success HTTP status surfaces as [`ApiError::ServerError`]
    /// before any message is yielded. A mid-stream transport failure
    /// surfaces as [`ApiError::StreamError`]. Cancellation surfaces as
    /// [`ApiError::Cancelled`] so callers can distinguish an interrupted
    /// stream from a completed one; in every case the underlying body
    /// reader is dropped when the stream ends.
    pub fn stream(
        &self,
        request: SseRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Stream<Item = Result<SseMessage>> + Send>> {
        let client = self.client.clone();

        let stream = try_stream! {
            let mut req = client
                .post(&request.url)
                .header("accept", "text/event-stream")
                .json(&request.body);
            for (name, value) in &request.headers {
                req = req.header(name.as_str(), value.as_str());
            }
            if let Some(id) = &request.last_event_id {
                req = req.header("last-event-id", id.as_str());
            }

            let response = tokio::select! {
                _ = cancel.cancelled() => Err(DeckError::Api(ApiError::Cancelled)),
                result = req.send() => {
                    result.map_err(|e| DeckError::Api(ApiError::Network(e.to_string())))
                }
            }?;

            // A non-success status is a server answer, not a transport
            // fault; the body is the error message, not an event stream.
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response.text().await.unwrap_or_default();
                Err::<(), DeckError>(DeckError::Api(ApiError::ServerError { status, message }))?;
                return;
            }

            let mut parser = SseParser::new();
            let mut bytes = response.bytes_stream();

            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        Err(DeckError::Api(ApiError::Cancelled))
                    }
                    chunk = bytes.next() => Ok(chunk),
                }?;

                match chunk {
                    Some(Ok(bytes)) => {
                        for msg in parser.feed(&bytes) {
                            yield msg;
                        }
                    }
                    Some(Err(e)) => {
                        Err::<(), DeckError>(DeckError::Api(ApiError::StreamError(
                            e.to_string(),
                        )))?;
                        break;
                    }
                    None => {
                        // Clean end of stream; a final unterminated
                        // message is still dispatched.
                        if let Some(last) = parser.finish() {
                            yield last;
                        }
                        break;
                    }
                }
            }
        };

        Box::pin(stream)
    }
}

impl Default for SseClient {
    fn default() -> Self {
        Self::new()
    }
}
