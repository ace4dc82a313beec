//! Per-exchange state and record assembly

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::channel::EventChannel;
use crate::collector::ByteCollector;
use crate::record::{Record, RequestHead, ResponseHead};

/// Assembly state of one request/response pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Created at request start; neither side complete
    Open,
    /// Request stream finished first
    RequestDone,
    /// Response stream finished first
    ResponseDone,
    /// Both sides frozen; record published. Terminal.
    Assembled,
    /// Transport error before completion; no record. Terminal.
    Failed,
}

/// Shared handle to one in-flight exchange.
///
/// The request and response taps feed this handle independently; whichever
/// side completes last triggers assembly. The record is built and published
/// exactly once, and only when both streams have fully completed — an
/// exchange that errors never publishes anything.
#[derive(Clone)]
pub struct Exchange {
    inner: Arc<Mutex<ExchangeInner>>,
    channel: EventChannel,
}

struct ExchangeInner {
    state: ExchangeState,
    request: RequestHead,
    request_body: ByteCollector,
    response: Option<ResponseHead>,
    response_body: ByteCollector,
}

impl Exchange {
    /// Open a new exchange for a request head resolved at send time
    #[must_use]
    pub fn new(request: RequestHead, channel: EventChannel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ExchangeInner {
                state: ExchangeState::Open,
                request,
                request_body: ByteCollector::new(),
                response: None,
                response_body: ByteCollector::new(),
            })),
            channel,
        }
    }

    /// Current assembly state
    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.lock().state
    }

    /// Append a chunk written to the request body.
    ///
    /// Ignored once the request side is frozen or the exchange has failed.
    pub fn push_request_chunk(&self, chunk: Bytes) {
        let mut inner = self.lock();
        match inner.state {
            ExchangeState::Open | ExchangeState::ResponseDone => {
                inner.request_body.push(chunk);
            }
            _ => debug!("request chunk after freeze; dropped from capture"),
        }
    }

    /// Freeze the request side. Idempotent; assembles when the response
    /// side already completed.
    pub fn finish_request(&self) {
        let record = {
            let mut inner = self.lock();
            match inner.state {
                ExchangeState::Open => {
                    inner.state = ExchangeState::RequestDone;
                    None
                }
                ExchangeState::ResponseDone => inner.assemble(),
                _ => None,
            }
        };
        self.publish(record);
    }

    /// Attach the response head, captured before any consumer processing
    pub fn set_response(&self, head: ResponseHead) {
        let mut inner = self.lock();
        match inner.state {
            ExchangeState::Open | ExchangeState::RequestDone => {
                inner.response = Some(head);
            }
            _ => debug!("response head after freeze; dropped from capture"),
        }
    }

    /// Append a chunk received on the response body.
    ///
    /// Ignored once the response side is frozen or the exchange has failed.
    pub fn push_response_chunk(&self, chunk: Bytes) {
        let mut inner = self.lock();
        match inner.state {
            ExchangeState::Open | ExchangeState::RequestDone => {
                inner.response_body.push(chunk);
            }
            _ => debug!("response chunk after freeze; dropped from capture"),
        }
    }

    /// Freeze the response side. Idempotent; assembles when the request
    /// side already completed.
    pub fn finish_response(&self) {
        let record = {
            let mut inner = self.lock();
            match inner.state {
                ExchangeState::Open => {
                    inner.state = ExchangeState::ResponseDone;
                    None
                }
                ExchangeState::RequestDone => inner.assemble(),
                _ => None,
            }
        };
        self.publish(record);
    }

    /// Mark the exchange failed: a transport error or abort before both
    /// sides completed. Terminal; no record is ever published for it.
    pub fn fail(&self) {
        let mut inner = self.lock();
        match inner.state {
            ExchangeState::Assembled | ExchangeState::Failed => {}
            _ => {
                debug!(
                    method = %inner.request.method,
                    path = %inner.request.path,
                    "exchange failed before completion; no record"
                );
                inner.state = ExchangeState::Failed;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ExchangeInner> {
        // Tap callbacks never hold the lock across await points, so a
        // poisoned mutex means a panicked subscriber thread; keep capturing.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Publish outside the lock so subscribers may inspect the exchange.
    fn publish(&self, record: Option<Record>) {
        if let Some(record) = record {
            debug!(
                method = %record.request.method,
                path = %record.request.path,
                status = record.response.status,
                "exchange assembled"
            );
            self.channel.publish(&record);
        }
    }
}

impl ExchangeInner {
    /// Freeze the second side and build the record. Caller publishes.
    fn assemble(&mut self) -> Option<Record> {
        let Some(response) = self.response.take() else {
            // Response stream ended without a head; treat as aborted.
            warn!("response completed without a head; discarding exchange");
            self.state = ExchangeState::Failed;
            return None;
        };

        self.state = ExchangeState::Assembled;
        Some(Record {
            request: self.request.clone(),
            request_body: std::mem::take(&mut self.request_body).into_chunks(),
            response,
            response_body: std::mem::take(&mut self.response_body).into_chunks(),
        })
    }
}
