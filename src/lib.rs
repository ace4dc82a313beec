//! Httptap - transparent capture of outbound HTTP/HTTPS traffic
//!
//! Taps sit on the request write path and the response read path of an
//! instrumented client, mirror every byte as it crosses the transport
//! boundary, and publish one byte-exact [`Record`] per completed exchange.
//! Capture never alters what the application sends or receives.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod channel;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod exchange;
pub mod interceptor;
pub mod record;
pub mod tap;

pub use channel::{EventChannel, SubscriptionId};
pub use client::CapturedClient;
pub use config::CaptureConfig;
pub use error::{Result, TapError};
pub use interceptor::Interceptor;
pub use record::{Record, RequestHead, ResponseHead, Scheme};
pub use tap::{CapturedBody, RequestBodyWriter, WriteEncoding};
