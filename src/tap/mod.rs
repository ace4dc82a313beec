//! Request and response taps
//!
//! A tap observes one direction of an exchange without disturbing it: the
//! request tap mirrors every chunk the caller writes before the transport
//! sends it, and the response tap mirrors every chunk the transport
//! receives before the consumer reads it. Both report completion to the
//! shared [`Exchange`](crate::exchange::Exchange).

mod request;
mod response;

pub use request::{ChannelBody, RequestBodyWriter, WriteEncoding};
pub use response::CapturedBody;

pub(crate) use response::tap_response;
