//! Request-side tap: writable body with capture

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use hyper::body::{Body, Frame};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::TapError;
use crate::exchange::Exchange;

/// Text encoding of a body write argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEncoding {
    /// Bytes of the string as given
    Utf8,
    /// Standard base64
    Base64,
    /// Lowercase or uppercase hex digits
    Hex,
}

impl WriteEncoding {
    fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Base64 => "base64",
            Self::Hex => "hex",
        }
    }
}

/// Channel-backed request body handed to the transport.
///
/// The transport polls this body for the chunks the caller writes through
/// the paired [`RequestBodyWriter`]; boundaries are preserved one frame per
/// write.
pub struct ChannelBody {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl ChannelBody {
    /// Create a connected writer/body pair.
    ///
    /// `exchange` is `None` when interception is disabled: the writer then
    /// forwards chunks without any capture bookkeeping.
    #[must_use]
    pub fn channel(exchange: Option<Exchange>) -> (RequestBodyWriter, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RequestBodyWriter {
                tx: Some(tx),
                exchange,
            },
            Self { rx },
        )
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut().rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Writable side of an outgoing request body.
///
/// Every chunk is forwarded to the transport exactly as the caller supplied
/// it and mirrored into the exchange's request collector. Completion is
/// signaled exactly once — explicitly via [`end`](Self::end), or on drop, so
/// the wire and the capture always agree. An empty body still completes.
pub struct RequestBodyWriter {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    exchange: Option<Exchange>,
}

impl RequestBodyWriter {
    /// Write one raw chunk
    pub fn write(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        let Some(tx) = &self.tx else {
            debug!("write after end; chunk dropped");
            return;
        };
        // A send failure means the transport abandoned the body; the chunk
        // never reaches the wire, so it is not captured either.
        if tx.send(chunk.clone()).is_ok() {
            if let Some(exchange) = &self.exchange {
                exchange.push_request_chunk(chunk);
            }
        }
    }

    /// Write a text chunk carrying an explicit encoding.
    ///
    /// The text is decoded to the raw bytes the transport actually sends;
    /// the same raw bytes are captured. Malformed input falls back to
    /// sending and capturing the text bytes as given — a capture-local
    /// failure never aborts the send.
    pub fn write_encoded(&mut self, text: &str, encoding: WriteEncoding) {
        match decode_text(text, encoding) {
            Ok(raw) => self.write(raw),
            Err(e) => {
                warn!(error = %e, "encoded write did not decode; using raw bytes");
                self.write(Bytes::copy_from_slice(text.as_bytes()));
            }
        }
    }

    /// Finish the body. Idempotent; signals request completion exactly once.
    pub fn end(&mut self) {
        if self.tx.take().is_some() {
            if let Some(exchange) = self.exchange.take() {
                exchange.finish_request();
            }
        }
    }

    /// Write a final chunk, then finish
    pub fn end_with(&mut self, chunk: impl Into<Bytes>) {
        self.write(chunk);
        self.end();
    }
}

impl Drop for RequestBodyWriter {
    fn drop(&mut self) {
        // Dropping the sender ends the body on the wire; mirror that in
        // the capture so the exchange can still assemble.
        self.end();
    }
}

fn decode_text(text: &str, encoding: WriteEncoding) -> crate::Result<Bytes> {
    match encoding {
        WriteEncoding::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
        WriteEncoding::Base64 => BASE64
            .decode(text)
            .map(Bytes::from)
            .map_err(|e| TapError::Decode {
                encoding: encoding.name(),
                reason: e.to_string(),
            }),
        WriteEncoding::Hex => hex::decode(text)
            .map(Bytes::from)
            .map_err(|e| TapError::Decode {
                encoding: encoding.name(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::EventChannel;
    use crate::record::{Record, RequestHead, ResponseHead, Scheme};
    use http_body_util::BodyExt;
    use std::sync::{Arc, Mutex};

    fn tapped_pair() -> (RequestBodyWriter, ChannelBody, Exchange, Arc<Mutex<Vec<Record>>>) {
        let channel = EventChannel::new();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let records = Arc::clone(&sink);
        channel.subscribe(move |record| {
            records.lock().unwrap().push(record.clone());
            Ok(())
        });

        let exchange = Exchange::new(
            RequestHead {
                method: "POST".to_string(),
                scheme: Scheme::Http,
                host: "example.com".to_string(),
                path: "/path".to_string(),
                headers: vec![],
            },
            channel,
        );
        let (writer, body) = ChannelBody::channel(Some(exchange.clone()));
        (writer, body, exchange, sink)
    }

    fn complete_response(exchange: &Exchange) {
        exchange.set_response(ResponseHead {
            status: 200,
            status_message: "OK".to_string(),
            headers: vec![],
        });
        exchange.finish_response();
    }

    #[tokio::test]
    async fn writes_flow_to_transport_and_capture() {
        let (mut writer, body, exchange, sink) = tapped_pair();

        writer.write(Bytes::from_static(b"He"));
        writer.write(Bytes::from_static(b"llo"));
        writer.end_with(Bytes::from_static(b"!"));

        // the transport sees exactly what was written
        let sent = body.collect().await.unwrap().to_bytes();
        assert_eq!(sent, Bytes::from_static(b"Hello!"));

        complete_response(&exchange);
        let records = sink.lock().unwrap();
        assert_eq!(records.len(), 1);
        // capture preserves the three write boundaries
        assert_eq!(records[0].request_body.len(), 3);
        assert_eq!(records[0].request_body_bytes(), Bytes::from_static(b"Hello!"));
    }

    #[tokio::test]
    async fn base64_write_captures_decoded_bytes() {
        let (mut writer, body, exchange, sink) = tapped_pair();

        writer.write_encoded("SGVsbG8h", WriteEncoding::Base64);
        writer.end();

        let sent = body.collect().await.unwrap().to_bytes();
        assert_eq!(sent, Bytes::from_static(b"Hello!"));

        complete_response(&exchange);
        let records = sink.lock().unwrap();
        assert_eq!(records[0].request_body_bytes(), Bytes::from_static(b"Hello!"));
    }

    #[tokio::test]
    async fn hex_write_captures_decoded_bytes() {
        let (mut writer, body, exchange, sink) = tapped_pair();

        writer.write_encoded("48656c6c6f21", WriteEncoding::Hex);
        writer.end();
        drop(body);

        complete_response(&exchange);
        let records = sink.lock().unwrap();
        assert_eq!(records[0].request_body_bytes(), Bytes::from_static(b"Hello!"));
    }

    #[tokio::test]
    async fn malformed_encoding_falls_back_to_raw_bytes() {
        let (mut writer, body, exchange, sink) = tapped_pair();

        writer.write_encoded("not//valid==base64!!", WriteEncoding::Base64);
        writer.end();

        let sent = body.collect().await.unwrap().to_bytes();
        assert_eq!(sent, Bytes::from_static(b"not//valid==base64!!"));

        complete_response(&exchange);
        let records = sink.lock().unwrap();
        assert_eq!(
            records[0].request_body_bytes(),
            Bytes::from_static(b"not//valid==base64!!")
        );
    }

    #[tokio::test]
    async fn empty_body_still_signals_completion() {
        let (mut writer, body, exchange, sink) = tapped_pair();

        writer.end();
        let sent = body.collect().await.unwrap().to_bytes();
        assert!(sent.is_empty());

        complete_response(&exchange);
        let records = sink.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].request_body.is_empty());
    }

    #[tokio::test]
    async fn write_after_end_is_dropped() {
        let (mut writer, body, exchange, sink) = tapped_pair();

        writer.write(Bytes::from_static(b"kept"));
        writer.end();
        writer.write(Bytes::from_static(b"late"));

        let sent = body.collect().await.unwrap().to_bytes();
        assert_eq!(sent, Bytes::from_static(b"kept"));

        complete_response(&exchange);
        let records = sink.lock().unwrap();
        assert_eq!(records[0].request_body_bytes(), Bytes::from_static(b"kept"));
    }

    #[tokio::test]
    async fn dropping_writer_implies_end() {
        let (writer, body, exchange, sink) = tapped_pair();

        drop(writer);
        let sent = body.collect().await.unwrap().to_bytes();
        assert!(sent.is_empty());

        complete_response(&exchange);
        assert_eq!(sink.lock().unwrap().len(), 1);
    }

    #[test]
    fn decode_text_variants() {
        assert_eq!(
            decode_text("abc", WriteEncoding::Utf8).unwrap(),
            Bytes::from_static(b"abc")
        );
        assert_eq!(
            decode_text("48692e", WriteEncoding::Hex).unwrap(),
            Bytes::from_static(b"Hi.")
        );
        assert!(matches!(
            decode_text("zz", WriteEncoding::Hex),
            Err(TapError::Decode { encoding: "hex", .. })
        ));
    }
}
