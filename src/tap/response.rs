//! Response-side tap: source-driven capture with a pass-through body

use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::{Body, Frame, Incoming};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TapError;
use crate::exchange::Exchange;
use crate::record::{headers_to_pairs, ResponseHead};

/// Consumer-visible response body.
///
/// Untapped responses poll the transport directly; tapped responses poll a
/// channel fed by the pump task, which drains the transport at the source.
/// Either way the consumer observes exactly the frames the transport
/// produced, in order, with original chunk boundaries.
pub struct CapturedBody {
    kind: BodyKind,
}

enum BodyKind {
    Direct(Incoming),
    Tapped(mpsc::UnboundedReceiver<std::result::Result<Frame<Bytes>, TapError>>),
}

impl CapturedBody {
    pub(crate) fn direct(inner: Incoming) -> Self {
        Self {
            kind: BodyKind::Direct(inner),
        }
    }

    fn tapped(rx: mpsc::UnboundedReceiver<std::result::Result<Frame<Bytes>, TapError>>) -> Self {
        Self {
            kind: BodyKind::Tapped(rx),
        }
    }
}

impl Body for CapturedBody {
    type Data = Bytes;
    type Error = TapError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            BodyKind::Direct(inner) => Pin::new(inner)
                .poll_frame(cx)
                .map(|opt| opt.map(|res| res.map_err(|e| TapError::Transport(e.to_string())))),
            BodyKind::Tapped(rx) => rx.poll_recv(cx),
        }
    }
}

/// Wrap a transport response with a tap.
///
/// The head is captured before any consumer-side processing; a pump task
/// then drains the source body, mirroring every data chunk into the
/// exchange and forwarding each frame unchanged to the consumer. Capture is
/// therefore independent of when — or whether — the consumer reads.
pub(crate) fn tap_response<B>(
    response: hyper::Response<B>,
    exchange: Exchange,
) -> hyper::Response<CapturedBody>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Display,
{
    let (parts, body) = response.into_parts();
    exchange.set_response(response_head(&parts));

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(pump_body(body, tx, exchange));

    hyper::Response::from_parts(parts, CapturedBody::tapped(rx))
}

fn response_head(parts: &hyper::http::response::Parts) -> ResponseHead {
    ResponseHead {
        status: parts.status.as_u16(),
        // The received reason phrase is not exposed by hyper 1.x; the
        // canonical text for the code stands in.
        status_message: parts
            .status
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
        headers: headers_to_pairs(&parts.headers),
    }
}

/// Drain the source body, capturing data chunks and forwarding frames.
///
/// Runs until the source ends or errors, even when the consumer has dropped
/// its body handle — a never-reading consumer does not prevent the exchange
/// from completing. Trailer frames are forwarded but are not body bytes, so
/// they are not captured.
async fn pump_body<B>(
    mut body: B,
    tx: mpsc::UnboundedSender<std::result::Result<Frame<Bytes>, TapError>>,
    exchange: Exchange,
) where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Display,
{
    loop {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    exchange.push_response_chunk(data.clone());
                }
                if tx.send(Ok(frame)).is_err() {
                    debug!("response consumer gone; draining for capture only");
                }
            }
            Some(Err(e)) => {
                exchange.fail();
                let _ = tx.send(Err(TapError::Transport(e.to_string())));
                return;
            }
            None => {
                exchange.finish_response();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::EventChannel;
    use crate::exchange::ExchangeState;
    use crate::record::{Record, RequestHead, Scheme};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Scripted body yielding a fixed frame sequence
    struct ScriptedBody {
        frames: VecDeque<std::result::Result<Frame<Bytes>, std::io::Error>>,
    }

    impl ScriptedBody {
        fn chunks(chunks: &[&'static [u8]]) -> Self {
            Self {
                frames: chunks
                    .iter()
                    .map(|c| Ok(Frame::data(Bytes::from_static(c))))
                    .collect(),
            }
        }

        fn failing_after(chunk: &'static [u8]) -> Self {
            let mut frames: VecDeque<std::result::Result<Frame<Bytes>, std::io::Error>> =
                VecDeque::new();
            frames.push_back(Ok(Frame::data(Bytes::from_static(chunk))));
            frames.push_back(Err(std::io::Error::other("connection reset")));
            Self { frames }
        }
    }

    impl Body for ScriptedBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<std::result::Result<Frame<Bytes>, Self::Error>>> {
            Poll::Ready(self.get_mut().frames.pop_front())
        }
    }

    fn exchange_with_sink() -> (Exchange, Arc<Mutex<Vec<Record>>>) {
        let channel = EventChannel::new();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let records = Arc::clone(&sink);
        channel.subscribe(move |record| {
            records.lock().unwrap().push(record.clone());
            Ok(())
        });

        let exchange = Exchange::new(
            RequestHead {
                method: "GET".to_string(),
                scheme: Scheme::Http,
                host: "example.com".to_string(),
                path: "/".to_string(),
                headers: vec![],
            },
            channel,
        );
        exchange.finish_request();
        (exchange, sink)
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    fn make_response(body: ScriptedBody, status: u16) -> hyper::Response<ScriptedBody> {
        hyper::Response::builder()
            .status(status)
            .header("x-my-response-header", "2")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn consumer_sees_exact_frames_and_capture_matches() {
        let (exchange, sink) = exchange_with_sink();
        let response = make_response(ScriptedBody::chunks(&[b"Wor", b"ld!"]), 200);

        let tapped = tap_response(response, exchange);
        assert_eq!(tapped.status(), 200);

        let mut body = tapped.into_body();
        let mut seen = Vec::new();
        while let Some(frame) = body.frame().await {
            let frame = frame.unwrap();
            if let Some(data) = frame.data_ref() {
                seen.push(data.clone());
            }
        }
        assert_eq!(seen, vec![Bytes::from_static(b"Wor"), Bytes::from_static(b"ld!")]);

        wait_until(|| !sink.lock().unwrap().is_empty()).await;
        let records = sink.lock().unwrap();
        let record = &records[0];
        assert_eq!(record.response.status, 200);
        assert_eq!(record.response.status_message, "OK");
        assert_eq!(record.response.header("x-my-response-header"), Some("2"));
        assert_eq!(record.response_body.len(), 2);
        assert_eq!(record.response_body_bytes(), Bytes::from_static(b"World!"));
    }

    #[tokio::test]
    async fn capture_completes_without_a_consumer() {
        let (exchange, sink) = exchange_with_sink();
        let response = make_response(ScriptedBody::chunks(&[b"Hello!"]), 200);

        let tapped = tap_response(response, exchange.clone());
        drop(tapped); // consumer never reads

        wait_until(|| !sink.lock().unwrap().is_empty()).await;
        assert_eq!(exchange.state(), ExchangeState::Assembled);
        let records = sink.lock().unwrap();
        assert_eq!(records[0].response_body_bytes(), Bytes::from_static(b"Hello!"));
    }

    #[tokio::test]
    async fn redirect_head_is_captured_like_any_other() {
        let (exchange, sink) = exchange_with_sink();
        let response = hyper::Response::builder()
            .status(302)
            .header("location", "https://example.com")
            .body(ScriptedBody::chunks(&[]))
            .unwrap();

        let _tapped = tap_response(response, exchange);

        wait_until(|| !sink.lock().unwrap().is_empty()).await;
        let records = sink.lock().unwrap();
        assert_eq!(records[0].response.status, 302);
        assert_eq!(records[0].response.status_message, "Found");
        assert_eq!(
            records[0].response.header("location"),
            Some("https://example.com")
        );
        assert!(records[0].response_body.is_empty());
    }

    #[tokio::test]
    async fn stream_error_fails_exchange_and_reaches_consumer() {
        let (exchange, sink) = exchange_with_sink();
        let response = make_response(ScriptedBody::failing_after(b"part"), 200);

        let tapped = tap_response(response, exchange.clone());

        let mut body = tapped.into_body();
        let first = body.frame().await.unwrap();
        assert!(first.is_ok());
        let second = body.frame().await.unwrap();
        assert!(matches!(second, Err(TapError::Transport(_))));

        wait_until(|| exchange.state() == ExchangeState::Failed).await;
        assert!(sink.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_response_body_still_completes() {
        let (exchange, sink) = exchange_with_sink();
        let response = make_response(ScriptedBody::chunks(&[]), 204);

        let _tapped = tap_response(response, exchange.clone());

        wait_until(|| !sink.lock().unwrap().is_empty()).await;
        assert_eq!(exchange.state(), ExchangeState::Assembled);
        assert!(sink.lock().unwrap()[0].response_body.is_empty());
    }
}
