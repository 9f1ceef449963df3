//! Server-sent-event framing shared by streaming providers.

use std::time::Duration;

use futures_util::{Stream, StreamExt};

use crate::{Result, StreamFragment, mpsc};

/// Upper bound on undelivered bytes held while waiting for an event boundary.
const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Consecutive malformed payloads tolerated before the stream is abandoned.
const MAX_SSE_PARSE_ERRORS: usize = 3;

#[derive(Debug)]
pub(crate) enum SseParseAction {
    /// Nothing to forward for this payload.
    Continue,
    Emit(Vec<StreamFragment>),
    Error(String),
}

/// Provider-specific mapping from one JSON payload to fragments.
pub(crate) trait SseParser {
    fn parse(&mut self, json: &serde_json::Value) -> SseParseAction;
    fn provider_name(&self) -> &'static str;
}

/// Position and delimiter length of the first blank-line boundary.
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (found, None) | (None, found) => found,
    }
}

fn take_next_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_event_boundary(buffer)?;
    let event: Vec<u8> = buffer.drain(..pos + delim_len).take(pos).collect();
    Some(event)
}

/// Join every `data:` line of one event, dropping one optional leading space.
fn event_data(event: &str) -> Option<String> {
    let mut lines = event
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .peekable();
    lines.peek()?;
    Some(lines.collect::<Vec<_>>().join("\n"))
}

enum Flow {
    Continue,
    Stop,
}

async fn forward(tx: &mpsc::Sender<StreamFragment>, fragment: StreamFragment) -> Flow {
    let terminal = fragment.is_terminal();
    if tx.send(fragment).await.is_err() || terminal {
        Flow::Stop
    } else {
        Flow::Continue
    }
}

async fn fail(tx: &mpsc::Sender<StreamFragment>, message: impl Into<String>) {
    let _ = tx.send(StreamFragment::Error(message.into())).await;
}

/// Drive a byte stream through `parser`, forwarding fragments to `tx`.
///
/// Exactly one terminal fragment (`Done` or `Error`) is sent unless the
/// receiver goes away first. Transport errors while reading return `Err`.
pub(crate) async fn pump_sse_stream<P, S, B, E>(
    mut stream: S,
    parser: &mut P,
    tx: &mpsc::Sender<StreamFragment>,
    idle_timeout: Duration,
) -> Result<()>
where
    P: SseParser,
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut parse_errors = 0usize;

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            fail(tx, "Stream idle timeout").await;
            return Ok(());
        };
        let Some(chunk) = next else { break };
        buffer.extend_from_slice(chunk?.as_ref());

        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            fail(tx, "SSE buffer exceeded maximum size (4 MiB)").await;
            return Ok(());
        }

        while let Some(raw) = take_next_event(&mut buffer) {
            let Ok(event) = std::str::from_utf8(&raw) else {
                fail(tx, "Received invalid UTF-8 from SSE stream").await;
                return Ok(());
            };
            let Some(data) = event_data(event) else {
                continue;
            };
            if data == "[DONE]" {
                let _ = forward(tx, StreamFragment::Done).await;
                return Ok(());
            }

            let json = match serde_json::from_str::<serde_json::Value>(&data) {
                Ok(json) => {
                    parse_errors = 0;
                    json
                }
                Err(e) => {
                    parse_errors += 1;
                    tracing::warn!(
                        %e,
                        payload_bytes = data.len(),
                        provider = parser.provider_name(),
                        "Invalid SSE JSON payload"
                    );
                    if parse_errors >= MAX_SSE_PARSE_ERRORS {
                        fail(tx, format!("Invalid stream payload: {e}")).await;
                        return Ok(());
                    }
                    continue;
                }
            };

            let fragments = match parser.parse(&json) {
                SseParseAction::Continue => continue,
                SseParseAction::Emit(fragments) => fragments,
                SseParseAction::Error(message) => vec![StreamFragment::Error(message)],
            };
            for fragment in fragments {
                if let Flow::Stop = forward(tx, fragment).await {
                    return Ok(());
                }
            }
        }
    }

    fail(tx, "Connection closed before stream completed").await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        SseParseAction, SseParser, event_data, find_event_boundary, pump_sse_stream,
        take_next_event,
    };
    use crate::StreamFragment;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Echoes the `text` field of every payload.
    struct EchoParser;

    impl SseParser for EchoParser {
        fn parse(&mut self, json: &serde_json::Value) -> SseParseAction {
            match json.get("text").and_then(|t| t.as_str()) {
                Some(text) => SseParseAction::Emit(vec![StreamFragment::TextDelta(text.into())]),
                None => SseParseAction::Continue,
            }
        }

        fn provider_name(&self) -> &'static str {
            "echo"
        }
    }

    async fn run(chunks: Vec<&'static str>) -> Vec<StreamFragment> {
        let stream = futures_util::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(c.as_bytes().to_vec())),
        );
        let (tx, mut rx) = mpsc::channel(64);
        pump_sse_stream(stream, &mut EchoParser, &tx, Duration::from_secs(5))
            .await
            .unwrap();
        drop(tx);
        let mut out = Vec::new();
        while let Some(f) = rx.recv().await {
            out.push(f);
        }
        out
    }

    mod boundary {
        use super::{find_event_boundary, take_next_event};

        #[test]
        fn finds_lf_and_crlf() {
            assert_eq!(find_event_boundary(b"data: a\n\nrest"), Some((7, 2)));
            assert_eq!(find_event_boundary(b"data: a\r\n\r\nrest"), Some((7, 4)));
        }

        #[test]
        fn earliest_boundary_wins() {
            assert_eq!(find_event_boundary(b"a\r\n\r\nb\n\n"), Some((1, 4)));
            assert_eq!(find_event_boundary(b"a\n\nb\r\n\r\n"), Some((1, 2)));
        }

        #[test]
        fn none_without_blank_line() {
            assert_eq!(find_event_boundary(b"data: partial\n"), None);
            assert_eq!(find_event_boundary(b""), None);
        }

        #[test]
        fn take_drains_events_in_order() {
            let mut buffer = b"data: 1\n\ndata: 2\n\ndata: 3".to_vec();
            assert_eq!(take_next_event(&mut buffer).unwrap(), b"data: 1");
            assert_eq!(take_next_event(&mut buffer).unwrap(), b"data: 2");
            assert!(take_next_event(&mut buffer).is_none());
            assert_eq!(buffer, b"data: 3");
        }
    }

    mod data {
        use super::event_data;

        #[test]
        fn strips_single_leading_space() {
            assert_eq!(event_data("data: {\"a\":1}").as_deref(), Some("{\"a\":1}"));
            assert_eq!(event_data("data:x").as_deref(), Some("x"));
            assert_eq!(event_data("data:  x").as_deref(), Some(" x"));
        }

        #[test]
        fn joins_multiline_data_and_ignores_other_fields() {
            let event = "event: message\r\ndata: a\r\nid: 3\r\ndata: b";
            assert_eq!(event_data(event).as_deref(), Some("a\nb"));
        }

        #[test]
        fn none_without_data_line() {
            assert_eq!(event_data(": keepalive"), None);
            assert_eq!(event_data("data:").as_deref(), Some(""));
        }
    }

    #[tokio::test]
    async fn events_split_across_chunks_are_reassembled() {
        let out = run(vec![
            "data: {\"te",
            "xt\":\"hel\"}\n",
            "\ndata: {\"text\":\"lo\"}\n\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(
            out,
            vec![
                StreamFragment::TextDelta("hel".into()),
                StreamFragment::TextDelta("lo".into()),
                StreamFragment::Done,
            ]
        );
    }

    #[tokio::test]
    async fn done_sentinel_ends_the_stream() {
        let out = run(vec![
            "data: {\"text\":\"a\"}\n\ndata: [DONE]\n\ndata: {\"text\":\"late\"}\n\n",
        ])
        .await;
        assert_eq!(
            out,
            vec![StreamFragment::TextDelta("a".into()), StreamFragment::Done]
        );
    }

    #[tokio::test]
    async fn eof_without_done_is_an_error() {
        let out = run(vec!["data: {\"text\":\"x\"}\n\n"]).await;
        assert!(matches!(out.last(), Some(StreamFragment::Error(m)) if m.contains("closed")));
    }

    #[tokio::test]
    async fn repeated_garbage_aborts() {
        let out = run(vec!["data: nope\n\ndata: nope\n\ndata: nope\n\ndata: [DONE]\n\n"]).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], StreamFragment::Error(m) if m.starts_with("Invalid stream payload")));
    }

    #[tokio::test]
    async fn single_garbage_payload_is_skipped() {
        let out = run(vec!["data: nope\n\ndata: {\"text\":\"ok\"}\n\ndata: [DONE]\n\n"]).await;
        assert_eq!(
            out,
            vec![StreamFragment::TextDelta("ok".into()), StreamFragment::Done]
        );
    }
}
