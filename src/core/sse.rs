use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::{Stream, StreamExt};
use tokio_util::io::StreamReader;

/// Stream of SSE `data` payloads. Ends on EOF; yields at most one error and then ends.
pub type EventStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;
pub type ResponseReader = BufReader<StreamReader<ByteStream, Bytes>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Line-oriented server-sent-events decoder.
pub struct SseReader<R> {
    reader: R,
    line_buf: String,
}

impl<R: AsyncBufRead + Unpin> SseReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::new(),
        }
    }

    /// Read until the next dispatched event. `Ok(None)` on EOF.
    pub async fn next_event(&mut self) -> std::io::Result<Option<SseEvent>> {
        let mut event: Option<String> = None;
        let mut data: Option<String> = None;

        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf).await? == 0 {
                // A trailing event without its blank line is still delivered.
                return Ok(data.map(|data| SseEvent { event, data }));
            }

            let line = self.line_buf.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if let Some(data) = data.take() {
                    return Ok(Some(SseEvent {
                        event: event.take(),
                        data,
                    }));
                }
                event = None;
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "data" => match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                "event" => event = Some(value.to_string()),
                _ => {}
            }
        }
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> SseReader<R> {
    pub fn into_data_stream(self) -> EventStream {
        Box::pin(futures_util::stream::unfold(
            Some(self),
            |state| async move {
                let mut reader = state?;
                match reader.next_event().await {
                    Ok(Some(event)) => Some((Ok(event.data), Some(reader))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), None)),
                }
            },
        ))
    }
}

pub fn response_reader(res: reqwest::Response) -> SseReader<ResponseReader> {
    let bytes: ByteStream = Box::pin(
        res.bytes_stream()
            .map(|r| r.map_err(std::io::Error::other)),
    );
    SseReader::new(BufReader::new(StreamReader::new(bytes)))
}
