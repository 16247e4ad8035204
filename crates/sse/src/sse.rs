use std::fmt::{self, Display};

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChunksError(_) => write!(f, "failed to read the stream"),
            Error::InvalidPayload => write!(f, "invalid event stream payload"),
        }
    }
}

impl std::error::Error for Error {}

/// A dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Value of the `event` field, `None` for the default `message` type.
    pub event: Option<String>,
    /// Data lines joined with `\n`.
    pub data: String,
}

impl Event {
    /// Returns the event type, defaulting to `message`.
    #[inline]
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    // Bytes of a multi-byte character split across chunks.
    pending: Vec<u8>,
    // The previous chunk ended with `\r`, so a leading `\n` belongs to it.
    skip_lf: bool,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            pending: Vec::new(),
            skip_lf: false,
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<Event>, Error> {
        loop {
            // Drain what is already buffered before reading more, a chunk
            // may carry several events.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                // Abort if no more data available.
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.pending.extend_from_slice(bytes);
        let valid_len = match str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            // Incomplete character at the end, keep it for the next chunk.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.pending.split_off(valid_len);
        let s = str::from_utf8(&self.pending)
            .map_err(|_| Error::InvalidPayload)?;
        // Only line feeds are handled as `end-of-line` below.
        let mut chars = s.chars().peekable();
        if self.skip_lf && !s.is_empty() {
            self.skip_lf = false;
            chars.next_if_eq(&'\n');
        }
        while let Some(ch) = chars.next() {
            if ch != '\r' {
                self.buf.push(ch);
                continue;
            }
            self.buf.push('\n');
            if chars.next_if_eq(&'\n').is_none() && chars.peek().is_none() {
                self.skip_lf = true;
            }
        }
        self.pending = rest;
        Ok(())
    }

    fn try_parse_event(&mut self) -> Result<Option<Event>, Error> {
        loop {
            if self.buf.is_empty() {
                return Ok(None);
            }

            // event         = *( comment / field ) end-of-line
            // comment       = colon *any-char end-of-line
            // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
            let Some(eol_idx) = self.buf.find("\n\n") else {
                return Ok(None);
            };

            let mut event = None;
            let mut data: Option<String> = None;
            for line in self.buf[0..eol_idx].lines() {
                if line.starts_with(':') {
                    continue;
                }
                let (name, value) = match line.split_once(':') {
                    Some((name, value)) => {
                        (name, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                match name {
                    "event" => event = Some(value.to_owned()),
                    "data" => {
                        let data = data.get_or_insert_default();
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(value);
                    }
                    // `id`, `retry` and unknown fields are ignored.
                    _ => {}
                }
            }

            // Consume the bytes from the buffer.
            self.buf.drain(0..eol_idx + 2);

            // Blocks with only comments (keep-alives) dispatch nothing.
            if let Some(data) = data {
                return Ok(Some(Event { event, data }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn data(data: &str) -> Event {
        Event {
            event: None,
            data: data.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n\n"),
                Bytes::from_static(b"data: bye\n\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), data("hello"));
        assert_eq!(sse.next_event().await.unwrap().unwrap(), data("bye"));
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data:"),
                Bytes::from_static(b" hello\n"),
                Bytes::from_static(b"\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), data("hello"));
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_named_events() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b"event: endpoint\r\ndata: /messages?session_id=1\r\n\r\n\
                  : keep-alive\n\n\
                  event: message\ndata: {\"a\":\ndata: 1}\n\n",
            )]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        let endpoint = sse.next_event().await.unwrap().unwrap();
        assert_eq!(endpoint.event_type(), "endpoint");
        assert_eq!(endpoint.data, "/messages?session_id=1");
        let message = sse.next_event().await.unwrap().unwrap();
        assert_eq!(message.event_type(), "message");
        assert_eq!(message.data, "{\"a\":\n1}");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_utf8() {
        let text = "data: olá\n\n".as_bytes();
        let (head, tail) = text.split_at(9);
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::copy_from_slice(head), Bytes::copy_from_slice(tail)]
                .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), data("olá"));
    }

    #[tokio::test]
    async fn test_crlf_split_across_chunks() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"event: message\r\ndata: one\r\n\r"),
                Bytes::from_static(b"\nevent: message\r\ndata: two\r\n\r\n"),
                Bytes::from_static(b"data: three\r\rdata: four\r\r"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        let one = sse.next_event().await.unwrap().unwrap();
        assert_eq!(one.event_type(), "message");
        assert_eq!(one.data, "one");
        assert_eq!(sse.next_event().await.unwrap().unwrap().data, "two");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), data("three"));
        assert_eq!(sse.next_event().await.unwrap().unwrap(), data("four"));
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_fields_are_ignored() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b"foo: bar\ndata: hi\n\nxxxxxx: 1\n\nid: 7\nretry: 10\ndata: bye\n\n",
            )]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), data("hi"));
        assert_eq!(sse.next_event().await.unwrap().unwrap(), data("bye"));
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: \xff\xfe\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"xxxxxx\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);

        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data: hello\n"),
                Bytes::from_static(b"data: bye\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
