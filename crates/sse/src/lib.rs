//! Streaming primitives shared by the network providers.
//!
//! [`Chunks`] abstracts over where bytes come from, and [`Sse`] turns
//! those bytes into server-sent events.

mod chunks;
mod sse;

use mime::Mime;
use reqwest::{Response, header};

pub use chunks::{Chunks, Error as ChunksError};
pub use sse::{Error, Event, Sse};

/// Returns `true` if the response declares a `text/event-stream` body.
pub fn is_event_stream(resp: &Response) -> bool {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .map(|m: Mime| {
            m.type_() == mime::TEXT && m.subtype().as_str() == "event-stream"
        })
        .unwrap_or(false)
}
