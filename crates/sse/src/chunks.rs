use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The chunk source failed.
#[derive(Debug, PartialEq, Eq)]
pub struct Error;

/// An adapter for streaming byte chunks.
pub enum Chunks {
    /// Chunks pulled from an HTTP response body.
    Response(Response),
    /// Chunks from memory, mostly for fixtures.
    Buffered(VecDeque<Bytes>),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[inline]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::Buffered(vec)
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => {
                let Ok(chunk) = response.chunk().await else {
                    return Err(Error);
                };
                Ok(chunk)
            }
            Chunks::Buffered(vec) => Ok(vec.pop_front()),
        }
    }
}
