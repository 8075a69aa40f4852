use http_body_util::Full;
use hyper::body::{Bytes, Frame};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Response body: empty or fixed. Manifests and referrer lists are small
/// enough that nothing here streams.
#[derive(Debug)]
pub enum Body {
    Empty,
    Fixed(Full<Bytes>),
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn fixed(data: Vec<u8>) -> Self {
        Body::Fixed(Full::new(Bytes::from(data)))
    }
}

impl hyper::body::Body for Body {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Body::Empty => Poll::Ready(None),
            Body::Fixed(body) => Pin::new(body).poll_frame(cx).map_err(io::Error::other),
        }
    }
}
