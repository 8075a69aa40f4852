use hyper::header::{AsHeaderName, CONTENT_TYPE, LINK};
use hyper::{Response, StatusCode};

use crate::registry::Error;

pub trait ResponseExt<B> {
    fn get_header<K>(&self, header: K) -> Option<String>
    where
        K: AsHeaderName;

    fn paginated(content: B, content_type: &str, link: Option<&str>) -> Result<Self, Error>
    where
        Self: Sized;
}

impl<B> ResponseExt<B> for Response<B> {
    fn get_header<K>(&self, header: K) -> Option<String>
    where
        K: AsHeaderName,
    {
        self.headers()
            .get(header)
            .and_then(|header| header.to_str().ok())
            .map(ToString::to_string)
    }

    fn paginated(body: B, content_type: &str, link: Option<&str>) -> Result<Response<B>, Error> {
        let res = match link {
            Some(link) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, content_type)
                .header(LINK, format!("<{link}>; rel=\"next\""))
                .body(body)?,
            None => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, content_type)
                .body(body)?,
        };

        Ok(res)
    }
}
