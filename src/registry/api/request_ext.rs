use hyper::header::AsHeaderName;
use hyper::Request;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::registry::Error;

pub trait RequestExt {
    fn get_header<K: AsHeaderName>(&self, header: K) -> Option<String>;
    fn query_parameters<D: DeserializeOwned + Default>(&self) -> Result<D, Error>;
}

impl<T> RequestExt for Request<T> {
    fn get_header<K>(&self, header: K) -> Option<String>
    where
        K: AsHeaderName,
    {
        self.headers()
            .get(header)
            .and_then(|header| header.to_str().ok())
            .map(ToString::to_string)
    }

    fn query_parameters<D: DeserializeOwned + Default>(&self) -> Result<D, Error> {
        let Some(query) = self.uri().query() else {
            return Ok(Default::default());
        };

        serde_urlencoded::from_str(query).map_err(|e| {
            warn!("Failed to parse query parameters: {e}");
            Error::Unsupported("unparsable query string".to_string())
        })
    }
}
