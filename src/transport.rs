//! The seam between the client and the network.
//!
//! [`GenesisClient`](crate::client::GenesisClient) only ever talks to a
//! [`Transport`]. Production code uses [`ReqwestTransport`]; tests hand in
//! a scripted one.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use log::{debug, error, trace};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{Error, Result, TransportError};
use crate::request::find_header;

/// Response body, delivered as it arrives
pub type ByteStream = Pin<Box<
  dyn Stream<Item = std::result::Result<Bytes, TransportError>> + Send
>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method
{   Get
  , Post
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest
{   pub method: Method
  , pub url: String
  , pub headers: HashMap<String, String>
  , pub body: Option<Vec<u8>>
}

pub struct HttpResponse
{   pub status: u16
  , pub headers: HashMap<String, String>
  , pub body: ByteStream
}

impl HttpResponse
{   pub fn new(
      status: u16
    , headers: HashMap<String, String>
    , body: ByteStream
    ) -> Self
    {   HttpResponse
        {   status
          , headers
          , body
        }
    }

    /// Response whose body arrives as the given chunks, in order
    pub fn from_chunks<I, B>(
      status: u16
    , headers: HashMap<String, String>
    , chunks: I
    ) -> Self
    where
      I: IntoIterator<Item = B>
    , B: Into<Bytes>
    {   let chunks: Vec<std::result::Result<Bytes, TransportError>>
          = chunks.into_iter().map(|c| Ok(c.into())).collect();
        HttpResponse::new(
          status,
          headers,
          Box::pin(futures::stream::iter(chunks))
        )
    }

    /// Response with a single-chunk body
    pub fn from_bytes(
      status: u16
    , headers: HashMap<String, String>
    , body: impl Into<Bytes>
    ) -> Self
    {   let body: Bytes = body.into();
        HttpResponse::from_chunks(status, headers, [body])
    }

    pub fn is_success(&self) -> bool
    {   (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str>
    {   find_header(&self.headers, name)
    }

    /// Drain the whole body
    pub async fn bytes(mut self)
      -> std::result::Result<Vec<u8>, TransportError>
    {   let mut buffer = Vec::new();
        while let Some(chunk) = self.body.next().await
        {   buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer)
    }
}

impl fmt::Debug for HttpResponse
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("HttpResponse")
          .field("status", &self.status)
          .field("headers", &self.headers)
          .finish_non_exhaustive()
    }
}

/// Sends one HTTP request and returns the response head with a lazy body.
/// Implementations hold no per-call state and may be shared across tasks.
#[async_trait]
pub trait Transport: Send + Sync
{   async fn send(&self, request: &HttpRequest)
      -> std::result::Result<HttpResponse, TransportError>;

    /// Release pooled connections. Called once by
    /// [`GenesisClient::close`](crate::client::GenesisClient::close).
    async fn close(&self) {}
}

/// [`Transport`] over a pooled `reqwest::Client`
pub struct ReqwestTransport
{   http_client: reqwest::Client
}

impl ReqwestTransport
{   /// Overall deadlines are enforced per attempt by the client, so only
    /// connection setup is bounded here.
    pub fn new(connect_timeout: Duration) -> Result<Self>
    {   debug!("Creating ReqwestTransport");
        let http_client = reqwest::Client::builder()
          .connect_timeout(connect_timeout)
          .build()
          .map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            Error::Configuration(format!("HTTP client: {}", e))
          })?;
        Ok(ReqwestTransport { http_client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport
{   async fn send(&self, request: &HttpRequest)
      -> std::result::Result<HttpResponse, TransportError>
    {   let method = match request.method
        {   Method::Get => reqwest::Method::GET
          , Method::Post => reqwest::Method::POST
        };
        trace!("{} {}", method, request.url);

        let mut builder = self.http_client
          .request(method, &request.url);
        for (name, value) in &request.headers
        {   builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body
        {   builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
          error!("HTTP error: {}", e);
          TransportError::from(e)
        })?;

        let status = response.status().as_u16();
        trace!("Response status: {}", status);
        let headers: HashMap<String, String> = response.headers()
          .iter()
          .filter_map(|(name, value)| {
            value.to_str().ok()
              .map(|v| (name.as_str().to_string(), v.to_string()))
          })
          .collect();

        let body = response.bytes_stream()
          .map_err(TransportError::from);
        Ok(HttpResponse::new(status, headers, Box::pin(body)))
    }
}
