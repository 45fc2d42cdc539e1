//! Error taxonomy for the Genesis client

use std::time::Duration;
use thiserror::Error;

/// Which validation rule a request broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind
{   EmptyMessages
  , EmptyContent
  , ContentTooLong
  , InvalidRole
  , InvalidTemperature
  , InvalidMaxTokens
  , InvalidTopP
  , InvalidModel
  , /// The server answered 400
    Rejected
}

/// Client error. `Display` is always the bare message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error
{   /// Malformed request, caught locally or rejected by the server
    #[error("{message}")]
    Validation
    {   kind: ValidationKind
      , message: String
      , status_code: Option<u16>
    }
  , /// Bad or missing credentials (401/403)
    #[error("{message}")]
    Authentication
    {   message: String
      , status_code: u16
    }
  , /// Throttled (429). `retry_after` is in seconds.
    #[error("{message}")]
    RateLimit
    {   message: String
      , retry_after: u64
      , status_code: u16
    }
  , /// Server, network, or payload failure
    #[error("{message}")]
    Api
    {   message: String
      , status_code: Option<u16>
    }
  , /// Client configuration was rejected
    #[error("{0}")]
    Configuration(String)
}

impl Error
{   pub(crate) fn validation(
      kind: ValidationKind
    , message: impl Into<String>
    ) -> Self
    {   Error::Validation
        {   kind
          , message: message.into()
          , status_code: None
        }
    }

    pub(crate) fn api(
      message: impl Into<String>
    , status_code: Option<u16>
    ) -> Self
    {   Error::Api
        {   message: message.into()
          , status_code
        }
    }

    pub fn message(&self) -> &str
    {   match self
        {   Error::Validation { message, .. }
          | Error::Authentication { message, .. }
          | Error::RateLimit { message, .. }
          | Error::Api { message, .. } => message
          , Error::Configuration(message) => message
        }
    }

    pub fn status_code(&self) -> Option<u16>
    {   match self
        {   Error::Validation { status_code, .. }
          | Error::Api { status_code, .. } => *status_code
          , Error::Authentication { status_code, .. }
          | Error::RateLimit { status_code, .. } => Some(*status_code)
          , Error::Configuration(_) => None
        }
    }

    /// Server-requested wait, only set for rate limiting
    pub fn retry_after(&self) -> Option<Duration>
    {   match self
        {   Error::RateLimit { retry_after, .. } => {
              Some(Duration::from_secs(*retry_after))
            }
          , _ => None
        }
    }

    pub fn validation_kind(&self) -> Option<ValidationKind>
    {   match self
        {   Error::Validation { kind, .. } => Some(*kind)
          , _ => None
        }
    }

    /// Transient failures: 5xx answers and anything that never got one
    pub fn is_retryable(&self) -> bool
    {   match self
        {   Error::Api { status_code: None, .. } => true
          , Error::Api { status_code: Some(status), .. } => {
              *status >= 500
            }
          , _ => false
        }
    }
}

/// Failure below HTTP, reported by a [`crate::transport::Transport`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError
{   #[error("Request timeout")]
    Timeout
  , #[error("Connection error: {0}")]
    Connect(String)
  , #[error("Transport error: {0}")]
    Other(String)
}

impl From<reqwest::Error> for TransportError
{   fn from(e: reqwest::Error) -> Self
    {   if e.is_timeout()
        {   TransportError::Timeout
        } else if e.is_connect()
        {   TransportError::Connect(e.to_string())
        } else
        {   TransportError::Other(e.to_string())
        }
    }
}

impl From<TransportError> for Error
{   fn from(e: TransportError) -> Self
    {   Error::api(e.to_string(), None)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
