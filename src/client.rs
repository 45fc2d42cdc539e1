use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use log::{debug, trace, error, warn};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{Error, Result, ValidationKind};
use crate::request::{
  ApiErrorBody, ApiResponse, ChatCompletion, ChatMessage, ChatRequestBody,
  ModelConfig, ModelList, ModelRecord, find_header
};
use crate::stream::{ChatStream, decode_stream};
use crate::transport::{
  HttpRequest, HttpResponse, Method, ReqwestTransport, Transport
};
use crate::validate::{validate_messages, validate_model_config};

/// Wait suggested to rate-limited callers when `Retry-After` is unusable
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const MODELS_PATH: &str = "models";

/// Client for the Genesis chat-completion API.
///
/// Configuration is fixed at construction and every call keeps its own
/// state, so one client can be shared between tasks (`Arc<GenesisClient>`).
/// Pooled connections are released on drop, or explicitly with
/// [`GenesisClient::close`].
pub struct GenesisClient
{   config: ClientConfig
  , transport: Arc<dyn Transport>
}

impl GenesisClient
{   /// Create a client backed by `reqwest`
    pub fn new(config: ClientConfig) -> Result<Self>
    {   config.validate()?;
        let transport = ReqwestTransport::new(config.timeout())?;
        Ok(Self::assemble(config, Arc::new(transport)))
    }

    /// Create a client from `GENESIS_API_KEY` / `GENESIS_BASE_URL`
    pub fn from_env() -> Result<Self>
    {   GenesisClient::new(ClientConfig::from_env()?)
    }

    /// Create a client over a caller-supplied transport
    pub fn with_transport(
      config: ClientConfig
    , transport: Arc<dyn Transport>
    ) -> Result<Self>
    {   config.validate()?;
        Ok(Self::assemble(config, transport))
    }

    fn assemble(
      config: ClientConfig
    , transport: Arc<dyn Transport>
    ) -> Self
    {   debug!(
          "Creating GenesisClient for {} (timeout {:?}, max_retries {})",
          config.base_url, config.timeout(), config.max_retries
        );
        GenesisClient
        {   config
          , transport
        }
    }

    pub fn config(&self) -> &ClientConfig
    {   &self.config
    }

    /// Release the transport. Consumes the client, so it happens once.
    pub async fn close(self)
    {   debug!("Closing GenesisClient");
        self.transport.close().await;
    }

    // ===== Request building =====

    /// Required headers plus `extra`. Extra headers may add keys or
    /// replace `User-Agent`, never `Authorization` or `Content-Type`.
    pub fn build_headers(
      &self
    , extra: Option<&HashMap<String, String>>
    ) -> HashMap<String, String>
    {   let mut headers = HashMap::new();
        headers.insert(
          "User-Agent".to_string(),
          format!("genesis-client/{}", env!("CARGO_PKG_VERSION"))
        );
        if let Some(extra) = extra
        {   for (name, value) in extra
            {   if name.eq_ignore_ascii_case("authorization")
                  || name.eq_ignore_ascii_case("content-type")
                {   warn!("Ignoring caller override of {}", name);
                    continue;
                }
                if name.eq_ignore_ascii_case("user-agent")
                {   headers.remove("User-Agent");
                }
                headers.insert(name.clone(), value.clone());
            }
        }
        headers.insert(
          "Authorization".to_string(),
          format!("Bearer {}", self.config.api_key)
        );
        headers.insert(
          "Content-Type".to_string(),
          "application/json".to_string()
        );
        headers
    }

    fn chat_request(
      &self
    , messages: &[ChatMessage]
    , model_config: &ModelConfig
    , headers: Option<&HashMap<String, String>>
    , stream: bool
    ) -> Result<HttpRequest>
    {   validate_messages(messages)?;
        validate_model_config(model_config)?;

        let body = serde_json::to_vec(
          &ChatRequestBody::new(messages, model_config, stream)
        ).map_err(|e| {
          error!("Failed to encode request: {}", e);
          Error::api(format!("Failed to encode request: {}", e), None)
        })?;

        Ok(HttpRequest
        {   method: Method::Post
          , url: self.config.endpoint(CHAT_COMPLETIONS_PATH)
          , headers: self.build_headers(headers)
          , body: Some(body)
        })
    }

    fn get_request(&self, path: &str) -> HttpRequest
    {   HttpRequest
        {   method: Method::Get
          , url: self.config.endpoint(path)
          , headers: self.build_headers(None)
          , body: None
        }
    }

    // ===== Chat completions =====

    /// Validate, send, and retry transient failures.
    pub async fn create_chat_completion(
      &self
    , messages: &[ChatMessage]
    , model_config: &ModelConfig
    , headers: Option<&HashMap<String, String>>
    ) -> Result<ChatCompletion>
    {   debug!(
          "create_chat_completion: {} messages for {}",
          messages.len(), model_config.name
        );
        let request = self.chat_request(
          messages, model_config, headers, false
        )?;
        trace!("Chat request to {}", request.url);

        let response = self.with_retries(|| self.execute(&request)).await?;
        let completion: ChatCompletion = parse_payload(&response)?;
        debug!(
          "Completion {} used {} tokens",
          completion.id, completion.usage.total_tokens
        );
        Ok(completion)
    }

    /// Like [`Self::create_chat_completion`], but yields fragments as they
    /// arrive. Retries cover opening the stream only.
    pub async fn create_chat_completion_stream(
      &self
    , messages: &[ChatMessage]
    , model_config: &ModelConfig
    , headers: Option<&HashMap<String, String>>
    ) -> Result<ChatStream>
    {   debug!(
          "create_chat_completion_stream: {} messages for {}",
          messages.len(), model_config.name
        );
        let request = self.chat_request(
          messages, model_config, headers, true
        )?;

        let response = self.with_retries(|| self.open(&request)).await?;
        debug!("Stream opened with status {}", response.status);
        Ok(decode_stream(response.body))
    }

    // ===== Models =====

    /// Single attempt; no retry.
    pub async fn list_models(&self) -> Result<Vec<ModelRecord>>
    {   debug!("list_models");
        let response = self.execute(&self.get_request(MODELS_PATH)).await?;
        let list: ModelList = parse_payload(&response)?;
        debug!("Retrieved {} models", list.data.len());
        Ok(list.data)
    }

    /// Single attempt; a 404 comes back as an `Api` error.
    pub async fn get_model(&self, model_id: &str) -> Result<ModelRecord>
    {   debug!("get_model: {}", model_id);
        if model_id.trim().is_empty()
        {   return Err(Error::validation(
              ValidationKind::InvalidModel,
              "Model id is required"
            ));
        }
        // The id is a single path segment.
        if model_id.contains(['/', '?', '#', '%'])
        {   return Err(Error::validation(
              ValidationKind::InvalidModel,
              "Invalid model id"
            ));
        }
        let path = format!("{}/{}", MODELS_PATH, model_id);
        let response = self.execute(&self.get_request(&path)).await?;
        parse_payload(&response)
    }

    // ===== Dispatch =====

    /// Run `attempt` up to `max_retries + 1` times, sleeping between
    /// retryable failures. Anything else is returned as is.
    async fn with_retries<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
      F: FnMut() -> Fut
    , Fut: Future<Output = Result<T>>
    {   let attempts = self.config.max_retries.saturating_add(1);
        let mut made = 0;
        loop
        {   made += 1;
            match attempt().await
            {   Ok(value) => return Ok(value)
              , Err(e) if e.is_retryable() && made < attempts => {
                  let delay = self.config.backoff
                    .backoff_for_attempt(made - 1);
                  warn!(
                    "Attempt {}/{} failed: {}; retrying in {:?}",
                    made, attempts, e, delay
                  );
                  tokio::time::sleep(delay).await;
                }
              , Err(e) => {
                  if e.is_retryable()
                  {   error!("Giving up after {} attempts: {}", made, e);
                  }
                  return Err(e);
                }
            }
        }
    }

    /// One round trip: send and read the whole body within the timeout.
    async fn execute(&self, request: &HttpRequest) -> Result<ApiResponse>
    {   let exchange = async {
          let response = self.transport.send(request).await?;
          let status = response.status;
          let headers = response.headers.clone();
          let body = response.bytes().await?;
          Ok::<_, crate::error::TransportError>((status, headers, body))
        };

        let (status, headers, body)
          = match tokio::time::timeout(self.config.timeout(), exchange).await
          {   Ok(result) => result?
            , Err(_) => {
                warn!("Request timed out after {:?}", self.config.timeout());
                return Err(crate::error::TransportError::Timeout.into());
              }
          };
        trace!("Response status: {}", status);

        if !(200..300).contains(&status)
        {   return Err(error_from_response(status, &headers, &body));
        }

        let data = serde_json::from_slice(&body).map_err(|e| {
          error!("Parse error: {}", e);
          Error::api(format!("Invalid response body: {}", e), Some(status))
        })?;
        Ok(ApiResponse
        {   status_code: status
          , data
          , headers
        })
    }

    /// Send and check the status within the timeout, leaving the body
    /// unread on success.
    async fn open(&self, request: &HttpRequest) -> Result<HttpResponse>
    {   let response
          = match tokio::time::timeout(
              self.config.timeout(),
              self.transport.send(request)
            ).await
          {   Ok(result) => result?
            , Err(_) => {
                warn!("Stream open timed out after {:?}", self.config.timeout());
                return Err(crate::error::TransportError::Timeout.into());
              }
          };

        if response.is_success()
        {   return Ok(response);
        }

        let status = response.status;
        let headers = response.headers.clone();
        let body = match tokio::time::timeout(
          self.config.timeout(),
          response.bytes()
        ).await
        {   Ok(Ok(body)) => body
          , _ => Vec::new()
        };
        Err(error_from_response(status, &headers, &body))
    }
}

fn parse_payload<T: DeserializeOwned>(response: &ApiResponse) -> Result<T>
{   serde_json::from_value(response.data.clone()).map_err(|e| {
      error!("Unexpected payload shape: {}", e);
      Error::api(
        format!("Unexpected response payload: {}", e),
        Some(response.status_code)
      )
    })
}

/// Best available description of a failed response
fn error_message(status: u16, body: &[u8]) -> String
{   if let Ok(envelope) = serde_json::from_slice::<ApiErrorBody>(body)
    {   return envelope.error.message;
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty()
    {   format!("HTTP {}", status)
    } else
    {   text.to_string()
    }
}

/// Seconds from `Retry-After`; fractions round up.
fn parse_retry_after(headers: &HashMap<String, String>) -> u64
{   find_header(headers, "Retry-After")
      .and_then(|value| {
        let value = value.trim();
        value.parse::<u64>().ok().or_else(|| {
          value.parse::<f64>().ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.ceil() as u64)
        })
      })
      .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Map a non-2xx response onto the error taxonomy
fn error_from_response(
  status: u16
, headers: &HashMap<String, String>
, body: &[u8]
) -> Error
{   let message = error_message(status, body);
    error!("API error {}: {}", status, message);
    match status
    {   400 => Error::Validation
        {   kind: ValidationKind::Rejected
          , message
          , status_code: Some(status)
        }
      , 401 | 403 => Error::Authentication
        {   message
          , status_code: status
        }
      , 429 => Error::RateLimit
        {   message
          , retry_after: parse_retry_after(headers)
          , status_code: status
        }
      , _ => Error::api(message, Some(status))
    }
}
