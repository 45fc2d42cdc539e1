//! Request and response types for the Genesis chat-completion API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ValidationKind};

// ===== Messages =====

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   System
  , User
  , Assistant
}

impl Role
{   pub fn as_str(&self) -> &'static str
    {   match self
        {   Role::System => "system"
          , Role::User => "user"
          , Role::Assistant => "assistant"
        }
    }
}

impl fmt::Display for Role
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str(self.as_str())
    }
}

impl FromStr for Role
{   type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   match s
        {   "system" => Ok(Role::System)
          , "user" => Ok(Role::User)
          , "assistant" => Ok(Role::Assistant)
          , _ => Err(Error::validation(
              ValidationKind::InvalidRole,
              "Invalid message role"
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: Role
  , pub content: String
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>
}

impl ChatMessage
{   pub fn new(role: Role, content: impl Into<String>) -> Self
    {   ChatMessage
        {   role
          , content: content.into()
          , name: None
        }
    }

    pub fn system(content: impl Into<String>) -> Self
    {   Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self
    {   Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self
    {   Self::new(Role::Assistant, content)
    }

    /// Build a message from an untrusted role string
    pub fn from_parts(
      role: &str
    , content: impl Into<String>
    ) -> Result<Self, Error>
    {   Ok(Self::new(role.parse()?, content))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self
    {   self.name = Some(name.into());
        self
    }
}

// ===== Model configuration =====

pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 1.0;

/// Sampling parameters. Checked by
/// [`crate::validate::validate_model_config`], not on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig
{   pub name: String
  , #[serde(default = "default_max_tokens")]
    pub max_tokens: u32
  , #[serde(default = "default_temperature")]
    pub temperature: f32
  , #[serde(default = "default_top_p")]
    pub top_p: f32
  , #[serde(default)]
    pub frequency_penalty: f32
  , #[serde(default)]
    pub presence_penalty: f32
}

fn default_max_tokens() -> u32 { DEFAULT_MAX_TOKENS }
fn default_temperature() -> f32 { DEFAULT_TEMPERATURE }
fn default_top_p() -> f32 { DEFAULT_TOP_P }

impl ModelConfig
{   pub fn new(name: impl Into<String>) -> Self
    {   ModelConfig
        {   name: name.into()
          , max_tokens: DEFAULT_MAX_TOKENS
          , temperature: DEFAULT_TEMPERATURE
          , top_p: DEFAULT_TOP_P
          , frequency_penalty: 0.0
          , presence_penalty: 0.0
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self
    {   self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self
    {   self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self
    {   self.top_p = top_p;
        self
    }

    pub fn with_penalties(
      mut self
    , frequency_penalty: f32
    , presence_penalty: f32
    ) -> Self
    {   self.frequency_penalty = frequency_penalty;
        self.presence_penalty = presence_penalty;
        self
    }
}

/// Outgoing chat-completion body
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequestBody<'a>
{   pub model: &'a str
  , pub messages: &'a [ChatMessage]
  , pub max_tokens: u32
  , pub temperature: f32
  , pub top_p: f32
  , pub frequency_penalty: f32
  , pub presence_penalty: f32
  , pub stream: bool
}

impl<'a> ChatRequestBody<'a>
{   pub fn new(
      messages: &'a [ChatMessage]
    , config: &'a ModelConfig
    , stream: bool
    ) -> Self
    {   ChatRequestBody
        {   model: &config.name
          , messages
          , max_tokens: config.max_tokens
          , temperature: config.temperature
          , top_p: config.top_p
          , frequency_penalty: config.frequency_penalty
          , presence_penalty: config.presence_penalty
          , stream
        }
    }
}

// ===== Responses =====

/// A successful exchange: status, decoded JSON body, headers
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse
{   pub status_code: u16
  , pub data: serde_json::Value
  , pub headers: HashMap<String, String>
}

impl ApiResponse
{   /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str>
    {   find_header(&self.headers, name)
    }
}

pub(crate) fn find_header<'a>(
  headers: &'a HashMap<String, String>
, name: &str
) -> Option<&'a str>
{   headers.iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion
{   pub id: String
  , pub object: String
  , pub created: i64
  , pub model: String
  , pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Usage
}

impl ChatCompletion
{   /// Content of the first choice, if any
    pub fn content(&self) -> Option<&str>
    {   self.choices.first()
          .map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice
{   #[serde(default)]
    pub index: u32
  , pub message: ChatMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage
{   #[serde(default)]
    pub prompt_tokens: u32
  , #[serde(default)]
    pub completion_tokens: u32
  , #[serde(default)]
    pub total_tokens: u32
}

/// One fragment of a streamed completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>
  , #[serde(default)]
    pub choices: Vec<StreamChoice>
}

impl StreamChunk
{   /// First non-null finish reason among the choices
    pub fn finish_reason(&self) -> Option<&str>
    {   self.choices.iter()
          .find_map(|c| c.finish_reason.as_deref())
    }

    pub fn is_finished(&self) -> bool
    {   self.finish_reason().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChoice
{   #[serde(default)]
    pub index: u32
  , #[serde(default)]
    pub delta: Delta
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>
}

// ===== Models endpoint =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord
{   pub id: String
  , #[serde(default = "default_model_object")]
    pub object: String
  , #[serde(default)]
    pub created: Option<i64>
  , #[serde(default)]
    pub owned_by: Option<String>
  , #[serde(default)]
    pub permission: Vec<serde_json::Value>
}

fn default_model_object() -> String { "model".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelList
{   pub data: Vec<ModelRecord>
}

// ===== Errors on the wire =====

/// Vendor error envelope: `{"error": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody
{   pub error: ApiErrorDetail
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail
{   pub message: String
  , #[serde(default, rename = "type")]
    pub kind: Option<String>
  , #[serde(default)]
    pub param: Option<serde_json::Value>
  , #[serde(default)]
    pub code: Option<serde_json::Value>
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn chat_message_defaults_to_no_name()
    {   let message = ChatMessage::user("Hello, world!");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "Hello, world!");
        assert!(message.name.is_none());

        let named = ChatMessage::user("Hello").with_name("John");
        assert_eq!(named.name.as_deref(), Some("John"));
        let wire = serde_json::to_value(&named).unwrap();
        assert_eq!(wire, json!({"role": "user", "content": "Hello", "name": "John"}));
    }

    #[test]
    fn unknown_role_is_rejected_on_parse()
    {   let err = ChatMessage::from_parts("invalid_role", "Hello").unwrap_err();
        assert_eq!(err.validation_kind(), Some(ValidationKind::InvalidRole));
        assert_eq!(err.to_string(), "Invalid message role");

        let parsed: Result<ChatMessage, _>
          = serde_json::from_value(json!({"role": "bot", "content": "hi"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn model_config_fills_defaults()
    {   let config = ModelConfig::new("test-model");
        assert_eq!(config.name, "test-model");
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.top_p, DEFAULT_TOP_P);
        assert_eq!(config.frequency_penalty, 0.0);

        let parsed: ModelConfig
          = serde_json::from_value(json!({"name": "genesis-gpt-4", "max_tokens": 1000}))
            .unwrap();
        assert_eq!(parsed.max_tokens, 1000);
        assert_eq!(parsed.temperature, DEFAULT_TEMPERATURE);
    }

    #[test]
    fn request_body_carries_every_sampling_field()
    {   let messages = vec![ChatMessage::user("test")];
        let config = ModelConfig::new("genesis-gpt-4")
          .with_top_p(0.9)
          .with_penalties(0.5, 0.25);
        let body = serde_json::to_value(
          ChatRequestBody::new(&messages, &config, true)
        ).unwrap();
        assert_eq!(body["model"], "genesis-gpt-4");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["stream"], true);
        assert_eq!(body["frequency_penalty"], 0.5);
        assert_eq!(body["presence_penalty"], 0.25);
        assert!(body.get("top_p").is_some());
    }

    #[test]
    fn completion_survives_reserialization()
    {   let payload = json!({
          "id": "chat-123",
          "object": "chat.completion",
          "created": 1677610602,
          "model": "genesis-gpt-4",
          "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "The weather looks pleasant today!"},
            "finish_reason": "stop"
          }],
          "usage": {"prompt_tokens": 25, "completion_tokens": 8, "total_tokens": 33}
        });
        let completion: ChatCompletion
          = serde_json::from_value(payload).unwrap();
        let again: ChatCompletion = serde_json::from_str(
          &serde_json::to_string(&completion).unwrap()
        ).unwrap();
        assert_eq!(again.id, "chat-123");
        assert_eq!(again.model, "genesis-gpt-4");
        assert_eq!(again.usage.total_tokens, 33);
        assert_eq!(again.content(), Some("The weather looks pleasant today!"));
    }

    #[test]
    fn sparse_completion_uses_defaults()
    {   let completion: ChatCompletion = serde_json::from_value(json!({
          "id": "chat-retry-success",
          "object": "chat.completion",
          "created": 1677610602,
          "model": "genesis-gpt-4",
          "choices": [{"message": {"role": "assistant", "content": "Success after retry"}}],
          "usage": {"total_tokens": 10}
        })).unwrap();
        assert_eq!(completion.choices[0].index, 0);
        assert!(completion.choices[0].finish_reason.is_none());
        assert_eq!(completion.usage.prompt_tokens, 0);
        assert_eq!(completion.usage.total_tokens, 10);
    }

    #[test]
    fn stream_chunk_reports_finish_reason()
    {   let partial: StreamChunk = serde_json::from_value(
          json!({"choices": [{"delta": {"content": "The"}}]})
        ).unwrap();
        assert_eq!(partial.choices[0].delta.content.as_deref(), Some("The"));
        assert!(!partial.is_finished());

        let last: StreamChunk = serde_json::from_value(
          json!({"choices": [{"delta": {}, "finish_reason": "stop"}]})
        ).unwrap();
        assert_eq!(last.finish_reason(), Some("stop"));
    }

    #[test]
    fn api_response_headers_ignore_case()
    {   let response = ApiResponse
        {   status_code: 200
          , data: json!({"message": "success"})
          , headers: HashMap::from([
              ("Content-Type".to_string(), "application/json".to_string())
            ])
        };
        assert_eq!(response.status_code, 200);
        assert_eq!(response.data["message"], "success");
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[test]
    fn model_record_tolerates_missing_fields()
    {   let record: ModelRecord = serde_json::from_value(json!({
          "id": "genesis-gpt-4",
          "object": "model",
          "created": 1677610602,
          "owned_by": "genesis-ai",
          "permission": []
        })).unwrap();
        assert_eq!(record.owned_by.as_deref(), Some("genesis-ai"));

        let bare: ModelRecord
          = serde_json::from_value(json!({"id": "genesis-mini"})).unwrap();
        assert_eq!(bare.object, "model");
        assert!(bare.created.is_none());
    }
}
