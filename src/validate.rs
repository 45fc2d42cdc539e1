//! Pre-flight request checks. Nothing here touches the network.

use log::debug;

use crate::error::{Error, Result, ValidationKind};
use crate::request::{ChatMessage, ModelConfig};

/// Longest accepted message content, in characters
pub const MAX_CONTENT_LENGTH: usize = 32_768;

/// Reject empty conversations and empty or oversized content. Messages are checked in order; the first failure wins.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<()>
{   if messages.is_empty()
    {   return Err(Error::validation(
          ValidationKind::EmptyMessages,
          "Messages cannot be empty"
        ));
    }

    // Role is closed, so role strings were already checked when parsed.
    for (index, message) in messages.iter().enumerate()
    {   if message.content.is_empty()
        {   debug!("Message {} has empty content", index);
            return Err(Error::validation(
              ValidationKind::EmptyContent,
              "Message content cannot be empty"
            ));
        }
        if message.content.chars().count() > MAX_CONTENT_LENGTH
        {   debug!("Message {} exceeds {} chars", index, MAX_CONTENT_LENGTH);
            return Err(Error::validation(
              ValidationKind::ContentTooLong,
              "Message content too long"
            ));
        }
    }
    Ok(())
}

/// Range-check sampling parameters. Each check stands alone.
pub fn validate_model_config(config: &ModelConfig) -> Result<()>
{   if config.name.trim().is_empty()
    {   return Err(Error::validation(
          ValidationKind::InvalidModel,
          "Model name is required"
        ));
    }
    if !(0.0..=2.0).contains(&config.temperature)
    {   return Err(Error::validation(
          ValidationKind::InvalidTemperature,
          "Temperature must be between 0 and 2"
        ));
    }
    if config.max_tokens == 0
    {   return Err(Error::validation(
          ValidationKind::InvalidMaxTokens,
          "Max tokens must be positive"
        ));
    }
    if !(0.0..=1.0).contains(&config.top_p)
    {   return Err(Error::validation(
          ValidationKind::InvalidTopP,
          "Top_p must be between 0 and 1"
        ));
    }
    Ok(())
}
