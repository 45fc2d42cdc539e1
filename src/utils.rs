//! Small helpers for callers budgeting or displaying completions

use chrono::{DateTime, Utc};

use crate::request::ChatMessage;

/// Rough token count: one token per whitespace-separated word
pub fn estimate_tokens(content: &str) -> usize
{   content.split_whitespace().count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate
{   pub message_count: usize
  , pub estimated_tokens: usize
}

pub fn calculate_token_usage(messages: &[ChatMessage]) -> TokenEstimate
{   TokenEstimate
    {   message_count: messages.len()
      , estimated_tokens: messages.iter()
          .map(|m| estimate_tokens(&m.content))
          .sum()
    }
}

/// RFC 3339 rendering of a unix timestamp, e.g. `ChatCompletion::created`
pub fn format_timestamp(timestamp: i64) -> String
{   match DateTime::<Utc>::from_timestamp(timestamp, 0)
    {   Some(time) => time.to_rfc3339()
      , None => timestamp.to_string()
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn tokens_are_words()
    {   assert_eq!(estimate_tokens("Hello"), 1);
        assert_eq!(estimate_tokens("Hello world"), 2);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("A very long message with many words"), 7);
    }

    #[test]
    fn usage_sums_every_message()
    {   let usage = calculate_token_usage(&[
          ChatMessage::user("Hello")
        , ChatMessage::assistant("Hi there!")
        ]);
        assert_eq!(usage.message_count, 2);
        assert_eq!(usage.estimated_tokens, 3);
    }

    #[test]
    fn timestamps_render_as_utc()
    {   assert_eq!(format_timestamp(1677610602), "2023-02-28T18:56:42+00:00");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }
}
