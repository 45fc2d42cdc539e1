//! Incremental decoding of streamed completions.
//!
//! The body is a sequence of JSON chunk objects. They may arrive back to
//! back with no delimiter, one per line, or as SSE `data:` lines. Blank
//! lines and `:` comments are skipped, `[DONE]` ends the stream, and so
//! does the first chunk with a finish reason. A chunk is yielded as soon
//! as its closing brace has been read.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use log::{debug, error, trace};
use std::pin::Pin;

use crate::error::{Error, Result};
use crate::request::StreamChunk;
use crate::transport::ByteStream;

/// Lazy, single-pass sequence of completion fragments
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

enum Frame
{   Skip
  , Done
  , Chunk(StreamChunk)
}

fn malformed(e: impl std::fmt::Display) -> Error
{   error!("Malformed stream chunk: {}", e);
    Error::api(format!("Malformed stream chunk: {}", e), None)
}

/// One JSON object from the front of `bytes`, with the number of bytes it
/// used. `None` until the object is complete.
fn decode_chunk(bytes: &[u8]) -> Result<Option<(StreamChunk, usize)>>
{   let mut values = serde_json::Deserializer::from_slice(bytes)
      .into_iter::<StreamChunk>();
    match values.next()
    {   Some(Ok(chunk)) => Ok(Some((chunk, values.byte_offset())))
      , Some(Err(e)) if e.is_eof() => Ok(None)
      , Some(Err(e)) => Err(malformed(e))
      , None => Ok(None)
    }
}

/// A non-JSON line: comments, SSE fields, `[DONE]`
fn decode_line(line: &[u8]) -> Result<Frame>
{   let text = std::str::from_utf8(line)
      .map_err(|e| Error::api(format!("Invalid stream frame: {}", e), None))?
      .trim();
    if text == "[DONE]"
    {   return Ok(Frame::Done);
    }
    if !text.is_empty() && !text.starts_with(':')
    {   trace!("Skipping stream line: {}", text);
    }
    Ok(Frame::Skip)
}

/// Next frame at the front of `buffer` and the bytes it spans, or `None`
/// if more input is needed to tell.
fn next_frame(buffer: &[u8]) -> Result<Option<(Frame, usize)>>
{   let start = buffer.iter()
      .position(|b| !b.is_ascii_whitespace())
      .unwrap_or(buffer.len());
    let rest = &buffer[start..];
    if rest.is_empty()
    {   return Ok((start > 0).then_some((Frame::Skip, start)));
    }

    let mut payload = 0;
    if let Some(data) = rest.strip_prefix(b"data:".as_slice())
    {   payload = rest.len() - data.len()
          + data.iter().take_while(|b| **b == b' ' || **b == b'\t').count();
    }
    if rest[payload..].first() == Some(&b'{')
    {   return Ok(decode_chunk(&rest[payload..])?
          .map(|(chunk, used)| (Frame::Chunk(chunk), start + payload + used)));
    }

    match rest.iter().position(|b| *b == b'\n')
    {   Some(end) => {
          let frame = decode_line(&rest[payload..end])?;
          Ok(Some((frame, start + end + 1)))
        }
      , None => Ok(None)
    }
}

/// Turn a response body into chunks. Only an incomplete trailing frame
/// is held back between reads.
pub(crate) fn decode_stream(mut body: ByteStream) -> ChatStream
{   Box::pin(try_stream! {
      let mut buffer: Vec<u8> = Vec::new();
      let mut closed = false;
      let mut finished = false;

      'transport: loop
      {   while let Some((frame, used)) = next_frame(&buffer)?
          {   buffer.drain(..used);
              match frame
              {   Frame::Skip => {}
                , Frame::Done => {
                    finished = true;
                    break 'transport;
                  }
                , Frame::Chunk(chunk) => {
                    let last = chunk.is_finished();
                    yield chunk;
                    if last
                    {   finished = true;
                        break 'transport;
                    }
                  }
              }
          }
          if closed
          {   break;
          }
          match body.next().await
          {   Some(bytes) => buffer.extend_from_slice(&bytes.map_err(Error::from)?)
            , None => {
                // Terminates a final line sent without a newline.
                closed = true;
                buffer.push(b'\n');
              }
          }
      }

      if !finished && buffer.iter().any(|b| !b.is_ascii_whitespace())
      {   Err::<(), Error>(malformed("stream ended inside a chunk"))?;
      }
      debug!("Stream ended");
    })
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::error::TransportError;
    use bytes::Bytes;

    fn body(parts: Vec<&'static str>) -> ByteStream
    {   let items: Vec<std::result::Result<Bytes, TransportError>>
          = parts.into_iter().map(|p| Ok(Bytes::from(p))).collect();
        Box::pin(futures::stream::iter(items))
    }

    async fn collect(stream: ChatStream) -> Vec<Result<StreamChunk>>
    {   stream.collect().await
    }

    #[tokio::test]
    async fn sse_frames_are_decoded_in_order()
    {   let chunks = collect(decode_stream(body(vec![
          "data: {\"choices\":[{\"delta\":{\"content\":\"The\"}}]}\n\n"
        , "data: {\"choices\":[{\"delta\":{\"content\":\" weather\"}}]}\n\n"
        , "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n"
        ]))).await;
        assert_eq!(chunks.len(), 3);
        let first = chunks[0].as_ref().unwrap();
        assert_eq!(first.choices[0].delta.content.as_deref(), Some("The"));
        assert_eq!(chunks[2].as_ref().unwrap().finish_reason(), Some("stop"));
    }

    #[tokio::test]
    async fn frames_split_across_reads_are_reassembled()
    {   let chunks = collect(decode_stream(body(vec![
          "{\"choices\":[{\"delta\":"
        , "{\"content\":\"Hi\"}}]}\n"
        ]))).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
          chunks[0].as_ref().unwrap().choices[0].delta.content.as_deref(),
          Some("Hi")
        );
    }

    #[tokio::test]
    async fn done_marker_and_comments()
    {   let chunks = collect(decode_stream(body(vec![
          ": keep-alive\n"
        , "event: message\n"
        , "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"
        , "data: [DONE]\n"
        , "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n"
        ]))).await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn nothing_is_read_after_finish_reason()
    {   let chunks = collect(decode_stream(body(vec![
          "{\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n"
        , "{not json at all\n"
        ]))).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_ok());
    }

    #[tokio::test]
    async fn unterminated_tail_is_decoded_on_close()
    {   let chunks = collect(decode_stream(body(vec![
          "{\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"
        ]))).await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn malformed_frame_ends_with_an_error()
    {   let chunks = collect(decode_stream(body(vec![
          "{\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n"
        , "{\"choices\": oops}\n"
        ]))).await;
        assert_eq!(chunks.len(), 2);
        let err = chunks[1].as_ref().unwrap_err();
        assert!(err.message().starts_with("Malformed stream chunk"));
    }

    #[tokio::test]
    async fn bare_chunks_without_delimiters()
    {   let chunks = collect(decode_stream(body(vec![
          "{\"choices\":[{\"delta\":{\"content\":\"The\"}}]}"
        , "{\"choices\":[{\"delta\":{\"content\":\" weather\"}}]}{\"choices\":"
        , "[{\"delta\":{\"content\":\" is nice\"}}]}"
        , "{\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}"
        ]))).await;
        assert_eq!(chunks.len(), 4);
        let text: String = chunks.iter()
          .filter_map(|c| c.as_ref().unwrap().choices[0].delta.content.clone())
          .collect();
        assert_eq!(text, "The weather is nice");
        assert!(chunks[3].as_ref().unwrap().is_finished());
    }

    #[tokio::test]
    async fn complete_chunk_is_yielded_while_the_body_stays_open()
    {   let first: Vec<std::result::Result<Bytes, TransportError>> = vec![
          Ok(Bytes::from_static(b"{\"choices\":[{\"delta\":{\"content\":\"now\"}}]}"))
        ];
        let open: ByteStream = Box::pin(
          futures::stream::iter(first).chain(futures::stream::pending())
        );
        let mut stream = decode_stream(open);
        let chunk = tokio::time::timeout(
          std::time::Duration::from_millis(200),
          stream.next()
        ).await
          .expect("chunk held back")
          .unwrap()
          .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("now"));
    }

    #[tokio::test]
    async fn body_closed_inside_a_chunk_is_an_error()
    {   let chunks = collect(decode_stream(body(vec![
          "{\"choices\":[{\"delta\":{\"content\":\"a\"}}]}"
        , "{\"choices\":[{\"del"
        ]))).await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(chunks[1].as_ref().unwrap_err()
          .message().starts_with("Malformed stream chunk"));
    }

    #[tokio::test]
    async fn done_without_trailing_newline()
    {   let chunks = collect(decode_stream(body(vec![
          "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\ndata: [DONE]"
        ]))).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_ok());
    }
}
