// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame format: `[length:4][tag:4][timestamp:4][payload:4*N]`
//!
//! Every field is a big-endian `u32`. `length` counts the bytes following it, so the smallest
//! frame (a shutdown) has a length of 8.
//!
//! | tag | message  | payload                                   |
//! |-----|----------|-------------------------------------------|
//! | 1   | Request  | id, tickets, date count, dates...         |
//! | 2   | Vote     | id, 0 (no) or 1 (yes)                     |
//! | 3   | Decision | id, 0 (rollback) or 1 (commit)            |
//! | 4   | Ack      | id                                        |
//! | 5   | Shutdown | (none)                                    |

use crate::booking::{BookingRequest, Decision};
use crate::error::DecodeError;

use super::{Frame, Message};

/// Largest accepted value of the length prefix.
pub const MAX_FRAME_LEN: usize = 4096;

const WORD: usize = 4;
const HEADER_WORDS: usize = 2;
const REQUEST_FIXED_WORDS: usize = 3;

/// Most dates a single request can carry without exceeding [`MAX_FRAME_LEN`].
pub const MAX_REQUEST_DATES: usize = MAX_FRAME_LEN / WORD - HEADER_WORDS - REQUEST_FIXED_WORDS;

const TAG_REQUEST: u32 = 1;
const TAG_VOTE: u32 = 2;
const TAG_DECISION: u32 = 3;
const TAG_ACK: u32 = 4;
const TAG_SHUTDOWN: u32 = 5;

/// Serializes a frame, including its length prefix.
///
/// # Errors
///
/// Returns [`DecodeError::FrameTooLarge`] if the receiver would reject the frame's length.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, DecodeError> {
    let mut words = vec![0, frame.timestamp];
    match &frame.message {
        Message::Request(request) => {
            words[0] = TAG_REQUEST;
            words.push(request.id());
            words.push(request.tickets());
            words.push(request.dates().len() as u32);
            words.extend_from_slice(request.dates());
        }
        Message::Vote { id, vote } => {
            words[0] = TAG_VOTE;
            words.push(*id);
            words.push(u32::from(*vote));
        }
        Message::Decision { id, decision } => {
            words[0] = TAG_DECISION;
            words.push(*id);
            words.push(match decision {
                Decision::Rollback => 0,
                Decision::Commit => 1,
            });
        }
        Message::Ack(id) => {
            words[0] = TAG_ACK;
            words.push(*id);
        }
        Message::Shutdown => words[0] = TAG_SHUTDOWN,
    }

    let len = words.len() * WORD;
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::FrameTooLarge(len));
    }

    let mut buf = Vec::with_capacity(WORD + len);
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    for word in words {
        buf.extend_from_slice(&word.to_be_bytes());
    }
    Ok(buf)
}

/// Decodes the first frame in `buf`.
///
/// Returns `None` if `buf` does not yet hold a complete frame. Otherwise returns the number of
/// bytes the frame occupied together with the decoded frame or the reason it is invalid. An
/// invalid frame still reports its length so the caller can skip it; an oversized length prefix
/// consumes the entire buffer since no frame boundary can be trusted after it.
pub fn decode_frame(buf: &[u8]) -> Option<(usize, Result<Frame, DecodeError>)> {
    let prefix = read_word(buf, 0)? as usize;
    if prefix > MAX_FRAME_LEN {
        return Some((buf.len(), Err(DecodeError::FrameTooLarge(prefix))));
    }

    let consumed = WORD + prefix;
    if buf.len() < consumed {
        return None;
    }

    let body = &buf[WORD..consumed];
    if body.len() % WORD != 0 || body.len() < HEADER_WORDS * WORD {
        return Some((
            consumed,
            Err(DecodeError::BadLength {
                tag: read_word(body, 0).unwrap_or(0),
                len: body.len(),
            }),
        ));
    }

    let words = body
        .chunks_exact(WORD)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<_>>();

    Some((consumed, decode_words(&words)))
}

fn decode_words(words: &[u32]) -> Result<Frame, DecodeError> {
    let tag = words[0];
    let timestamp = words[1];
    let payload = &words[HEADER_WORDS..];
    let bad_length = || DecodeError::BadLength {
        tag,
        len: payload.len() * WORD,
    };

    let message = match tag {
        TAG_REQUEST => {
            if payload.len() < REQUEST_FIXED_WORDS {
                return Err(bad_length());
            }
            let declared = payload[2];
            let dates = &payload[REQUEST_FIXED_WORDS..];
            if declared as usize != dates.len() {
                return Err(DecodeError::DateCountMismatch {
                    declared,
                    actual: dates.len(),
                });
            }
            Message::Request(BookingRequest::new(payload[0], payload[1], dates.to_vec()))
        }
        TAG_VOTE => match payload {
            [id, 0] => Message::Vote {
                id: *id,
                vote: false,
            },
            [id, 1] => Message::Vote { id: *id, vote: true },
            [_, value] => return Err(DecodeError::InvalidFlag { tag, value: *value }),
            _ => return Err(bad_length()),
        },
        TAG_DECISION => match payload {
            [id, 0] => Message::Decision {
                id: *id,
                decision: Decision::Rollback,
            },
            [id, 1] => Message::Decision {
                id: *id,
                decision: Decision::Commit,
            },
            [_, value] => return Err(DecodeError::InvalidFlag { tag, value: *value }),
            _ => return Err(bad_length()),
        },
        TAG_ACK => match payload {
            [id] => Message::Ack(*id),
            _ => return Err(bad_length()),
        },
        TAG_SHUTDOWN => {
            if !payload.is_empty() {
                return Err(bad_length());
            }
            Message::Shutdown
        }
        other => return Err(DecodeError::UnknownTag(other)),
    };

    Ok(Frame { timestamp, message })
}

fn read_word(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + WORD)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Accumulates bytes read from a stream and yields the frames they complete.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Result<Frame, DecodeError>> {
        let (consumed, result) = decode_frame(&self.pending)?;
        self.pending.drain(..consumed);
        Some(result)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(message: Message) -> Frame {
        Frame {
            timestamp: 1_445_000_000,
            message,
        }
    }

    fn raw(words: &[u32]) -> Vec<u8> {
        let mut buf = ((words.len() * WORD) as u32).to_be_bytes().to_vec();
        for word in words {
            buf.extend_from_slice(&word.to_be_bytes());
        }
        buf
    }

    #[test]
    fn request_layout() {
        let encoded = encode_frame(&frame(Message::Request(BookingRequest::new(
            1,
            2,
            vec![1, 2],
        ))))
        .unwrap();
        assert_eq!(encoded, raw(&[TAG_REQUEST, 1_445_000_000, 1, 2, 2, 1, 2]));

        let (consumed, decoded) = decode_frame(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(
            decoded.unwrap().message,
            Message::Request(BookingRequest::new(1, 2, vec![1, 2]))
        );
    }

    #[test]
    fn every_variant_decodes() {
        let messages = vec![
            Message::Vote { id: 3, vote: true },
            Message::Vote {
                id: 3,
                vote: false,
            },
            Message::Decision {
                id: 4,
                decision: Decision::Commit,
            },
            Message::Decision {
                id: 4,
                decision: Decision::Rollback,
            },
            Message::Ack(5),
            Message::Shutdown,
        ];

        for message in messages {
            let encoded = encode_frame(&frame(message.clone())).unwrap();
            let (_, decoded) = decode_frame(&encoded).unwrap();
            assert_eq!(decoded.unwrap().message, message);
        }
    }

    #[test]
    fn incomplete_frame_waits_for_more() {
        let encoded = encode_frame(&frame(Message::Ack(9))).unwrap();
        assert!(decode_frame(&encoded[..2]).is_none());
        assert!(decode_frame(&encoded[..encoded.len() - 1]).is_none());
    }

    /// A request whose date count disagrees with its payload is a protocol violation.
    #[test]
    fn date_count_mismatch() {
        let buf = raw(&[TAG_REQUEST, 0, 1, 2, 3, 1, 2]);
        let (consumed, decoded) = decode_frame(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(
            decoded,
            Err(DecodeError::DateCountMismatch {
                declared: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn malformed_frames() {
        let (_, decoded) = decode_frame(&raw(&[99, 0])).unwrap();
        assert_eq!(decoded, Err(DecodeError::UnknownTag(99)));

        let (_, decoded) = decode_frame(&raw(&[TAG_ACK, 0, 1, 2])).unwrap();
        assert_eq!(
            decoded,
            Err(DecodeError::BadLength {
                tag: TAG_ACK,
                len: 8
            })
        );

        let (_, decoded) = decode_frame(&raw(&[TAG_VOTE, 0, 1, 7])).unwrap();
        assert_eq!(
            decoded,
            Err(DecodeError::InvalidFlag {
                tag: TAG_VOTE,
                value: 7
            })
        );

        let (_, decoded) = decode_frame(&raw(&[TAG_REQUEST, 0, 1])).unwrap();
        assert!(matches!(decoded, Err(DecodeError::BadLength { .. })));

        let oversized = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        let (consumed, decoded) = decode_frame(&oversized).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(decoded, Err(DecodeError::FrameTooLarge(MAX_FRAME_LEN + 1)));
    }

    /// The buffer skips an invalid frame and still yields the frames around it.
    #[test]
    fn frame_buffer_resynchronises() {
        let mut bytes = encode_frame(&frame(Message::Ack(1))).unwrap();
        bytes.extend(raw(&[42, 0]));
        bytes.extend(encode_frame(&frame(Message::Ack(2))).unwrap());

        let mut buffer = FrameBuffer::new();
        buffer.extend(&bytes[..5]);
        assert!(buffer.next_frame().is_none());
        buffer.extend(&bytes[5..]);

        assert_eq!(buffer.next_frame().unwrap().unwrap().message, Message::Ack(1));
        assert_eq!(
            buffer.next_frame().unwrap(),
            Err(DecodeError::UnknownTag(42))
        );
        assert_eq!(buffer.next_frame().unwrap().unwrap().message, Message::Ack(2));
        assert!(buffer.next_frame().is_none());
        assert!(buffer.is_empty());
    }

    /// A request too long for one frame is refused rather than sent and misread.
    #[test]
    fn oversized_request_is_not_encoded() {
        let largest = BookingRequest::new(1, 1, (0..MAX_REQUEST_DATES as u32).collect());
        let encoded = encode_frame(&frame(Message::Request(largest))).unwrap();
        assert_eq!(encoded.len(), WORD + MAX_FRAME_LEN);
        assert!(decode_frame(&encoded).unwrap().1.is_ok());

        let too_many = BookingRequest::new(1, 1, (0..=MAX_REQUEST_DATES as u32).collect());
        assert_eq!(
            encode_frame(&frame(Message::Request(too_many))),
            Err(DecodeError::FrameTooLarge(MAX_FRAME_LEN + WORD))
        );
    }
}
