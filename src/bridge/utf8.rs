//! Re-cuts backend byte chunks on character boundaries.
//!
//! Text frames must carry valid UTF-8, but a backend read may end in the
//! middle of a multi-byte character. The incomplete tail is held back and
//! prefixed to the next chunk, so the concatenated output equals the input.

use crate::bridge::BridgeError;

#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
    emitted: u64,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one backend chunk. Returns the complete text available so far,
    /// or `None` if the chunk only extended an unfinished character.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<String>, BridgeError> {
        self.pending.extend_from_slice(chunk);

        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(BridgeError::InvalidUtf8 {
                    offset: self.emitted + e.valid_up_to() as u64,
                })
            }
        };
        if complete == 0 {
            return Ok(None);
        }

        let tail = self.pending.split_off(complete);
        let text = std::mem::replace(&mut self.pending, tail);
        self.emitted += complete as u64;

        String::from_utf8(text)
            .map(Some)
            .map_err(|e| BridgeError::InvalidUtf8 {
                offset: self.emitted - complete as u64 + e.utf8_error().valid_up_to() as u64,
            })
    }

    /// Check that the stream did not end inside a character.
    pub fn finish(&self) -> Result<(), BridgeError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::InvalidUtf8 {
                offset: self.emitted,
            })
        }
    }
}
