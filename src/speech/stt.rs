//! Speech recognition boundary
//!
//! Recognition itself is provided by the host; this module only defines the
//! blocking call the listen gate makes and a console stand-in.

use crate::{Result, ZadeError};
use std::io::BufRead;

/// What one listen attempt captured
#[derive(Clone, Debug, Default)]
pub struct Heard {
    /// Recognized text, if anything intelligible was said
    pub transcript: Option<String>,

    /// Raw 16-bit PCM that was captured, used for level metering
    pub pcm: Vec<i16>,
}

impl Heard {
    pub fn text(transcript: impl Into<String>) -> Self {
        Self {
            transcript: Some(transcript.into()),
            pcm: Vec::new(),
        }
    }

    pub fn silence(pcm: Vec<i16>) -> Self {
        Self {
            transcript: None,
            pcm,
        }
    }
}

/// Blocking "transcribe the next utterance" call
pub trait Recognizer: Send {
    /// Open the microphone, wait for one utterance and transcribe it
    ///
    /// `Ok(None)` means the input source is exhausted.
    fn next_utterance(&mut self) -> Result<Option<Heard>>;
}

/// Treats each line of a reader as one recognized utterance
pub struct LineRecognizer<R> {
    reader: R,
}

impl<R: BufRead> LineRecognizer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl LineRecognizer<std::io::BufReader<std::io::Stdin>> {
    /// Read typed input from the console
    pub fn stdin() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()))
    }
}

impl<R: BufRead + Send> Recognizer for LineRecognizer<R> {
    fn next_utterance(&mut self) -> Result<Option<Heard>> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| ZadeError::RecognitionError(e.to_string()))?;

        if read == 0 {
            return Ok(None);
        }

        let line = line.trim();
        if line.is_empty() {
            Ok(Some(Heard::default()))
        } else {
            Ok(Some(Heard::text(line)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_line_recognizer() {
        let mut recognizer = LineRecognizer::new(Cursor::new("lets chat\n\n  Open Firefox  \n"));

        let first = recognizer.next_utterance().unwrap().unwrap();
        assert_eq!(first.transcript.as_deref(), Some("lets chat"));

        let blank = recognizer.next_utterance().unwrap().unwrap();
        assert!(blank.transcript.is_none());

        let third = recognizer.next_utterance().unwrap().unwrap();
        assert_eq!(third.transcript.as_deref(), Some("Open Firefox"));

        assert!(recognizer.next_utterance().unwrap().is_none());
    }
}
