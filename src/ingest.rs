//! Output Ingestor (spec component 4, §4.4): holds the carry buffer across
//! PTY reads and feeds the VT parser, honoring the 1024-byte chunk-boundary
//! rule literally.
//!
//! The teacher's own `split_incomplete_escape` (see `pty_session::io`) is a
//! general "scan back from the last unconsumed ESC and hold back an
//! unterminated sequence" rule applied to every read, needed because the
//! teacher forwards raw bytes straight to a terminal without a stateful
//! parser of its own. Here the ingestor drives a `vte::Parser`, which
//! already carries its escape/UTF-8 decode state *between* `advance()`
//! calls — so a split sequence is handled correctly regardless of where a
//! chunk boundary falls. The only behavior this module must still add on
//! top of that is the literal rule: a chunk of exactly
//! [`crate::pty::READ_CHUNK_SIZE`] bytes is held back and *not* parsed yet,
//! because more is assumed to be arriving immediately (concrete scenario 6
//! and Testable Property 2 were written against this exact timing).

use vte::Parser;

use crate::pty::READ_CHUNK_SIZE;
use crate::screen::parser::ScreenPerform;
use crate::screen::ScreenBuffer;

/// Carry buffer plus the `vte` parser state machine (ground, escape,
/// CSI-parameter, OSC-string, UTF-8 continuation all live inside
/// `vte::Parser` itself, which is why no separate tail-splitting logic is
/// needed here).
pub struct Ingestor {
    carry: Vec<u8>,
    parser: Parser,
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new()
    }
}

impl Ingestor {
    pub fn new() -> Self {
        Self {
            carry: Vec::new(),
            parser: Parser::new(),
        }
    }

    /// Feeds one delivered chunk into the ingestor, applying the
    /// 1024-byte hazard rule, and drives `screen` with whatever is ready.
    pub fn ingest(&mut self, chunk: &[u8], screen: &mut ScreenBuffer) {
        self.carry.extend_from_slice(chunk);
        if chunk.len() == READ_CHUNK_SIZE {
            // More is expected immediately; do not parse yet.
            return;
        }
        let data = std::mem::take(&mut self.carry);
        let mut perform = ScreenPerform { screen };
        for &byte in &data {
            self.parser.advance(&mut perform, byte);
        }
        // A grapheme cluster split across two distinct child writes (rare)
        // is not reconstructed past this point; within one delivered chunk
        // — the common case a single `write()` syscall produces — it is.
        // See `ScreenBuffer::write_char`.
        screen.flush_pending();
    }

    /// True if bytes are currently held back awaiting the next chunk
    /// (only possible right after a chunk of exactly
    /// [`READ_CHUNK_SIZE`] bytes).
    pub fn has_pending_carry(&self) -> bool {
        !self.carry.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_stream_and_split_stream_produce_identical_screens() {
        let input = b"hello \x1b[31mworld\x1b[0m!\n";

        let mut whole_screen = ScreenBuffer::new(20, 3, 10);
        let mut whole = Ingestor::new();
        whole.ingest(input, &mut whole_screen);

        let mut split_screen = ScreenBuffer::new(20, 3, 10);
        let mut split = Ingestor::new();
        for chunk in input.chunks(3) {
            split.ingest(chunk, &mut split_screen);
        }

        assert_eq!(whole_screen.row(0), split_screen.row(0));
        assert_eq!(whole_screen.cursor(), split_screen.cursor());
    }

    #[test]
    fn exact_1024_byte_chunk_is_held_without_parsing() {
        let chunk = vec![b'a'; READ_CHUNK_SIZE];
        let mut screen = ScreenBuffer::new(80, 24, 10);
        let mut ingestor = Ingestor::new();
        ingestor.ingest(&chunk, &mut screen);
        assert!(ingestor.has_pending_carry());
        assert_eq!(screen.cursor(), (0, 0), "nothing should be parsed yet");
    }

    #[test]
    fn escape_straddling_the_1024_boundary_still_applies_correctly() {
        // "set red" (\x1b[31m) positioned so the escape bytes straddle an
        // exact-1024-byte chunk boundary, matching concrete scenario 6.
        let prefix_len = READ_CHUNK_SIZE - 3;
        let mut first_chunk = vec![b'x'; prefix_len];
        first_chunk.extend_from_slice(b"\x1b[3"); // split mid-CSI-parameter
        assert_eq!(first_chunk.len(), READ_CHUNK_SIZE);
        let second_chunk = b"1mY".to_vec();

        let mut screen = ScreenBuffer::new(2000, 24, 10);
        let mut ingestor = Ingestor::new();
        ingestor.ingest(&first_chunk, &mut screen);
        ingestor.ingest(&second_chunk, &mut screen);

        let (cursor_col, _) = screen.cursor();
        let written = screen.row(0)[cursor_col - 1].clone();
        assert_eq!(written.grapheme, "Y");
        match written.pen.fg {
            Some(crate::screen::Color::Indexed(1)) => {}
            other => panic!("expected red applied after the split escape, got {other:?}"),
        }
    }
}
