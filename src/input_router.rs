//! Input Router (spec component 5, §4.5): translates host keystrokes into
//! PTY input while the child is in interactive mode, and maintains a local
//! `(current_line_length, cursor_position)` estimate for bounds-checking
//! arrow keys.
//!
//! Grounded in the teacher's `codex_overlay::input::InputParser` (CSI
//! buffering, CR/LF translation), generalized from that binary's
//! voice-control specific event enum to the plain passive/interactive
//! forwarding contract of §4.5.

/// Whether the owning [`crate::controller::ProcessController`] currently
/// routes keys to the PTY (`Interactive`) or reserves them for host
/// navigation (`Passive`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Passive,
    Interactive,
}

const CTRL_X: u8 = 0x18;
const CR: u8 = b'\r';
const LF: u8 = b'\n';
const BACKSPACE: u8 = 0x7f;
const BACKSPACE_CTRL_H: u8 = 0x08;

/// What the router decided to do with one input event.
#[derive(Debug, PartialEq, Eq)]
pub enum RouterAction {
    /// Forward these bytes to the PTY stdin verbatim (after translation).
    Forward(Vec<u8>),
    /// `Ctrl-X`: leave interactive mode, nothing forwarded.
    ExitInteractive,
    /// Passive mode: the Router does not act; the host's hotkey handler
    /// may still choose to write to the PTY directly (§4.5 last bullet).
    Ignored,
}

/// Local cursor-position estimate the Router keeps for bounds-checking
/// arrow keys, per §4.5.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineEstimate {
    pub current_line_length: usize,
    pub cursor_position: usize,
}

impl LineEstimate {
    fn advance_by(&mut self, graphemes: usize) {
        self.current_line_length += graphemes;
        self.cursor_position += graphemes;
    }

    fn backspace(&mut self) {
        if self.cursor_position == 0 {
            return;
        }
        self.cursor_position -= 1;
        self.current_line_length = self.current_line_length.saturating_sub(1);
    }

    fn reset(&mut self) {
        self.current_line_length = 0;
        self.cursor_position = 0;
    }

    fn move_left(&mut self, n: usize) {
        self.cursor_position = self.cursor_position.saturating_sub(n);
    }

    fn move_right(&mut self, n: usize) {
        self.cursor_position = (self.cursor_position + n).min(self.current_line_length);
    }
}

/// Accumulates bytes of a CSI sequence so arrow/function keys are
/// recognized and forwarded as a single unit rather than byte-by-byte.
/// `introducer_consumed` tracks whether the `[` that follows `ESC` has
/// already been read, since `[` (0x5b) itself falls inside the final-byte
/// range and must never be mistaken for one.
#[derive(Default)]
struct CsiBuffer {
    bytes: Vec<u8>,
    active: bool,
    introducer_consumed: bool,
}

const MAX_CSI_LEN: usize = 32;

fn is_csi_final(byte: u8) -> bool {
    (0x40..=0x7e).contains(&byte)
}

/// Routes host keystrokes to a focused child's PTY stdin, translating per
/// §4.5 and tracking [`LineEstimate`].
#[derive(Default)]
pub struct InputRouter {
    estimate: LineEstimate,
    csi: CsiBuffer,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn estimate(&self) -> LineEstimate {
        self.estimate
    }

    /// Consumes one raw input byte in `mode` and returns the action to
    /// take. Passive mode never forwards; interactive mode implements the
    /// translation rules of §4.5.
    pub fn handle_byte(&mut self, mode: Mode, byte: u8) -> RouterAction {
        if mode == Mode::Passive {
            return RouterAction::Ignored;
        }

        if self.csi.active {
            return self.continue_csi(byte);
        }

        match byte {
            0x1b => {
                self.csi = CsiBuffer {
                    bytes: vec![byte],
                    active: true,
                    introducer_consumed: false,
                };
                RouterAction::Forward(Vec::new())
            }
            CTRL_X => RouterAction::ExitInteractive,
            LF => {
                self.estimate.reset();
                RouterAction::Forward(vec![CR])
            }
            CR => {
                self.estimate.reset();
                RouterAction::Forward(vec![CR])
            }
            BACKSPACE | BACKSPACE_CTRL_H => {
                self.estimate.backspace();
                RouterAction::Forward(vec![byte])
            }
            other => {
                self.estimate.advance_by(1);
                RouterAction::Forward(vec![other])
            }
        }
    }

    fn continue_csi(&mut self, byte: u8) -> RouterAction {
        self.csi.bytes.push(byte);

        if !self.csi.introducer_consumed {
            // This is the `[` right after `ESC` — the CSI introducer, never
            // a final byte, no matter what range it falls in.
            self.csi.introducer_consumed = true;
            if self.csi.bytes.len() < MAX_CSI_LEN {
                return RouterAction::Forward(Vec::new());
            }
        } else if !is_csi_final(byte) && self.csi.bytes.len() < MAX_CSI_LEN {
            return RouterAction::Forward(Vec::new());
        }

        let sequence = std::mem::take(&mut self.csi.bytes);
        self.csi.active = false;
        self.apply_csi_to_estimate(&sequence);
        RouterAction::Forward(sequence)
    }

    /// Arrow keys adjust the line estimate per §4.5; everything else is
    /// forwarded verbatim without changing the estimate.
    fn apply_csi_to_estimate(&mut self, sequence: &[u8]) {
        let Some(&action) = sequence.last() else {
            return;
        };
        match action {
            b'C' => self.estimate.move_right(1), // Right
            b'D' => self.estimate.move_left(1),  // Left
            // Up/Down are always forwarded and approximated as moving by
            // one "line" (screen width); they do not change the
            // left/right bounds-checked cursor_position estimate.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(router: &mut InputRouter, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &b in bytes {
            if let RouterAction::Forward(forwarded) = router.handle_byte(Mode::Interactive, b) {
                out.extend(forwarded);
            }
        }
        out
    }

    #[test]
    fn passive_mode_never_forwards() {
        let mut router = InputRouter::new();
        let action = router.handle_byte(Mode::Passive, b'a');
        assert_eq!(action, RouterAction::Ignored);
    }

    #[test]
    fn newline_becomes_carriage_return() {
        let mut router = InputRouter::new();
        let forwarded = route(&mut router, b"\n");
        assert_eq!(forwarded, vec![CR]);
    }

    #[test]
    fn ctrl_x_exits_without_forwarding() {
        let mut router = InputRouter::new();
        let action = router.handle_byte(Mode::Interactive, CTRL_X);
        assert_eq!(action, RouterAction::ExitInteractive);
    }

    #[test]
    fn arrow_sequence_is_forwarded_as_one_unit() {
        let mut router = InputRouter::new();
        let forwarded = route(&mut router, b"\x1b[C");
        assert_eq!(forwarded, b"\x1b[C");
    }

    #[test]
    fn right_arrow_adjusts_cursor_position_estimate() {
        let mut router = InputRouter::new();
        route(&mut router, b"abc");
        route(&mut router, b"\x1b[D"); // Left
        route(&mut router, b"\x1b[D"); // Left
        let estimate = router.estimate();
        assert_eq!(estimate.current_line_length, 3);
        assert_eq!(estimate.cursor_position, 1);

        route(&mut router, b"\x1b[C"); // Right
        assert_eq!(router.estimate().cursor_position, 2);
    }

    #[test]
    fn printable_input_advances_line_length_and_cursor() {
        let mut router = InputRouter::new();
        route(&mut router, b"abc");
        let estimate = router.estimate();
        assert_eq!(estimate.current_line_length, 3);
        assert_eq!(estimate.cursor_position, 3);
    }

    #[test]
    fn backspace_at_zero_cursor_is_ignored() {
        let mut router = InputRouter::new();
        route(&mut router, &[BACKSPACE]);
        let estimate = router.estimate();
        assert_eq!(estimate.cursor_position, 0);
        assert_eq!(estimate.current_line_length, 0);
    }

    #[test]
    fn enter_resets_estimate_to_zero() {
        let mut router = InputRouter::new();
        route(&mut router, b"abc\n");
        let estimate = router.estimate();
        assert_eq!(estimate.current_line_length, 0);
        assert_eq!(estimate.cursor_position, 0);
    }
}
