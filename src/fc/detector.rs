use std::sync::LazyLock;

use memchr::{memchr, memmem};
use smallvec::SmallVec;

use super::parser::{parse_tool_call_block, ParsedToolCall};

// Incremental scanner for emulated tool calls.
//
// Upstream text arrives in arbitrary chunks. The scanner forwards ordinary
// prose as soon as it is safe to do so, consumes `<reasoning>` blocks and
// turns `<tool_call>` blocks into parsed calls.
//
// Key invariants:
// - Text that contains no `<` is forwarded in the same feed that delivered it.
// - A `<` that does not start a recognized delimiter is forwarded unchanged.
// - Delimiters split across chunk boundaries are recognized.
// - Parse failures and oversized blocks degrade to literal text; the scanner
//   never errors.
// - Nothing is lost at end of stream: an unfinished delimiter or block is
//   flushed as literal text, opening delimiter included.

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// State of the scanner automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Forwarding prose; the pending buffer holds no `<`.
    PassThrough,
    /// The pending buffer starts with `<` and may be a delimiter prefix.
    Holding,
    /// Inside `<reasoning>`, buffering until `</reasoning>`.
    InReasoningBlock,
    /// Inside `<tool_call>`, buffering until `</tool_call>`.
    InToolCallBlock,
}

/// Output produced by [`SoftCallDetector::feed`] and [`SoftCallDetector::finish`].
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorOutput {
    /// Plain text to forward. Never empty.
    Text(String),
    /// Body of a closed reasoning block, only produced when reasoning is
    /// preserved.
    Reasoning(String),
    /// A successfully parsed tool-call block.
    ToolCall(ParsedToolCall),
}

/// Outputs of a single feed. Most feeds produce at most a couple of items.
pub type DetectorOutputs = SmallVec<[DetectorOutput; 4]>;

const REASONING_OPEN: &str = "<reasoning>";
const REASONING_CLOSE: &str = "</reasoning>";
const TOOL_CALL_OPEN: &str = "<tool_call>";
const TOOL_CALL_CLOSE: &str = "</tool_call>";
static REASONING_CLOSE_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(REASONING_CLOSE.as_bytes()));
static TOOL_CALL_CLOSE_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(TOOL_CALL_CLOSE.as_bytes()));

/// Default cap on a single block body.
pub const DEFAULT_MAX_BLOCK_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DelimiterMatch {
    Partial,
    Reasoning,
    ToolCall,
    NoMatch,
}

/// Compare the head of `pending` (which starts with `<`) against both
/// opening delimiters.
#[inline]
fn match_open_delimiter(pending: &[u8]) -> DelimiterMatch {
    let mut partial = false;
    for (delimiter, matched) in [
        (REASONING_OPEN, DelimiterMatch::Reasoning),
        (TOOL_CALL_OPEN, DelimiterMatch::ToolCall),
    ] {
        let delimiter = delimiter.as_bytes();
        let n = pending.len().min(delimiter.len());
        if pending[..n] == delimiter[..n] {
            if n == delimiter.len() {
                return matched;
            }
            partial = true;
        }
    }
    if partial {
        DelimiterMatch::Partial
    } else {
        DelimiterMatch::NoMatch
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Streaming `<reasoning>` / `<tool_call>` scanner.
#[derive(Debug)]
pub struct SoftCallDetector {
    state: DetectorState,
    pending: String,
    /// Bytes of `pending` already searched for the closing delimiter.
    scanned: usize,
    preserve_reasoning: bool,
    max_block_bytes: usize,
}

impl Default for SoftCallDetector {
    fn default() -> Self {
        Self::new(false, DEFAULT_MAX_BLOCK_BYTES)
    }
}

impl SoftCallDetector {
    #[must_use]
    pub fn new(preserve_reasoning: bool, max_block_bytes: usize) -> Self {
        Self {
            state: DetectorState::PassThrough,
            pending: String::new(),
            scanned: 0,
            preserve_reasoning,
            max_block_bytes: max_block_bytes.max(1),
        }
    }

    #[must_use]
    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Bytes currently held back from the output.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one upstream text chunk, appending produced items to `out`.
    pub fn feed(&mut self, chunk: &str, out: &mut DetectorOutputs) {
        if chunk.is_empty() {
            return;
        }
        // Fast path: prose with no pending state is forwarded as-is.
        if self.state == DetectorState::PassThrough
            && self.pending.is_empty()
            && memchr(b'<', chunk.as_bytes()).is_none()
        {
            push_text(out, chunk);
            return;
        }
        self.pending.push_str(chunk);
        self.drain(out);
    }

    /// Flush everything still held back. The detector is reset afterwards.
    pub fn finish(&mut self, out: &mut DetectorOutputs) {
        let pending = std::mem::take(&mut self.pending);
        let opening = match self.state {
            DetectorState::PassThrough | DetectorState::Holding => "",
            DetectorState::InReasoningBlock => REASONING_OPEN,
            DetectorState::InToolCallBlock => TOOL_CALL_OPEN,
        };
        if self.state != DetectorState::PassThrough && self.state != DetectorState::Holding {
            tracing::debug!(
                state = ?self.state,
                buffered = pending.len(),
                "softcall: stream ended inside an open block; flushing as text"
            );
        }
        push_text(out, opening);
        push_text(out, &pending);
        self.state = DetectorState::PassThrough;
        self.scanned = 0;
    }

    fn drain(&mut self, out: &mut DetectorOutputs) {
        loop {
            let progressed = match self.state {
                DetectorState::PassThrough => self.step_pass_through(out),
                DetectorState::Holding => self.step_holding(out),
                DetectorState::InReasoningBlock => self.step_block(
                    &REASONING_CLOSE_FINDER,
                    REASONING_OPEN,
                    REASONING_CLOSE,
                    out,
                ),
                DetectorState::InToolCallBlock => self.step_block(
                    &TOOL_CALL_CLOSE_FINDER,
                    TOOL_CALL_OPEN,
                    TOOL_CALL_CLOSE,
                    out,
                ),
            };
            if !progressed {
                return;
            }
        }
    }

    fn step_pass_through(&mut self, out: &mut DetectorOutputs) -> bool {
        match memchr(b'<', self.pending.as_bytes()) {
            None => {
                push_text(out, &self.pending);
                self.pending.clear();
                false
            }
            Some(pos) => {
                push_text(out, &self.pending[..pos]);
                self.pending.drain(..pos);
                self.state = DetectorState::Holding;
                true
            }
        }
    }

    fn step_holding(&mut self, out: &mut DetectorOutputs) -> bool {
        match match_open_delimiter(self.pending.as_bytes()) {
            DelimiterMatch::Partial => false,
            DelimiterMatch::Reasoning => {
                self.enter_block(REASONING_OPEN.len(), DetectorState::InReasoningBlock);
                true
            }
            DelimiterMatch::ToolCall => {
                self.enter_block(TOOL_CALL_OPEN.len(), DetectorState::InToolCallBlock);
                true
            }
            DelimiterMatch::NoMatch => {
                push_text(out, "<");
                self.pending.drain(..1);
                self.state = DetectorState::PassThrough;
                true
            }
        }
    }

    fn enter_block(&mut self, delimiter_len: usize, state: DetectorState) {
        self.pending.drain(..delimiter_len);
        self.scanned = 0;
        self.state = state;
    }

    /// Flush the opening delimiter and the first `len` buffered bytes as
    /// literal text, then resume scanning in pass-through.
    fn abandon_block(&mut self, open: &str, len: usize, out: &mut DetectorOutputs) {
        tracing::debug!(
            buffered = len,
            limit = self.max_block_bytes,
            "softcall: block exceeds size limit; flushing as text"
        );
        push_text(out, open);
        push_text(out, &self.pending[..len]);
        self.pending.drain(..len);
        self.scanned = 0;
        self.state = DetectorState::PassThrough;
    }

    fn step_block(
        &mut self,
        finder: &memmem::Finder<'static>,
        open: &str,
        close: &str,
        out: &mut DetectorOutputs,
    ) -> bool {
        let bytes = self.pending.as_bytes();
        let from = self.scanned;
        let Some(rel) = finder.find(&bytes[from..]) else {
            // Everything before a possible partial closing delimiter is body.
            let body_floor = self.pending.len().saturating_sub(close.len() - 1);
            if body_floor > self.max_block_bytes {
                self.abandon_block(open, self.pending.len(), out);
                return false;
            }
            self.scanned = body_floor;
            return false;
        };

        let end = from + rel;
        if end > self.max_block_bytes {
            self.abandon_block(open, end + close.len(), out);
            return true;
        }
        let body: String = self.pending[..end].to_owned();
        self.pending.drain(..end + close.len());
        self.scanned = 0;
        let state = self.state;
        self.state = DetectorState::PassThrough;

        match state {
            DetectorState::InReasoningBlock => {
                if self.preserve_reasoning {
                    out.push(DetectorOutput::Reasoning(body));
                }
            }
            DetectorState::InToolCallBlock => match parse_tool_call_block(&body) {
                Ok(call) => out.push(DetectorOutput::ToolCall(call)),
                Err(err) => {
                    tracing::debug!("softcall: {err}; emitting block as text");
                    push_text(out, open);
                    push_text(out, &body);
                    push_text(out, close);
                }
            },
            DetectorState::PassThrough | DetectorState::Holding => {}
        }
        true
    }
}

/// Append `text`, merging with a trailing text item from the same feed.
#[inline]
fn push_text(out: &mut DetectorOutputs, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(DetectorOutput::Text(last)) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(DetectorOutput::Text(text.to_owned()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
