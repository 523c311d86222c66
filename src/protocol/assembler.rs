//! Indexed block-event response assembler.
//!
//! Vendor streaming protocols deliver a response as a sequence of content
//! blocks, each opened, extended and closed by events keyed on a block index.
//! Every adapter translates its wire vocabulary into [`BlockEvent`]s and folds
//! them through a [`ResponseAssembler`], which enforces:
//!
//! - strictly sequential, append-only block indices;
//! - text deltas are forwarded as soon as they arrive;
//! - tool-call argument fragments are buffered raw and only decoded, once,
//!   when the block stops. A half-received JSON payload is never interpreted.

use crate::error::CanonicalError;
use crate::protocol::canonical::{FunctionArgs, Segment, ThinkingBlock};

/// Initial payload of a newly opened block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockStart {
    Text(String),
    ToolCall { id: String, name: String },
    Thinking { thinking: String },
    RedactedThinking { data: String },
}

/// Incremental payload for an open block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockDelta {
    Text(String),
    /// Fragment of the JSON argument object of a tool call.
    ToolArguments(String),
    Thinking(String),
    Signature(String),
}

/// One event of the generic block protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEvent {
    Start { index: usize, block: BlockStart },
    Delta { index: usize, delta: BlockDelta },
    Stop { index: usize },
}

#[derive(Debug)]
enum Block {
    Text(String),
    ToolCall {
        id: String,
        name: String,
        pending: String,
        args: Option<FunctionArgs>,
    },
    Thinking {
        block: ThinkingBlock,
    },
}

impl Block {
    fn kind(&self) -> &'static str {
        match self {
            Block::Text(_) => "text",
            Block::ToolCall { .. } => "tool_call",
            Block::Thinking { .. } => "thinking",
        }
    }
}

#[derive(Debug)]
struct Slot {
    block: Block,
    stopped: bool,
}

/// Folds [`BlockEvent`]s into canonical segments.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    slots: Vec<Slot>,
}

impl ResponseAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks opened so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Apply one event. Returns the segment to forward to the live stream,
    /// if the event produced one.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::InvalidResponse`] when the event violates the
    /// block protocol, and [`CanonicalError::Decode`] when a closed tool-call
    /// block does not hold a JSON object.
    pub fn apply(&mut self, event: BlockEvent) -> Result<Option<Segment>, CanonicalError> {
        match event {
            BlockEvent::Start { index, block } => self.start(index, block),
            BlockEvent::Delta { index, delta } => self.delta(index, delta),
            BlockEvent::Stop { index } => self.stop(index),
        }
    }

    fn start(&mut self, index: usize, block: BlockStart) -> Result<Option<Segment>, CanonicalError> {
        if index != self.slots.len() {
            return Err(CanonicalError::InvalidResponse(format!(
                "block start index {index} out of sequence (expected {})",
                self.slots.len()
            )));
        }

        let (block, forward) = match block {
            BlockStart::Text(text) => {
                let forward = (!text.is_empty()).then(|| Segment::Text(text.clone()));
                (Block::Text(text), forward)
            }
            BlockStart::ToolCall { id, name } => (
                Block::ToolCall {
                    id,
                    name,
                    pending: String::new(),
                    args: None,
                },
                None,
            ),
            BlockStart::Thinking { thinking } => (
                Block::Thinking {
                    block: ThinkingBlock {
                        data: thinking,
                        signature: None,
                        redacted: false,
                    },
                },
                None,
            ),
            BlockStart::RedactedThinking { data } => (
                Block::Thinking {
                    block: ThinkingBlock {
                        data,
                        signature: None,
                        redacted: true,
                    },
                },
                None,
            ),
        };

        self.slots.push(Slot {
            block,
            stopped: false,
        });
        Ok(forward)
    }

    fn open_slot(&mut self, index: usize, event: &str) -> Result<&mut Slot, CanonicalError> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            CanonicalError::InvalidResponse(format!(
                "block {event} index {index} references no open block (have {len})"
            ))
        })?;
        if slot.stopped {
            return Err(CanonicalError::InvalidResponse(format!(
                "block {event} index {index} references a closed block"
            )));
        }
        Ok(slot)
    }

    fn delta(&mut self, index: usize, delta: BlockDelta) -> Result<Option<Segment>, CanonicalError> {
        let slot = self.open_slot(index, "delta")?;
        match (&mut slot.block, delta) {
            (Block::Text(text), BlockDelta::Text(delta)) => {
                if delta.is_empty() {
                    return Ok(None);
                }
                text.push_str(&delta);
                Ok(Some(Segment::Text(delta)))
            }
            (Block::ToolCall { pending, .. }, BlockDelta::ToolArguments(fragment)) => {
                pending.push_str(&fragment);
                Ok(None)
            }
            (Block::Thinking { block }, BlockDelta::Thinking(thinking)) => {
                block.data.push_str(&thinking);
                Ok(None)
            }
            (Block::Thinking { block }, BlockDelta::Signature(signature)) => {
                block
                    .signature
                    .get_or_insert_with(String::new)
                    .push_str(&signature);
                Ok(None)
            }
            (block, delta) => Err(CanonicalError::InvalidResponse(format!(
                "delta {delta:?} does not apply to {} block {index}",
                block.kind()
            ))),
        }
    }

    fn stop(&mut self, index: usize) -> Result<Option<Segment>, CanonicalError> {
        let slot = self.open_slot(index, "stop")?;
        slot.stopped = true;
        match &mut slot.block {
            Block::Text(_) => Ok(None),
            Block::ToolCall {
                id,
                name,
                pending,
                args,
            } => {
                let parsed = parse_arguments(pending).map_err(|err| {
                    CanonicalError::Decode(format!(
                        "tool call '{name}' (block {index}) arguments: {err}"
                    ))
                })?;
                pending.clear();
                *args = Some(parsed.clone());
                Ok(Some(Segment::FunctionCall {
                    id: id.clone(),
                    name: name.clone(),
                    args: parsed,
                }))
            }
            Block::Thinking { block } => Ok(Some(Segment::Thinking(block.clone()))),
        }
    }

    /// Materialize the assembled blocks as segments, in block order.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::InvalidResponse`] when a tool-call block was
    /// never closed, since its arguments were never decoded.
    pub fn finish(self) -> Result<Vec<Segment>, CanonicalError> {
        let mut parts = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.into_iter().enumerate() {
            match slot.block {
                Block::Text(text) => parts.push(Segment::Text(text)),
                Block::ToolCall { id, name, args, .. } => {
                    let args = args.ok_or_else(|| {
                        CanonicalError::InvalidResponse(format!(
                            "tool call '{name}' (block {index}) was never closed"
                        ))
                    })?;
                    parts.push(Segment::FunctionCall { id, name, args });
                }
                Block::Thinking { block } => parts.push(Segment::Thinking(block)),
            }
        }
        Ok(parts)
    }
}

fn parse_arguments(raw: &str) -> Result<FunctionArgs, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(FunctionArgs::new());
    }
    serde_json::from_str::<FunctionArgs>(raw)
}
