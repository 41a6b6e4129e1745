//! Accumulation of streamed assistant output

use std::collections::HashMap;

use crate::types::messages::{AssistantMessage, BlockKind};

/// One growing buffer that a complete message can overwrite
#[derive(Debug, Default, Clone)]
struct Buffer {
    content: String,
    // Set once a complete message replaced the deltas; the next delta starts
    // a new message
    finalized: bool,
}

impl Buffer {
    fn append(&mut self, fragment: &str) {
        if self.finalized {
            self.content.clear();
            self.finalized = false;
        }
        self.content.push_str(fragment);
    }

    fn supersede(&mut self, authoritative: String) {
        self.content = authoritative;
        self.finalized = true;
    }

    fn clear(&mut self) {
        self.content.clear();
        self.finalized = false;
    }
}

/// Per-turn streaming state
///
/// Text and reasoning are kept in separate buffers. Open content blocks are
/// remembered by index so a `content_block_stop` can be tagged with the kind
/// its `content_block_start` announced.
#[derive(Debug, Default, Clone)]
pub struct StreamBuffers {
    text: Buffer,
    thinking: Buffer,
    open_blocks: HashMap<u32, BlockKind>,
}

impl StreamBuffers {
    /// Forget everything from the previous turn
    pub fn reset(&mut self) {
        self.text.clear();
        self.thinking.clear();
        self.open_blocks.clear();
    }

    /// A new assistant message starts streaming
    pub fn message_started(&mut self) {
        self.open_blocks.clear();
    }

    /// Append a text fragment
    pub fn push_text(&mut self, fragment: &str) {
        self.text.append(fragment);
    }

    /// Append a reasoning fragment
    pub fn push_thinking(&mut self, fragment: &str) {
        self.thinking.append(fragment);
    }

    /// Remember the kind of the block opened at `index`
    pub fn block_started(&mut self, index: u32, kind: BlockKind) {
        self.open_blocks.insert(index, kind);
    }

    /// Close the block at `index`, returning the kind it opened with
    pub fn block_stopped(&mut self, index: u32) -> Option<BlockKind> {
        self.open_blocks.remove(&index)
    }

    /// Replace streamed output with a complete message
    ///
    /// Only the buffers the message actually carries content for are
    /// replaced, so a tool-use-only message leaves the streamed text intact.
    pub fn supersede(&mut self, message: &AssistantMessage) {
        let has = |kind: BlockKind| message.message.content.iter().any(|b| b.kind() == kind);

        if has(BlockKind::Text) {
            self.text.supersede(message.text());
        }
        if has(BlockKind::Thinking) {
            self.thinking.supersede(message.thinking());
        }
    }

    /// Text accumulated for the current message
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text.content
    }

    /// Reasoning accumulated for the current message
    #[must_use]
    pub fn thinking(&self) -> &str {
        &self.thinking.content
    }
}
