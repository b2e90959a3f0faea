use serde_json::Value;
use std::io::Write;

use super::StreamingArgumentPreview;
use crate::types::{ContentBlock, StreamEvent};

/// A tool call whose arguments have fully arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Accumulated arguments for one in-flight tool-use block.
#[derive(Debug)]
struct StreamBuffer {
    id: String,
    name: String,
    initial_input: Value,
    json: String,
}

/// Routes stream events to the preview and collects finished tool calls.
pub struct ToolStreamMonitor<W: Write> {
    preview: StreamingArgumentPreview<W>,
    buffers: Vec<Option<StreamBuffer>>,
    previewing: Option<usize>,
    text: String,
}

impl<W: Write> ToolStreamMonitor<W> {
    pub fn new(preview: StreamingArgumentPreview<W>) -> Self {
        Self {
            preview,
            buffers: Vec::new(),
            previewing: None,
            text: String::new(),
        }
    }

    pub fn preview(&self) -> &StreamingArgumentPreview<W> {
        &self.preview
    }

    /// Assistant text received since the last call.
    pub fn take_text(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    pub fn handle(&mut self, event: StreamEvent) -> Vec<CompletedToolCall> {
        let mut completed = Vec::new();
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name, input },
            } => {
                if self.buffers.len() <= index {
                    self.buffers.resize_with(index + 1, || None);
                }
                if self.preview.start(&name) {
                    self.previewing = Some(index);
                }
                self.buffers[index] = Some(StreamBuffer {
                    id,
                    name,
                    initial_input: input,
                    json: String::new(),
                });
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                if let Some(text) = delta.text {
                    self.text.push_str(&text);
                }
                if let Some(partial_json) = delta.partial_json {
                    if let Some(Some(buffer)) = self.buffers.get_mut(index) {
                        buffer.json.push_str(&partial_json);
                        if self.previewing == Some(index) {
                            self.preview.feed(&partial_json);
                        }
                    }
                }
            }
            StreamEvent::ContentBlockStop { index } => {
                if self.previewing == Some(index) {
                    self.preview.finish();
                    self.previewing = None;
                }
                if let Some(buffer) = self.buffers.get_mut(index).and_then(Option::take) {
                    if let Some(call) = finish_buffer(buffer) {
                        completed.push(call);
                    }
                }
            }
            StreamEvent::MessageStop => {
                if self.previewing.take().is_some() {
                    self.preview.cancel();
                }
                self.buffers.clear();
            }
            _ => {}
        }
        completed
    }
}

fn finish_buffer(buffer: StreamBuffer) -> Option<CompletedToolCall> {
    let input = if buffer.json.trim().is_empty() {
        buffer.initial_input
    } else {
        match serde_json::from_str(&buffer.json) {
            Ok(input) => input,
            Err(err) => {
                tracing::warn!(tool = %buffer.name, error = %err, "discarding tool call with malformed arguments");
                return None;
            }
        }
    };
    Some(CompletedToolCall {
        id: buffer.id,
        name: buffer.name,
        input,
    })
}
