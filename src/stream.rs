use crate::types::StreamEvent;

const KNOWN_EVENTS: &[&str] = &[
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
];

/// Incremental server-sent-event frame parser.
///
/// Bytes are buffered raw so a multi-byte character split across chunks is
/// only decoded once its frame is complete.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend(chunk.iter().filter(|&&b| b != b'\r'));
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = find_frame_end(&self.buffer[start..]) {
            let event_end = start + end + 2;
            let event_text = String::from_utf8_lossy(&self.buffer[start..event_end]);

            let mut event_type = None;
            let mut data = None;
            for line in event_text.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    event_type = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data = Some(rest.trim().to_string());
                }
            }

            if let (Some(evt_type), Some(json_data)) = (event_type, data) {
                if json_data != "[DONE]" && KNOWN_EVENTS.contains(&evt_type.as_str()) {
                    match serde_json::from_str::<StreamEvent>(&json_data) {
                        Ok(evt) => events.push(evt),
                        Err(err) => tracing::warn!(
                            event_type = %evt_type,
                            data = %json_data,
                            error = %err,
                            "SSE frame parse error"
                        ),
                    }
                }
            }

            start = event_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }

    /// Whatever trailing bytes never formed a complete frame.
    pub fn flush(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned()
    }
}

fn find_frame_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"\n\n")
}
