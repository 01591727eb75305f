//! Incremental parser for the upstream's server-sent-event framing.
//! Chunks arrive at arbitrary byte boundaries; complete `data:` lines are
//! unwrapped into bare content deltas and everything else is dropped, so
//! the relayed stream concatenates to plain generated text.

/// Line-buffering accumulator over streamed SSE chunks.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    /// Folds one chunk in and returns the content deltas completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);
        let mut deltas = Vec::new();
        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            if let Some(delta) = delta_from_line(line.trim_end()) {
                deltas.push(delta);
            }
        }
        deltas
    }
}

fn delta_from_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    // Malformed event payloads are skipped, not fatal.
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n"
        )
    }

    #[test]
    fn unwraps_complete_events() {
        let mut buffer = SseBuffer::default();
        let deltas = buffer.push(&format!("{}{}", event("<flu"), event("ff>")));
        assert_eq!(deltas, vec!["<flu", "ff>"]);
    }

    #[test]
    fn buffers_events_split_across_chunks() {
        let mut buffer = SseBuffer::default();
        let whole = event("hello");
        let (head, tail) = whole.split_at(whole.len() / 2);
        assert!(buffer.push(head).is_empty());
        assert_eq!(buffer.push(tail), vec!["hello"]);
    }

    #[test]
    fn skips_done_markers_and_malformed_payloads() {
        let mut buffer = SseBuffer::default();
        let deltas = buffer.push("data: [DONE]\ndata: {not json}\n\n: keep-alive\n");
        assert!(deltas.is_empty());
    }

    #[test]
    fn events_without_content_are_dropped() {
        let mut buffer = SseBuffer::default();
        let deltas = buffer.push("data: {\"choices\":[{\"delta\":{}}]}\n");
        assert!(deltas.is_empty());
    }
}
