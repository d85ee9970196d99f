//! Frame reassembly over a chunked text stream
//!
//! Serial reads return whatever bytes happen to be in the driver buffer, so a
//! single device frame may arrive split over several chunks, and one chunk may
//! carry several frames. [`LineBuffer`] hides that: feed it text as it
//! arrives and it hands back only complete frames.

fn is_boundary(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// Retains the partial frame between chunks
///
/// Invariant: the retained tail never contains `\r` or `\n`. Every
/// [`append`](LineBuffer::append) drains all complete frames immediately.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    tail: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return every frame it completes, in receipt order
    ///
    /// Any run of CR/LF characters counts as a single boundary. Empty frames
    /// (a boundary run split across two chunks) are not emitted.
    pub fn append(&mut self, text: &str) -> Vec<String> {
        self.tail.push_str(text);

        let mut frames = Vec::new();
        let mut rest = self.tail.as_str();
        while let Some(idx) = rest.find(is_boundary) {
            let frame = &rest[..idx];
            if !frame.is_empty() {
                frames.push(frame.to_string());
            }
            rest = rest[idx..].trim_start_matches(is_boundary);
        }

        let remaining = rest.to_string();
        self.tail = remaining;
        frames
    }

    /// The partial frame waiting for its boundary
    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.tail.is_empty()
    }

    pub fn clear(&mut self) {
        self.tail.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_complete_frames_leave_empty_tail() {
        let mut buffer = LineBuffer::new();
        let frames = buffer.append("A\r\nB\r\n");

        assert_eq!(frames, vec!["A", "B"]);
        assert_eq!(buffer.tail(), "");
    }

    #[test]
    fn test_partial_frame_is_completed_by_next_chunk() {
        let mut buffer = LineBuffer::new();

        assert_eq!(buffer.append("A\r\nB"), vec!["A"]);
        assert_eq!(buffer.tail(), "B");

        assert_eq!(buffer.append("C\r\n"), vec!["BC"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_boundary_runs_and_bare_separators() {
        let mut buffer = LineBuffer::new();
        let frames = buffer.append("1.0kg\n\n\r\n2.0kg\r3.0kg\n");

        assert_eq!(frames, vec!["1.0kg", "2.0kg", "3.0kg"]);
        assert_eq!(buffer.tail(), "");
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut buffer = LineBuffer::new();

        assert_eq!(buffer.append("12 kg\r"), vec!["12 kg"]);
        assert_eq!(buffer.append("\n13 kg\r\n"), vec!["13 kg"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_text_without_boundary_accumulates() {
        let mut buffer = LineBuffer::new();

        assert!(buffer.append("1,S").is_empty());
        assert!(buffer.append("T,10").is_empty());
        assert_eq!(buffer.tail(), "1,ST,10");

        assert_eq!(buffer.append("0,0,kg\r\n"), vec!["1,ST,100,0,kg"]);
    }

    #[test]
    fn test_clear_drops_tail() {
        let mut buffer = LineBuffer::new();
        buffer.append("partial");
        buffer.clear();

        assert_eq!(buffer.append("next\n"), vec!["next"]);
    }
}
