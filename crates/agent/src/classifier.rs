//! Stateful chunk classifier — splits a streamed response into visible and
//! hidden text.
//!
//! The model is instructed to wrap its reasoning in `<thinking>` /
//! `</thinking>` markers. Deltas arrive at arbitrary byte boundaries, so a
//! marker can be split across any number of chunks. The classifier keeps
//! just enough tail in its buffer to recognize a marker that has started but
//! not finished, and emits everything else immediately.

/// Marker opening a hidden reasoning span.
pub const THINKING_OPEN: &str = "<thinking>";

/// Marker closing a hidden reasoning span.
pub const THINKING_CLOSE: &str = "</thinking>";

/// Whether a span of classified text is shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Visible,
    Hidden,
}

/// A contiguous run of text with a single classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSegment {
    pub kind: SegmentKind,
    pub text: String,
}

/// Streaming classifier over visible/hidden markers.
///
/// One instance per model response: the classifier starts in visible mode
/// and must not be reused across responses, since a dangling marker would
/// leak state into the next stream.
#[derive(Debug)]
pub struct ChunkClassifier {
    mode: SegmentKind,
    buffer: String,
}

impl ChunkClassifier {
    pub fn new() -> Self {
        Self {
            mode: SegmentKind::Visible,
            buffer: String::new(),
        }
    }

    /// The marker that would flip the current mode.
    fn sought_marker(&self) -> &'static str {
        match self.mode {
            SegmentKind::Visible => THINKING_OPEN,
            SegmentKind::Hidden => THINKING_CLOSE,
        }
    }

    fn flip(&mut self) {
        self.mode = match self.mode {
            SegmentKind::Visible => SegmentKind::Hidden,
            SegmentKind::Hidden => SegmentKind::Visible,
        };
    }

    /// Feed one delta and get back every segment that can be classified with
    /// certainty. Text that might be the start of a split marker stays
    /// buffered until the next delta (or `flush`) decides.
    pub fn feed(&mut self, delta: &str) -> Vec<ClassifiedSegment> {
        self.buffer.push_str(delta);
        let mut segments = Vec::new();

        loop {
            let marker = self.sought_marker();
            match self.buffer.find(marker) {
                Some(pos) => {
                    if pos > 0 {
                        push_segment(&mut segments, self.mode, &self.buffer[..pos]);
                    }
                    self.buffer.drain(..pos + marker.len());
                    self.flip();
                }
                None => {
                    // Keep the longest tail that could still grow into the
                    // sought marker; everything before it is decided.
                    let keep = partial_marker_len(&self.buffer, marker);
                    let decided = self.buffer.len() - keep;
                    if decided > 0 {
                        push_segment(&mut segments, self.mode, &self.buffer[..decided]);
                        self.buffer.drain(..decided);
                    }
                    return segments;
                }
            }
        }
    }

    /// End of stream: release whatever is still buffered as text in the
    /// current mode. A partial marker that never completed is ordinary text.
    pub fn flush(&mut self) -> Option<ClassifiedSegment> {
        if self.buffer.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.buffer);
        Some(ClassifiedSegment {
            kind: self.mode,
            text,
        })
    }
}

impl Default for ChunkClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn push_segment(segments: &mut Vec<ClassifiedSegment>, kind: SegmentKind, text: &str) {
    // Coalesce with the previous segment when the kind matches, so callers
    // see one segment per contiguous run regardless of internal scanning.
    if let Some(last) = segments.last_mut() {
        if last.kind == kind {
            last.text.push_str(text);
            return;
        }
    }
    segments.push(ClassifiedSegment {
        kind,
        text: text.to_string(),
    });
}

/// Length in bytes of the longest suffix of `buffer` that is a proper prefix
/// of `marker`. Markers are ASCII, so the returned cut is always a char
/// boundary.
fn partial_marker_len(buffer: &str, marker: &str) -> usize {
    let max = buffer.len().min(marker.len() - 1);
    for k in (1..=max).rev() {
        if buffer.ends_with(&marker[..k]) {
            return k;
        }
    }
    0
}
