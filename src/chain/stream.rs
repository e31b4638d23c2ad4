// Holds back the citation tail of a streamed completion

const SOURCES_MARKER: &str = "sources:";
const QUESTION_MARKER: &str = "question:";

/// Filter over streamed completion tokens
///
/// Text is released as soon as it cannot be the start of a `SOURCES:` or
/// `SOURCE:` line (any case). Once the marker arrives everything after it is
/// swallowed; the citation string is recovered from the full completion.
///
/// A `QUESTION:` line only ends the answer when a citation line follows it, so
/// text from there on is held until either the marker arrives (and the held
/// text is dropped) or the stream ends (and it is released).
#[derive(Debug, Default)]
pub struct AnswerStream {
    pending: String,
    deferred: bool,
    done: bool,
}

impl AnswerStream {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token, returning the text that is safe to show
    #[inline]
    pub fn push(&mut self, token: &str) -> Option<String> {
        if self.done {
            return None;
        }

        self.pending.push_str(token);
        let lower = self.pending.to_ascii_lowercase();

        if let Some(position) = find_marker(&lower) {
            self.done = true;
            let end = find_question(&lower).map_or(position, |q| q.min(position));
            let released = self.pending.get(..end).unwrap_or_default().to_string();
            self.pending.clear();
            return non_empty(released);
        }

        if self.deferred {
            return None;
        }

        let split = match find_question(&lower) {
            Some(position) => {
                self.deferred = true;
                position
            }
            None => self.pending.len() - held_suffix_len(&lower),
        };

        let released = self.pending.get(..split).unwrap_or_default().to_string();
        self.pending = self.pending.get(split..).unwrap_or_default().to_string();
        non_empty(released)
    }

    /// Flush whatever is still held once the stream has ended
    #[inline]
    pub fn finish(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        self.done = true;
        non_empty(std::mem::take(&mut self.pending))
    }
}

/// Byte offset of the first `source:` or `sources:` in already lowercased text
fn find_marker(lower: &str) -> Option<usize> {
    lower.match_indices("source").find_map(|(i, _)| {
        let rest = lower.get(i + "source".len()..).unwrap_or_default();
        (rest.starts_with(':') || rest.starts_with("s:")).then_some(i)
    })
}

/// Byte offset of the first `question:` followed by whitespace
fn find_question(lower: &str) -> Option<usize> {
    lower.match_indices(QUESTION_MARKER).find_map(|(i, _)| {
        let rest = lower.get(i + QUESTION_MARKER.len()..).unwrap_or_default();
        rest.chars()
            .next()
            .is_some_and(char::is_whitespace)
            .then_some(i)
    })
}

/// Length of the longest suffix that could still grow into a marker
///
/// Every prefix of `source:` short of the full marker is also a prefix of
/// `sources:`. A complete `question:` is held until the next character shows
/// whether it starts a question line.
fn held_suffix_len(lower: &str) -> usize {
    [SOURCES_MARKER, QUESTION_MARKER]
        .iter()
        .map(|marker| {
            (1..=marker.len().min(lower.len()))
                .rev()
                .find(|&k| marker.get(..k).is_some_and(|prefix| lower.ends_with(prefix)))
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0)
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
