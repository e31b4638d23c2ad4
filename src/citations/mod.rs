// Matching model citations against the chunks of the upload


use tracing::debug;

use crate::ingest::DocumentChunk;

/// Excerpt shown next to an answer for one cited chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceElement {
    pub name: String,
    pub content: String,
}

/// Citations that matched a known chunk, in citation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub found_sources: Vec<String>,
    pub elements: Vec<SourceElement>,
}

/// Strip whitespace and wrapping punctuation from one citation token
///
/// Underscores are kept since they are part of `source_<n>`.
#[inline]
pub fn normalize_citation(token: &str) -> &str {
    token
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() && c != '_')
        .trim()
}

/// Check every comma-separated citation against the known chunk sources
///
/// Each matching token contributes one entry, so a source cited twice is
/// listed twice.
#[inline]
pub fn reconcile_sources(sources: &str, chunks: &[DocumentChunk]) -> Reconciled {
    let mut reconciled = Reconciled::default();

    for token in sources.split(',') {
        let name = normalize_citation(token);
        if name.is_empty() {
            continue;
        }

        let Some(chunk) = chunks.iter().find(|c| c.metadata.source == name) else {
            debug!("Citation {:?} matches no chunk", name);
            continue;
        };

        reconciled.found_sources.push(name.to_string());
        reconciled.elements.push(SourceElement {
            name: name.to_string(),
            content: chunk.content.clone(),
        });
    }

    reconciled
}

/// Append the citation notice to an answer
///
/// An empty citation string adds nothing. Otherwise the matched sources are
/// listed, or an explicit notice says none matched.
#[inline]
pub fn annotate_answer(answer: &str, sources: &str, reconciled: &Reconciled) -> String {
    if sources.is_empty() {
        return answer.to_string();
    }

    if reconciled.found_sources.is_empty() {
        format!("{}\nNo sources found", answer)
    } else {
        format!("{}\nSources: {}", answer, reconciled.found_sources.join(", "))
    }
}
