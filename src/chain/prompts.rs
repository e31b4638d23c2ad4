use itertools::Itertools;

use crate::ingest::DocumentChunk;

/// Instructions and worked example placed ahead of the retrieved chunks
const QA_WITH_SOURCES_PREAMBLE: &str = r#"Given the following extracted parts of a long document and a question, create a final answer with references ("SOURCES").
If you don't know the answer, just say that you don't know. Don't try to make up an answer.
ALWAYS return a "SOURCES" part in your answer, listing the sources you used separated by commas.

QUESTION: What is the notice period for ending the lease?
=========
Content: Either party may end this lease by giving the other party sixty days written notice.
Source: source_3
Content: Rent is due on the first day of each month.
Source: source_7
=========
FINAL ANSWER: Either party must give sixty days written notice.
SOURCES: source_3

"#;

/// Render one chunk the way the template's example does
#[inline]
pub fn format_document(chunk: &DocumentChunk) -> String {
    format!(
        "Content: {}\nSource: {}",
        chunk.content, chunk.metadata.source
    )
}

/// Stuff every chunk into a single prompt
#[inline]
pub fn stuff_prompt(question: &str, chunks: &[DocumentChunk]) -> String {
    let summaries = chunks.iter().map(format_document).join("\n\n");

    format!(
        "{}QUESTION: {}\n=========\n{}\n=========\nFINAL ANSWER:",
        QA_WITH_SOURCES_PREAMBLE,
        question.trim(),
        summaries
    )
}
