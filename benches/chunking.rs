use criterion::{Criterion, criterion_group, criterion_main};
use doc_qa::embeddings::chunking::{ChunkingConfig, TextSplitter};
use std::hint::black_box;

const PARAGRAPH: &str = "Retrieval augmented generation answers a question by first \
    fetching the passages of a document that look most relevant, then asking a \
    language model to answer using only those passages. Each passage is tagged \
    with an identifier so the model can cite it.\n";

pub fn criterion_benchmark(c: &mut Criterion) {
    let content = PARAGRAPH.repeat(500).replace(".\n", ".\n\n");
    let splitter = TextSplitter::new(&ChunkingConfig::default());
    c.bench_function("chunking", |b| {
        b.iter(|| splitter.split_text(black_box(&content)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
