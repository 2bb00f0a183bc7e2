use criterion::{criterion_group, criterion_main, Criterion};
use search_core::Tokenizer;

const TEXT: &str = "When a young princess defies an age-old custom, she sets loose chaos in her kingdom. \
Armed with her bow and arrow, she must discover the meaning of true bravery before a beastly curse becomes permanent.";

fn bench_tokenize(c: &mut Criterion) {
    let tok = Tokenizer::default();
    c.bench_function("tokenize_description", |b| b.iter(|| tok.process(TEXT)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
