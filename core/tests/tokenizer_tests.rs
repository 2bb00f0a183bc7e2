use search_core::Tokenizer;

#[test]
fn it_normalizes_and_stems() {
    let words = Tokenizer::default().process("Running Runners ＲＵＮ! The café's menu.");
    // stemming and NFKC folding of full-width letters both land on "run"
    assert_eq!(words.iter().filter(|w| *w == "run").count(), 2);
    assert!(words.contains(&"runner".to_string()));
    assert!(words.iter().all(|w| w.chars().all(char::is_alphanumeric)));
}

#[test]
fn it_filters_stopwords() {
    let words = Tokenizer::default().process("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words.len(), 5);
}

#[test]
fn it_is_deterministic() {
    let tok = Tokenizer::default();
    let text = "Heroes rise; villains fall -- again, and again!";
    assert_eq!(tok.process(text), tok.process(text));
}

#[test]
fn it_reads_stopword_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stopwords.txt");
    std::fs::write(&path, "robot\n\nlaser\n").unwrap();
    let tok = Tokenizer::from_stopwords_file(&path).unwrap();
    assert_eq!(tok.process("Robot with a laser"), vec!["with".to_string(), "a".to_string()]);
}
