use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref PUNCT: Regex = Regex::new(r"[\p{P}\p{S}]").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

const DEFAULT_STOPWORDS: &[&str] = &[
    "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
    "be","because","been","before","being","below","between","both","but","by",
    "can","can't","cannot","could","couldn't",
    "did","didn't","do","does","doesn't","doing","don't","down","during",
    "each","few","for","from","further",
    "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
    "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
    "let's","me","more","most","mustn't","my","myself",
    "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
    "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
    "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
    "under","until","up","very",
    "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
    "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves",
];

/// NFKC-normalize, lowercase and strip punctuation and symbols.
pub fn normalize(text: &str) -> String {
    let lowered = text.nfkc().collect::<String>().to_lowercase();
    PUNCT.replace_all(&lowered, "").into_owned()
}

/// Turns raw text into index tokens: normalize, whitespace split, drop
/// stopwords, stem. The same input always yields the same sequence.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_STOPWORDS.iter().copied())
    }
}

impl Tokenizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // stopwords go through the same normalization as text so "don't" matches "dont"
        let stopwords = stopwords
            .into_iter()
            .map(|w| normalize(w.as_ref()).trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        Self { stopwords }
    }

    /// Load a newline-delimited stopword list.
    pub fn from_stopwords_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::new(text.lines()))
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn process(&self, text: &str) -> Vec<String> {
        normalize(text)
            .split_whitespace()
            .filter(|w| !self.is_stopword(w))
            .map(|w| STEMMER.stem(w).into_owned())
            .collect()
    }

    /// Tokenize `text` and require exactly one token.
    pub fn single_token(&self, text: &str) -> Result<String> {
        let mut tokens = self.process(text);
        if tokens.len() != 1 {
            return Err(Error::invalid(format!(
                "expected '{text}' to produce exactly one token, got {}",
                tokens.len()
            )));
        }
        Ok(tokens.remove(0))
    }
}
