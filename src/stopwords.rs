use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Tokens shorter than this many characters are dropped.
const MIN_TOKEN_LENGTH: usize = 3;
/// Tokens longer than this are rendering artifacts, not words.
const MAX_TOKEN_LENGTH: usize = 50;

/// Default English stopword list, one word per line.
const DEFAULT_STOPWORDS: &str = include_str!("stopwords.txt");

/// Load the stopword set from the given file, or the embedded default
/// when no path is configured.
pub fn load(path: Option<&Path>) -> io::Result<HashSet<String>> {
    match path {
        Some(p) => Ok(parse(&fs::read_to_string(p)?)),
        None => Ok(parse(DEFAULT_STOPWORDS)),
    }
}

fn parse(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Extract tokens from visible page text: maximal ASCII-letter runs,
/// lowercased, with very short and very long runs and stopwords dropped.
pub fn tokenize(text: &str, stopwords: &HashSet<String>) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphabetic() {
            current.push(ch.to_ascii_lowercase());
        } else if !current.is_empty() {
            flush_token(&mut current, stopwords, &mut tokens);
        }
    }
    if !current.is_empty() {
        flush_token(&mut current, stopwords, &mut tokens);
    }

    tokens
}

fn flush_token(current: &mut String, stopwords: &HashSet<String>, tokens: &mut Vec<String>) {
    let token = std::mem::take(current);
    if (MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&token.len()) && !stopwords.contains(&token) {
        tokens.push(token);
    }
}
