use std::collections::HashMap;

use crate::formats::{Keyword, KeywordKind, Page};

/// Terms must appear strictly more often than this to be reported.
pub const KEYWORD_THRESHOLD: usize = 4;

const MIN_WORD_CHARS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by",
    "can", "do", "for", "from", "has", "have", "how", "if", "in", "into", "is", "it", "its",
    "more", "no", "not", "of", "on", "or", "our", "out", "so", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "to", "up", "was", "we", "were", "what",
    "when", "which", "who", "will", "with", "you", "your",
];

#[derive(Debug, Default)]
pub struct KeywordCounter {
    entries: HashMap<String, Entry>,
    next_seq: usize,
}

#[derive(Debug)]
struct Entry {
    kind: KeywordKind,
    count: usize,
    first_seen: usize,
}

impl KeywordCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts words, bigrams and trigrams of one text. N-grams never span
    /// two calls.
    pub fn add_text(&mut self, text: &str) {
        let tokens = tokenize(text);

        for token in &tokens {
            if token.chars().count() >= MIN_WORD_CHARS && !is_stop_word(token) {
                self.bump(token.clone(), KeywordKind::Word);
            }
        }
        for window in tokens.windows(2) {
            if window.iter().all(|t| !is_stop_word(t)) {
                self.bump(window.join(" "), KeywordKind::Bigram);
            }
        }
        for window in tokens.windows(3) {
            if window.iter().all(|t| !is_stop_word(t)) {
                self.bump(window.join(" "), KeywordKind::Trigram);
            }
        }
    }

    fn bump(&mut self, term: String, kind: KeywordKind) {
        let next_seq = &mut self.next_seq;
        self.entries
            .entry(term)
            .and_modify(|e| e.count += 1)
            .or_insert_with(|| {
                let first_seen = *next_seq;
                *next_seq += 1;
                Entry {
                    kind,
                    count: 1,
                    first_seen,
                }
            });
    }

    /// Terms above `threshold`, most frequent first; equal counts keep
    /// first-seen order.
    pub fn ranked(self, threshold: usize) -> Vec<Keyword> {
        let mut kept = self
            .entries
            .into_iter()
            .filter(|(_, e)| e.count > threshold)
            .collect::<Vec<_>>();
        kept.sort_by(|(_, a), (_, b)| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });
        kept.into_iter()
            .map(|(term, e)| Keyword {
                term,
                kind: e.kind,
                count: e.count,
            })
            .collect()
    }
}

pub fn aggregate(pages: &[Page], include_body: bool) -> Vec<Keyword> {
    let mut counter = KeywordCounter::new();
    for page in pages {
        counter.add_text(&page.title);
        if include_body {
            counter.add_text(&page.body_text);
        }
    }
    counter.ranked(KEYWORD_THRESHOLD)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str) -> Page {
        Page {
            title: title.to_string(),
            ..Page::default()
        }
    }

    #[test]
    fn stop_words_are_sorted_for_binary_search() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn threshold_excludes_four_and_keeps_five() {
        let pages = [
            page("seo tips seo guide"),
            page("seo tips guide"),
            page("seo tips guide"),
            page("seo tips guide"),
            page("seo guide"),
        ];
        let keywords = aggregate(&pages, false);

        let terms = keywords
            .iter()
            .map(|k| (k.term.as_str(), k.count))
            .collect::<Vec<_>>();
        assert_eq!(terms, vec![("seo", 6), ("guide", 5)]);
        assert!(keywords.iter().all(|k| k.kind == KeywordKind::Word));
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let pages = (0..5)
            .map(|_| page("Zebra apple"))
            .collect::<Vec<_>>();
        let keywords = aggregate(&pages, false);

        let terms = keywords.iter().map(|k| k.term.as_str()).collect::<Vec<_>>();
        assert_eq!(terms, vec!["zebra", "apple", "zebra apple"]);
        assert_eq!(keywords[2].kind, KeywordKind::Bigram);
    }

    #[test]
    fn ngrams_do_not_span_pages_and_skip_stop_words() {
        let mut counter = KeywordCounter::new();
        for _ in 0..5 {
            counter.add_text("rust crawler");
            counter.add_text("async runtime for the web");
        }
        let terms = counter
            .ranked(KEYWORD_THRESHOLD)
            .into_iter()
            .map(|k| k.term)
            .collect::<Vec<_>>();

        assert!(terms.contains(&"rust crawler".to_string()));
        assert!(terms.contains(&"async runtime".to_string()));
        assert!(!terms.contains(&"crawler async".to_string()));
        assert!(!terms.contains(&"runtime for".to_string()));
        assert!(!terms.contains(&"for".to_string()));
    }

    #[test]
    fn body_text_counts_only_when_requested() {
        let pages = (0..5)
            .map(|_| Page {
                title: "Home".to_string(),
                body_text: "widgets".to_string(),
                ..Page::default()
            })
            .collect::<Vec<_>>();

        assert!(
            !aggregate(&pages, false)
                .iter()
                .any(|k| k.term == "widgets")
        );
        assert!(aggregate(&pages, true).iter().any(|k| k.term == "widgets"));
    }

    #[test]
    fn punctuation_is_trimmed() {
        assert_eq!(tokenize("SEO: Tips, (guide)!"), vec!["seo", "tips", "guide"]);
    }
}
