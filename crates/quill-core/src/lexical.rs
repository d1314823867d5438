//! Web-search-style lexical query evaluation.
//!
//! Mirrors the semantics of Postgres `websearch_to_tsquery` closely enough
//! that the in-memory candidate source ranks the way the SQL path does:
//! unquoted words are ANDed, `"quoted phrases"` must appear contiguously,
//! `or` separates alternatives, and a leading `-` negates a term.
//!
//! Relevance weights title over content over tags, then normalizes into
//! `[0, 1)` with `rank / (rank + 1)`, matching `ts_rank`'s normalization
//! flag 32.

/// Per-occurrence weight of a title match.
const TITLE_WEIGHT: f32 = 1.0;
/// Per-occurrence weight of a content match.
const CONTENT_WEIGHT: f32 = 0.4;
/// Per-occurrence weight of a tag match.
const TAG_WEIGHT: f32 = 0.2;

/// One term of a parsed query: a word or phrase, possibly negated.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    /// Tokens of the term; more than one means a contiguous phrase.
    pub tokens: Vec<String>,
    pub negated: bool,
}

/// A parsed web-style query: OR-separated groups of ANDed terms.
#[derive(Debug, Clone, PartialEq)]
pub struct WebQuery {
    groups: Vec<Vec<Term>>,
}

/// Lowercase and split on non-alphanumeric boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

impl WebQuery {
    /// Parse free text into a query.
    ///
    /// Returns None when nothing remains after parsing (empty input, bare
    /// operators, or only punctuation).
    pub fn parse(input: &str) -> Option<Self> {
        let mut groups: Vec<Vec<Term>> = Vec::new();
        let mut current: Vec<Term> = Vec::new();

        for raw in split_query(input) {
            match raw {
                RawToken::Or => {
                    if !current.is_empty() {
                        groups.push(std::mem::take(&mut current));
                    }
                }
                RawToken::Word { text, negated } => {
                    let tokens = tokenize(&text);
                    if !tokens.is_empty() {
                        current.push(Term { tokens, negated });
                    }
                }
                RawToken::Phrase { text, negated } => {
                    let tokens = tokenize(&text);
                    if !tokens.is_empty() {
                        current.push(Term { tokens, negated });
                    }
                }
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }

        // A query of only negated terms matches nothing, like tsquery.
        groups.retain(|g| g.iter().any(|t| !t.negated));
        if groups.is_empty() {
            None
        } else {
            Some(Self { groups })
        }
    }

    /// Score a document's fields, None when the query does not match.
    pub fn score(&self, title: Option<&str>, content: Option<&str>, tags: &[String]) -> Option<f32> {
        let title_tokens = title.map(tokenize).unwrap_or_default();
        let content_tokens = content.map(tokenize).unwrap_or_default();
        let tag_tokens: Vec<Vec<String>> = tags.iter().map(|t| tokenize(t)).collect();

        let mut best: Option<f32> = None;
        for group in &self.groups {
            if let Some(rank) = score_group(group, &title_tokens, &content_tokens, &tag_tokens) {
                best = Some(best.map_or(rank, |b: f32| b.max(rank)));
            }
        }
        // ts_rank normalization 32: rank / (rank + 1), keeps scores in [0, 1).
        best.map(|r| r / (r + 1.0))
    }
}

fn score_group(
    group: &[Term],
    title: &[String],
    content: &[String],
    tags: &[Vec<String>],
) -> Option<f32> {
    let mut rank = 0.0f32;
    for term in group {
        let title_hits = count_occurrences(title, &term.tokens);
        let content_hits = count_occurrences(content, &term.tokens);
        let tag_hits: usize = tags.iter().map(|t| count_occurrences(t, &term.tokens)).sum();
        let present = title_hits + content_hits + tag_hits > 0;

        if term.negated {
            if present {
                return None;
            }
        } else {
            if !present {
                return None;
            }
            rank += title_hits as f32 * TITLE_WEIGHT
                + content_hits as f32 * CONTENT_WEIGHT
                + tag_hits as f32 * TAG_WEIGHT;
        }
    }
    Some(rank)
}

/// Count contiguous occurrences of `needle` within `haystack`.
fn count_occurrences(haystack: &[String], needle: &[String]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    haystack
        .windows(needle.len())
        .filter(|w| *w == needle)
        .count()
}

enum RawToken {
    Word { text: String, negated: bool },
    Phrase { text: String, negated: bool },
    Or,
}

/// Split input into words, quoted phrases, and `or` operators.
fn split_query(input: &str) -> Vec<RawToken> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        let mut negated = false;
        if ch == '-' {
            negated = true;
            chars.next();
        }
        match chars.peek() {
            Some('"') => {
                chars.next();
                let mut text = String::new();
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    text.push(c);
                }
                out.push(RawToken::Phrase { text, negated });
            }
            Some(_) => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    text.push(c);
                    chars.next();
                }
                if !negated && text.eq_ignore_ascii_case("or") {
                    out.push(RawToken::Or);
                } else if !text.is_empty() {
                    out.push(RawToken::Word { text, negated });
                }
            }
            None => break,
        }
    }
    out
}
