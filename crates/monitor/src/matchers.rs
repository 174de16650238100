//! Exact matchers
//!
//! This module provides:
//! - [`evaluate`]: the exact evaluator over a [`QueryNode`]
//! - [`SimpleMatcher`]: reports which queries matched
//! - [`HighlightingMatcher`]: reports the token spans that matched, per field
//!
//! Boolean semantics follow classic Lucene: a clause list matches when every
//! required clause matches, no prohibited clause matches, and (if there are
//! no required clauses) at least one optional clause matches. A boolean made
//! only of prohibited clauses therefore matches nothing; `*:* -term` is the
//! way to say "everything without term".

use percolate_core::{
    CandidateMatcher, Hit, InputDocument, MatcherFactory, Occur, QueryMatch, QueryNode, StoredQuery,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Largest edit distance a fuzzy clause may ask for
pub const MAX_FUZZY_EDITS: u32 = 2;

// ============================================================================
// Evaluator
// ============================================================================

/// Exact evaluation of a query tree against a document
///
/// Returns `Ok(None)` when the document does not match, otherwise the hits
/// that satisfied the query. `Err` describes a query the evaluator cannot
/// run.
pub fn evaluate(node: &QueryNode, doc: &InputDocument) -> Result<Option<Vec<Hit>>, String> {
    match node {
        QueryNode::Term { field, text } => Ok(non_empty(
            doc.tokens(field)
                .filter(|t| t.text == *text)
                .map(|t| Hit::new(field.as_str(), t.position, t.position))
                .collect(),
        )),
        QueryNode::Phrase { field, terms, offsets } => Ok(phrase_hits(doc, field, terms, offsets)),
        QueryNode::Boolean { clauses } => {
            let mut hits = Vec::new();
            let mut required = 0usize;
            let mut optional_matched = false;
            for clause in clauses {
                let result = evaluate(&clause.node, doc)?;
                match clause.occur {
                    Occur::MustNot if result.is_some() => return Ok(None),
                    Occur::MustNot => {}
                    Occur::Must | Occur::Filter => {
                        required += 1;
                        match result {
                            Some(h) => hits.extend(h),
                            None => return Ok(None),
                        }
                    }
                    Occur::Should => {
                        if let Some(h) = result {
                            optional_matched = true;
                            hits.extend(h);
                        }
                    }
                }
            }
            if required == 0 && !optional_matched {
                return Ok(None);
            }
            Ok(Some(hits))
        }
        QueryNode::Wildcard { field, pattern } => {
            let pattern: Vec<char> = pattern.chars().collect();
            Ok(non_empty(
                doc.tokens(field)
                    .filter(|t| glob_match(&pattern, &t.text))
                    .map(|t| Hit::new(field.as_str(), t.position, t.position))
                    .collect(),
            ))
        }
        QueryNode::Range {
            field,
            lower,
            upper,
            include_lower,
            include_upper,
        } => Ok(non_empty(
            doc.tokens(field)
                .filter(|t| {
                    let above = match lower {
                        None => true,
                        Some(l) => match t.text.as_str().cmp(l.as_str()) {
                            Ordering::Greater => true,
                            Ordering::Equal => *include_lower,
                            Ordering::Less => false,
                        },
                    };
                    let below = match upper {
                        None => true,
                        Some(u) => match t.text.as_str().cmp(u.as_str()) {
                            Ordering::Less => true,
                            Ordering::Equal => *include_upper,
                            Ordering::Greater => false,
                        },
                    };
                    above && below
                })
                .map(|t| Hit::new(field.as_str(), t.position, t.position))
                .collect(),
        )),
        QueryNode::Fuzzy { field, text, max_edits } => {
            if *max_edits > MAX_FUZZY_EDITS {
                return Err(format!(
                    "fuzzy clause {}:{}~{} exceeds the maximum of {} edits",
                    field, text, max_edits, MAX_FUZZY_EDITS
                ));
            }
            let target: Vec<char> = text.chars().collect();
            Ok(non_empty(
                doc.tokens(field)
                    .filter(|t| within_edits(&target, &t.text, *max_edits as usize))
                    .map(|t| Hit::new(field.as_str(), t.position, t.position))
                    .collect(),
            ))
        }
        QueryNode::MatchAll => Ok(Some(Vec::new())),
        QueryNode::Custom(clause) => Ok(clause.evaluate(doc)),
    }
}

fn non_empty(hits: Vec<Hit>) -> Option<Vec<Hit>> {
    if hits.is_empty() {
        None
    } else {
        Some(hits)
    }
}

/// Spans where `terms` occur at their relative `offsets`
///
/// Missing offsets default to consecutive positions.
fn phrase_hits(doc: &InputDocument, field: &str, terms: &[String], offsets: &[u32]) -> Option<Vec<Hit>> {
    let (first, rest) = terms.split_first()?;
    let offset = |i: usize| offsets.get(i).copied().unwrap_or(i as u32);
    let base = offset(0);
    let span = offset(terms.len() - 1).saturating_sub(base);
    let mut by_position: HashMap<u32, Vec<&str>> = HashMap::new();
    for token in doc.tokens(field) {
        by_position.entry(token.position).or_default().push(&token.text);
    }
    let at = |position: u32, term: &str| by_position.get(&position).is_some_and(|ts| ts.contains(&term));

    let hits = doc
        .tokens(field)
        .filter(|t| t.text == *first)
        .filter(|t| {
            rest.iter()
                .enumerate()
                .all(|(i, term)| at(t.position + offset(i + 1).saturating_sub(base), term))
        })
        .map(|t| Hit::new(field, t.position, t.position + span))
        .collect();
    non_empty(hits)
}

/// `*` matches any run of characters, `?` exactly one
fn glob_match(pattern: &[char], text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Levenshtein distance between `target` and `text` is at most `max`
fn within_edits(target: &[char], text: &str, max: usize) -> bool {
    let text: Vec<char> = text.chars().collect();
    if target.len().abs_diff(text.len()) > max {
        return false;
    }
    let mut prev: Vec<usize> = (0..=text.len()).collect();
    let mut curr = vec![0usize; text.len() + 1];
    for (i, a) in target.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, b) in text.iter().enumerate() {
            let cost = usize::from(a != b);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
            row_min = row_min.min(curr[j + 1]);
        }
        if row_min > max {
            return false;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[text.len()] <= max
}

// ============================================================================
// SimpleMatcher
// ============================================================================

/// A query matched; nothing else is reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleMatch {
    /// Id of the matching query
    pub query_id: String,
}

impl QueryMatch for SimpleMatch {
    fn query_id(&self) -> &str {
        &self.query_id
    }
}

/// Reports which candidate queries match
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleMatcher;

impl CandidateMatcher<SimpleMatch> for SimpleMatcher {
    fn match_query(&self, query: &StoredQuery, doc: &InputDocument) -> Result<Option<SimpleMatch>, String> {
        Ok(evaluate(query.node(), doc)?.map(|_| SimpleMatch {
            query_id: query.id().to_string(),
        }))
    }
}

impl MatcherFactory<SimpleMatch> for SimpleMatcher {
    type Matcher = SimpleMatcher;

    fn create(&self) -> SimpleMatcher {
        SimpleMatcher
    }
}

// ============================================================================
// HighlightingMatcher
// ============================================================================

/// A query matched, with the spans that satisfied it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightsMatch {
    /// Id of the matching query
    pub query_id: String,
    /// Sorted, deduplicated hits per field
    pub hits: BTreeMap<String, Vec<Hit>>,
}

impl HighlightsMatch {
    /// Total hits across fields
    pub fn hit_count(&self) -> usize {
        self.hits.values().map(Vec::len).sum()
    }

    /// Hits in one field
    pub fn hits(&self, field: &str) -> &[Hit] {
        self.hits.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fields with at least one hit
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.hits.keys().map(String::as_str)
    }
}

impl QueryMatch for HighlightsMatch {
    fn query_id(&self) -> &str {
        &self.query_id
    }
}

/// Reports matching queries together with their hit spans
#[derive(Debug, Clone, Copy, Default)]
pub struct HighlightingMatcher;

impl CandidateMatcher<HighlightsMatch> for HighlightingMatcher {
    fn match_query(&self, query: &StoredQuery, doc: &InputDocument) -> Result<Option<HighlightsMatch>, String> {
        let Some(hits) = evaluate(query.node(), doc)? else {
            return Ok(None);
        };
        let mut by_field: BTreeMap<String, Vec<Hit>> = BTreeMap::new();
        for hit in hits {
            by_field.entry(hit.field.clone()).or_default().push(hit);
        }
        for hits in by_field.values_mut() {
            hits.sort();
            hits.dedup();
        }
        Ok(Some(HighlightsMatch {
            query_id: query.id().to_string(),
            hits: by_field,
        }))
    }
}

impl MatcherFactory<HighlightsMatch> for HighlightingMatcher {
    type Matcher = HighlightingMatcher;

    fn create(&self) -> HighlightingMatcher {
        HighlightingMatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percolate_core::{MonitorQuery, QueryParser, StandardAnalyzer, StandardQueryParser};
    use std::sync::Arc;

    fn doc(text: &str) -> InputDocument {
        InputDocument::builder("d1")
            .add_field("text", text, &StandardAnalyzer::new())
            .build()
    }

    fn query(text: &str) -> StoredQuery {
        let parser = StandardQueryParser::new("text", Arc::new(StandardAnalyzer::new()));
        let node = parser.parse(text, &BTreeMap::new()).unwrap();
        StoredQuery::new(MonitorQuery::new("q", text), node)
    }

    fn matches(q: &str, d: &str) -> bool {
        evaluate(query(q).node(), &doc(d)).unwrap().is_some()
    }

    #[test]
    fn test_boolean_semantics() {
        let d = "the quick brown fox";
        assert!(matches("fox AND quick", d));
        assert!(!matches("fox AND NOT quick", d));
        assert!(matches("fox OR hound", d));
        assert!(!matches("cat OR hound", d));
        assert!(!matches("fox OR -quick", d));
        assert!(matches("fox OR -cat", d));
        assert!(!matches("NOT cat", d));
        assert!(matches("*:* AND NOT cat", d));
    }

    #[test]
    fn test_phrase_positions() {
        assert!(matches("\"brown fox\"", "the quick brown fox"));
        assert!(!matches("\"fox brown\"", "the quick brown fox"));
        assert!(!matches("\"quick fox\"", "the quick brown fox"));
    }

    #[test]
    fn test_phrase_respects_stopword_gaps() {
        let analyzer = Arc::new(StandardAnalyzer::english());
        let parser = StandardQueryParser::new("text", analyzer.clone());
        let node = parser.parse("\"jack of spades\"", &BTreeMap::new()).unwrap();
        let query = StoredQuery::new(MonitorQuery::new("q", "\"jack of spades\""), node);

        let doc = |text: &str| InputDocument::builder("d").add_field("text", text, analyzer.as_ref()).build();
        let hits = HighlightingMatcher
            .match_query(&query, &doc("the jack of spades"))
            .unwrap()
            .unwrap();
        assert_eq!(hits.hits["text"], vec![Hit::new("text", 1, 3)]);

        // the gap must be exactly one removed token
        assert!(evaluate(query.node(), &doc("jack spades")).unwrap().is_none());
        assert!(evaluate(query.node(), &doc("jack of the spades")).unwrap().is_none());
        assert!(evaluate(query.node(), &doc("jack and spades")).unwrap().is_some());
    }

    #[test]
    fn test_wildcard_range_fuzzy() {
        assert!(matches("qu*k", "quick"));
        assert!(matches("q?ick", "quick"));
        assert!(!matches("qu?k", "quick"));
        assert!(matches("[a TO c]", "banana"));
        assert!(!matches("{a TO banana}", "banana"));
        assert!(matches("quack~1", "quick"));
        assert!(!matches("quack~1", "quirk"));
        assert!(matches("quack~2", "quirk"));
    }

    #[test]
    fn test_glob_edge_cases() {
        let g = |p: &str, t: &str| glob_match(&p.chars().collect::<Vec<_>>(), t);
        assert!(g("*", ""));
        assert!(g("a*b*c", "aXXbYYc"));
        assert!(!g("a*b", "aXXc"));
        assert!(g("**a", "a"));
    }

    #[test]
    fn test_fuzzy_edit_limit_is_an_error() {
        let node = QueryNode::Fuzzy {
            field: "text".into(),
            text: "fox".into(),
            max_edits: 5,
        };
        assert!(evaluate(&node, &doc("fox")).is_err());
    }

    #[test]
    fn test_simple_matcher() {
        let m = SimpleMatcher.create();
        let got = m.match_query(&query("fox"), &doc("a fox")).unwrap();
        assert_eq!(got, Some(SimpleMatch { query_id: "q".into() }));
        assert_eq!(m.match_query(&query("cat"), &doc("a fox")).unwrap(), None);
    }

    #[test]
    fn test_highlighting_matcher() {
        let m = HighlightingMatcher.create();
        let got = m
            .match_query(&query("fox OR \"quick brown\""), &doc("the quick brown fox"))
            .unwrap()
            .unwrap();
        assert_eq!(got.hit_count(), 2);
        assert_eq!(got.hits("text"), &[Hit::new("text", 1, 2), Hit::new("text", 3, 3)]);
        assert_eq!(got.fields().collect::<Vec<_>>(), vec!["text"]);
    }
}
