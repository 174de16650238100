//! The presearcher never drops a query that matches
//!
//! Random boolean trees over a small vocabulary are matched through the
//! monitor and compared with brute-force evaluation of every query against
//! every document. Candidate selection may over-approximate; the final
//! match set must equal the brute-force one exactly.

use percolate_core::{
    BooleanClause, DocumentBatch, InputDocument, MonitorQuery, Occur, ParseError, QueryNode, QueryParser,
    StandardAnalyzer,
};
use percolate_monitor::{evaluate, Monitor, SimpleMatcher};
use percolate_presearcher::{Presearcher, WildcardNgramComponent};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

const VOCAB: &[&str] = &["ant", "bee", "cat", "cow", "dog", "fox", "owl", "yak"];
const FIELDS: &[&str] = &["text", "title"];

/// Resolves query text to a pre-built tree
#[derive(Debug, Default)]
struct FixedParser {
    nodes: HashMap<String, QueryNode>,
}

impl QueryParser for FixedParser {
    fn parse(&self, query: &str, _metadata: &BTreeMap<String, String>) -> Result<QueryNode, ParseError> {
        self.nodes
            .get(query)
            .cloned()
            .ok_or_else(|| ParseError::new(format!("unknown query {}", query)))
    }
}

fn field() -> impl Strategy<Value = &'static str> {
    proptest::sample::select(FIELDS)
}

fn word() -> impl Strategy<Value = &'static str> {
    proptest::sample::select(VOCAB)
}

fn occur() -> impl Strategy<Value = Occur> {
    prop_oneof![
        3 => Just(Occur::Must),
        3 => Just(Occur::Should),
        2 => Just(Occur::MustNot),
        1 => Just(Occur::Filter),
    ]
}

fn leaf() -> impl Strategy<Value = QueryNode> {
    prop_oneof![
        6 => (field(), word()).prop_map(|(f, w)| QueryNode::term(f, w)),
        2 => (field(), word(), word()).prop_map(|(f, a, b)| QueryNode::phrase(f, vec![a.to_string(), b.to_string()])),
        2 => (field(), word(), 0usize..3, any::<bool>()).prop_map(|(f, w, n, single)| {
            let suffix = if single { "?*" } else { "*" };
            QueryNode::wildcard(f, format!("{}{}", &w[..n], suffix))
        }),
        1 => (field(), word(), word(), any::<bool>(), any::<bool>()).prop_map(|(f, a, b, il, iu)| {
            let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
            QueryNode::Range {
                field: f.to_string(),
                lower: Some(lower.to_string()),
                upper: Some(upper.to_string()),
                include_lower: il,
                include_upper: iu,
            }
        }),
        1 => Just(QueryNode::MatchAll),
    ]
}

fn node() -> impl Strategy<Value = QueryNode> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        proptest::collection::vec((occur(), inner), 1..4).prop_map(|clauses| {
            QueryNode::boolean(clauses.into_iter().map(|(o, n)| BooleanClause::new(o, n)).collect())
        })
    })
}

fn document() -> impl Strategy<Value = Vec<Vec<&'static str>>> {
    proptest::collection::vec(proptest::collection::vec(word(), 0..6), FIELDS.len())
}

fn build_doc(id: usize, fields: &[Vec<&str>], analyzer: &StandardAnalyzer) -> InputDocument {
    let mut builder = InputDocument::builder(format!("d{}", id));
    for (name, words) in FIELDS.iter().zip(fields) {
        if !words.is_empty() {
            builder = builder.add_field(*name, &words.join(" "), analyzer);
        }
    }
    builder.build()
}

fn check(
    queries: Vec<QueryNode>,
    docs: Vec<Vec<Vec<&'static str>>>,
    presearcher: Presearcher,
) -> Result<(), TestCaseError> {
    let analyzer = StandardAnalyzer::new();
    let mut parser = FixedParser::default();
    let mut monitor_queries = Vec::new();
    for (i, node) in queries.iter().enumerate() {
        let id = format!("q{}", i);
        parser.nodes.insert(id.clone(), node.clone());
        monitor_queries.push(MonitorQuery::new(id.clone(), id));
    }
    let monitor = Monitor::new(Arc::new(parser), presearcher);
    let report = monitor.update(monitor_queries).unwrap();
    prop_assert!(report.is_ok());

    let docs: Vec<InputDocument> = docs.iter().enumerate().map(|(i, d)| build_doc(i, d, &analyzer)).collect();
    let matches = monitor.match_batch(&DocumentBatch::of(docs.clone()), &SimpleMatcher).unwrap();

    for (doc, result) in docs.iter().zip(matches.documents()) {
        prop_assert_eq!(doc.id(), result.doc_id());
        let expected: BTreeSet<String> = queries
            .iter()
            .enumerate()
            .filter(|(_, node)| evaluate(node, doc).unwrap().is_some())
            .map(|(i, _)| format!("q{}", i))
            .collect();
        let actual: BTreeSet<String> = result.matches().iter().map(|m| m.query_id.clone()).collect();
        prop_assert_eq!(&actual, &expected, "document {:?}", doc);
        prop_assert!(result.candidates() >= expected.len());
        prop_assert!(result.errors().is_empty());
    }
    prop_assert!(matches.queries_run() <= queries.len() * docs.len());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn test_single_pass_is_sound(
        queries in proptest::collection::vec(node(), 1..8),
        docs in proptest::collection::vec(document(), 1..5),
    ) {
        check(queries, docs, Presearcher::new())?;
    }

    #[test]
    fn test_multipass_is_sound(
        queries in proptest::collection::vec(node(), 1..8),
        docs in proptest::collection::vec(document(), 1..5),
        passes in 2u32..5,
    ) {
        check(queries, docs, Presearcher::new().with_passes(passes))?;
    }

    #[test]
    fn test_wildcard_component_is_sound(
        queries in proptest::collection::vec(node(), 1..8),
        docs in proptest::collection::vec(document(), 1..5),
        passes in 1u32..3,
    ) {
        let presearcher = Presearcher::new()
            .with_passes(passes)
            .with_component(Arc::new(WildcardNgramComponent::new().with_max_prefix_len(2)));
        check(queries, docs, presearcher)?;
    }
}
