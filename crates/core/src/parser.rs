//! Query parsing
//!
//! Parsing is an external collaborator: the monitor only needs "query text
//! becomes a [`QueryNode`]". [`StandardQueryParser`] is the reference
//! implementation, a boolean syntax in the classic Lucene style:
//!
//! ```text
//! fox                      term in the default field
//! title:fox                fielded term
//! "quick brown"            phrase
//! fox AND quick            both required
//! fox OR quick             either
//! fox AND NOT quick        fox required, quick prohibited
//! +fox -quick brown        required / prohibited / optional modifiers
//! title:(fox OR hound)     field applied to a group
//! qu*ck  qu?ck             wildcards
//! fox~1                    fuzzy, max edits 1 (default 2)
//! year:[2000 TO 2010]      inclusive range, {} for exclusive, * for open
//! *:*                      match all
//! ```
//!
//! Adjacent clauses without an operator are optional (OR). `AND` makes
//! both neighbours required unless one is prohibited.

use crate::analyzer::Analyzer;
use crate::error::ParseError;
use crate::query::{BooleanClause, Occur, QueryNode};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default maximum edit distance for `term~`
pub const DEFAULT_FUZZY_EDITS: u32 = 2;

/// Compiles query text into a [`QueryNode`]
pub trait QueryParser: Send + Sync {
    /// Parse query text; metadata is available for parsers that need it
    fn parse(&self, query: &str, metadata: &BTreeMap<String, String>) -> Result<QueryNode, ParseError>;
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Phrase(String),
    Range {
        lower: String,
        upper: String,
        include_lower: bool,
        include_upper: bool,
    },
    Colon,
    LParen,
    RParen,
    Plus,
    Minus,
    And,
    Or,
    Not,
    Fuzzy(Option<u32>),
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ':' | '"' | '[' | ']' | '{' | '}' | '~')
}

fn lex(input: &str) -> Result<Vec<(usize, Tok)>, ParseError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                out.push((pos, Tok::LParen));
                i += 1;
            }
            ')' => {
                out.push((pos, Tok::RParen));
                i += 1;
            }
            ':' => {
                out.push((pos, Tok::Colon));
                i += 1;
            }
            '+' => {
                out.push((pos, Tok::Plus));
                i += 1;
            }
            '-' | '!' => {
                out.push((pos, if c == '-' { Tok::Minus } else { Tok::Not }));
                i += 1;
            }
            '~' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let edits = if digits.is_empty() {
                    None
                } else {
                    Some(digits.parse().map_err(|_| ParseError::at(pos, "invalid fuzzy distance"))?)
                };
                out.push((pos, Tok::Fuzzy(edits)));
            }
            '"' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i].1 != '"' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ParseError::at(pos, "unterminated phrase"));
                }
                let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                out.push((pos, Tok::Phrase(text)));
                i += 1;
            }
            '[' | '{' => {
                let include_lower = c == '[';
                i += 1;
                let start = i;
                while i < chars.len() && !matches!(chars[i].1, ']' | '}') {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ParseError::at(pos, "unterminated range"));
                }
                let include_upper = chars[i].1 == ']';
                let body: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let parts: Vec<&str> = body.split_whitespace().collect();
                if parts.len() != 3 || parts[1] != "TO" {
                    return Err(ParseError::at(pos, "range must be of the form [lower TO upper]"));
                }
                out.push((
                    pos,
                    Tok::Range {
                        lower: parts[0].to_string(),
                        upper: parts[2].to_string(),
                        include_lower,
                        include_upper,
                    },
                ));
                i += 1;
            }
            ']' | '}' => return Err(ParseError::at(pos, "unexpected range terminator")),
            '&' if chars.get(i + 1).map(|(_, c)| *c) == Some('&') => {
                out.push((pos, Tok::And));
                i += 2;
            }
            '|' if chars.get(i + 1).map(|(_, c)| *c) == Some('|') => {
                out.push((pos, Tok::Or));
                i += 2;
            }
            _ => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i].1) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let tok = match word.as_str() {
                    "AND" => Tok::And,
                    "OR" => Tok::Or,
                    "NOT" => Tok::Not,
                    _ => Tok::Word(word),
                };
                out.push((pos, tok));
            }
        }
    }
    Ok(out)
}

// ============================================================================
// StandardQueryParser
// ============================================================================

/// Reference boolean query parser
///
/// Terms are normalized with the configured analyzer so they line up with
/// analyzed document tokens. Wildcard patterns and range bounds are only
/// lowercased.
///
/// # Example
///
/// ```
/// use percolate_core::analyzer::StandardAnalyzer;
/// use percolate_core::parser::{QueryParser, StandardQueryParser};
/// use std::collections::BTreeMap;
/// use std::sync::Arc;
///
/// let parser = StandardQueryParser::new("text", Arc::new(StandardAnalyzer::new()));
/// let node = parser.parse("Fox AND quick", &BTreeMap::new()).unwrap();
/// assert_eq!(node.kind(), percolate_core::query::ClauseKind::Boolean);
/// ```
#[derive(Clone)]
pub struct StandardQueryParser {
    default_field: String,
    analyzer: Arc<dyn Analyzer>,
}

impl StandardQueryParser {
    /// Create a parser with a default field and analyzer
    pub fn new(default_field: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Self {
        StandardQueryParser {
            default_field: default_field.into(),
            analyzer,
        }
    }

    /// Default field for unqualified terms
    pub fn default_field(&self) -> &str {
        &self.default_field
    }
}

impl QueryParser for StandardQueryParser {
    fn parse(&self, query: &str, _metadata: &BTreeMap<String, String>) -> Result<QueryNode, ParseError> {
        let tokens = lex(query)?;
        let mut state = ParseState {
            tokens,
            pos: 0,
            parser: self,
        };
        let node = state.parse_clauses(&self.default_field, false)?;
        if let Some((pos, _)) = state.tokens.get(state.pos) {
            return Err(ParseError::at(*pos, "unexpected ')'"));
        }
        node.ok_or_else(|| ParseError::new("query contains no searchable clauses"))
    }
}

struct ParseState<'a> {
    tokens: Vec<(usize, Tok)>,
    pos: usize,
    parser: &'a StandardQueryParser,
}

#[derive(Clone, Copy, PartialEq)]
enum Conj {
    None,
    And,
    Or,
}

impl<'a> ParseState<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(p, _)| *p)
            .or_else(|| self.tokens.last().map(|(p, _)| *p))
            .unwrap_or(0)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        tok
    }

    /// Parse a clause list until end of input (or `)` when nested)
    fn parse_clauses(&mut self, field: &str, nested: bool) -> Result<Option<QueryNode>, ParseError> {
        let mut clauses: Vec<BooleanClause> = Vec::new();
        let mut conj = Conj::None;
        loop {
            match self.peek() {
                None => break,
                Some(Tok::RParen) if nested => break,
                Some(Tok::RParen) => return Err(ParseError::at(self.offset(), "unexpected ')'")),
                Some(Tok::And) | Some(Tok::Or) => {
                    let at = self.offset();
                    let tok = self.next();
                    if clauses.is_empty() || conj != Conj::None {
                        return Err(ParseError::at(at, "operator without left operand"));
                    }
                    conj = if tok == Some(Tok::And) { Conj::And } else { Conj::Or };
                    continue;
                }
                _ => {}
            }

            let mut occur = Occur::Should;
            match self.peek() {
                Some(Tok::Plus) => {
                    self.next();
                    occur = Occur::Must;
                }
                Some(Tok::Minus) | Some(Tok::Not) => {
                    self.next();
                    occur = Occur::MustNot;
                }
                _ => {}
            }
            if conj == Conj::And && occur != Occur::MustNot {
                occur = Occur::Must;
            }
            if conj == Conj::And {
                if let Some(prev) = clauses.last_mut() {
                    if prev.occur != Occur::MustNot {
                        prev.occur = Occur::Must;
                    }
                }
            }

            if let Some(node) = self.parse_primary(field)? {
                clauses.push(BooleanClause::new(occur, node));
            }
            conj = Conj::None;
        }
        if conj != Conj::None {
            return Err(ParseError::at(self.offset(), "operator without right operand"));
        }
        if clauses.len() == 1 && clauses[0].occur != Occur::MustNot {
            return Ok(clauses.pop().map(|c| c.node));
        }
        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(QueryNode::boolean(clauses)))
    }

    fn parse_primary(&mut self, field: &str) -> Result<Option<QueryNode>, ParseError> {
        let at = self.offset();
        match self.next() {
            Some(Tok::LParen) => self.parse_group(field, at),
            Some(Tok::Phrase(text)) => Ok(self.phrase_node(field, &text)),
            Some(Tok::Range {
                lower,
                upper,
                include_lower,
                include_upper,
            }) => Ok(Some(range_node(field, &lower, &upper, include_lower, include_upper))),
            Some(Tok::Word(word)) => {
                if self.peek() == Some(&Tok::Colon) {
                    self.next();
                    if word == "*" {
                        return match self.next() {
                            Some(Tok::Word(w)) if w == "*" => Ok(Some(QueryNode::MatchAll)),
                            _ => Err(ParseError::at(at, "expected '*:*'")),
                        };
                    }
                    return self.parse_fielded(&word, at);
                }
                self.word_node(field, &word)
            }
            Some(_) => Err(ParseError::at(at, "expected a term, phrase or group")),
            None => Err(ParseError::at(at, "unexpected end of query")),
        }
    }

    fn parse_fielded(&mut self, field: &str, at: usize) -> Result<Option<QueryNode>, ParseError> {
        let inner_at = self.offset();
        match self.next() {
            Some(Tok::LParen) => self.parse_group(field, inner_at),
            Some(Tok::Phrase(text)) => Ok(self.phrase_node(field, &text)),
            Some(Tok::Range {
                lower,
                upper,
                include_lower,
                include_upper,
            }) => Ok(Some(range_node(field, &lower, &upper, include_lower, include_upper))),
            Some(Tok::Word(word)) => self.word_node(field, &word),
            _ => Err(ParseError::at(at, format!("missing term after '{}:'", field))),
        }
    }

    fn parse_group(&mut self, field: &str, at: usize) -> Result<Option<QueryNode>, ParseError> {
        let inner = self.parse_clauses(field, true)?;
        match self.next() {
            Some(Tok::RParen) => Ok(inner),
            _ => Err(ParseError::at(at, "unbalanced parenthesis")),
        }
    }

    fn word_node(&mut self, field: &str, word: &str) -> Result<Option<QueryNode>, ParseError> {
        let fuzzy = match self.peek() {
            Some(Tok::Fuzzy(edits)) => {
                let edits = edits.unwrap_or(DEFAULT_FUZZY_EDITS);
                self.next();
                Some(edits)
            }
            _ => None,
        };
        if word.contains('*') || word.contains('?') {
            return Ok(Some(QueryNode::wildcard(field, word.to_lowercase())));
        }
        let tokens = self.parser.analyzer.analyze(word);
        if let Some(max_edits) = fuzzy {
            return Ok(tokens.into_iter().next().map(|t| QueryNode::Fuzzy {
                field: field.to_string(),
                text: t.text,
                max_edits,
            }));
        }
        Ok(match tokens.len() {
            0 => None,
            1 => tokens.into_iter().next().map(|t| QueryNode::term(field, t.text)),
            _ => Some(QueryNode::phrase_from_tokens(field, tokens)),
        })
    }

    fn phrase_node(&self, field: &str, text: &str) -> Option<QueryNode> {
        let tokens = self.parser.analyzer.analyze(text);
        match tokens.len() {
            0 => None,
            1 => tokens.into_iter().next().map(|t| QueryNode::term(field, t.text)),
            _ => Some(QueryNode::phrase_from_tokens(field, tokens)),
        }
    }
}

fn range_node(field: &str, lower: &str, upper: &str, include_lower: bool, include_upper: bool) -> QueryNode {
    let bound = |b: &str| if b == "*" { None } else { Some(b.to_lowercase()) };
    QueryNode::Range {
        field: field.to_string(),
        lower: bound(lower),
        upper: bound(upper),
        include_lower,
        include_upper,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::StandardAnalyzer;

    fn parse(q: &str) -> Result<QueryNode, ParseError> {
        StandardQueryParser::new("text", Arc::new(StandardAnalyzer::new())).parse(q, &BTreeMap::new())
    }

    fn must(node: QueryNode) -> BooleanClause {
        BooleanClause::new(Occur::Must, node)
    }

    #[test]
    fn test_single_term() {
        assert_eq!(parse("Fox").unwrap(), QueryNode::term("text", "fox"));
    }

    #[test]
    fn test_and() {
        assert_eq!(
            parse("fox AND quick").unwrap(),
            QueryNode::boolean(vec![must(QueryNode::term("text", "fox")), must(QueryNode::term("text", "quick"))])
        );
    }

    #[test]
    fn test_and_not() {
        assert_eq!(
            parse("fox AND NOT quick").unwrap(),
            QueryNode::boolean(vec![
                must(QueryNode::term("text", "fox")),
                BooleanClause::new(Occur::MustNot, QueryNode::term("text", "quick")),
            ])
        );
    }

    #[test]
    fn test_implicit_or() {
        assert_eq!(
            parse("fox hound").unwrap(),
            QueryNode::any(vec![QueryNode::term("text", "fox"), QueryNode::term("text", "hound")])
        );
    }

    #[test]
    fn test_modifiers() {
        let node = parse("+fox -cat dog").unwrap();
        let QueryNode::Boolean { clauses } = node else {
            panic!("expected boolean");
        };
        let occurs: Vec<_> = clauses.iter().map(|c| c.occur).collect();
        assert_eq!(occurs, vec![Occur::Must, Occur::MustNot, Occur::Should]);
    }

    #[test]
    fn test_fielded_group_and_phrase() {
        let node = parse("title:(\"Quick Brown\" OR fox)").unwrap();
        assert_eq!(
            node,
            QueryNode::boolean(vec![
                BooleanClause::new(Occur::Should, QueryNode::phrase("title", vec!["quick".into(), "brown".into()])),
                BooleanClause::new(Occur::Should, QueryNode::term("title", "fox")),
            ])
        );
    }

    #[test]
    fn test_phrase_keeps_stopword_gaps() {
        let parser = StandardQueryParser::new("text", Arc::new(StandardAnalyzer::english()));
        let node = parser.parse("\"jack of spades\"", &BTreeMap::new()).unwrap();
        match node {
            QueryNode::Phrase { terms, offsets, .. } => {
                assert_eq!(terms, vec!["jack".to_string(), "spades".to_string()]);
                assert_eq!(offsets, vec![0, 2]);
            }
            other => panic!("expected a phrase, got {:?}", other),
        }
    }

    #[test]
    fn test_wildcard_fuzzy_range_matchall() {
        assert_eq!(parse("Qu*ck").unwrap(), QueryNode::wildcard("text", "qu*ck"));
        assert_eq!(
            parse("fox~1").unwrap(),
            QueryNode::Fuzzy { field: "text".into(), text: "fox".into(), max_edits: 1 }
        );
        assert_eq!(
            parse("year:[2000 TO *}").unwrap(),
            QueryNode::Range {
                field: "year".into(),
                lower: Some("2000".into()),
                upper: None,
                include_lower: true,
                include_upper: false,
            }
        );
        assert_eq!(parse("*:*").unwrap(), QueryNode::MatchAll);
    }

    #[test]
    fn test_pure_negation_stays_boolean() {
        let node = parse("NOT fox").unwrap();
        assert_eq!(
            node,
            QueryNode::boolean(vec![BooleanClause::new(Occur::MustNot, QueryNode::term("text", "fox"))])
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse("(fox AND quick").is_err());
        assert!(parse("fox AND").is_err());
        assert!(parse("AND fox").is_err());
        assert!(parse("\"unterminated").is_err());
        assert!(parse("title:").is_err());
        assert!(parse("fox)").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_stopword_only_query_is_rejected() {
        let parser = StandardQueryParser::new("text", Arc::new(StandardAnalyzer::english()));
        assert!(parser.parse("the", &BTreeMap::new()).is_err());
    }

    proptest::proptest! {
        #[test]
        fn test_parse_never_panics(input in "[a-z \\(\\)\"\\*\\?:~+\\-\\[\\]{}]{0,40}") {
            let _ = parse(&input);
        }

        #[test]
        fn test_bare_words_parse(words in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
            let text = words.join(" ");
            proptest::prop_assert!(parse(&text).is_ok());
        }
    }
}
