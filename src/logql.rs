//! Minimal log selector language: label matchers plus line filter stages.
//!
//! Grammar (informal):
//!
//! ```text
//! selector  = "{" [ matcher { "," matcher } ] "}" { filter }
//! matcher   = label ( "=" | "!=" | "=~" | "!~" ) string
//! filter    = ( "|=" | "!=" | "|~" | "!~" ) string
//! ```
//!
//! Parsing validates syntax only; regex patterns are compiled by
//! [`Selector::compile`], so pattern errors surface at execution time.

use regex::Regex;
use std::fmt;

use crate::model::Labels;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Eq,
    Neq,
    Re,
    NotRe,
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOp::Eq => write!(f, "="),
            MatchOp::Neq => write!(f, "!="),
            MatchOp::Re => write!(f, "=~"),
            MatchOp::NotRe => write!(f, "!~"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Contains,
    NotContains,
    Regex,
    NotRegex,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Contains => write!(f, "|="),
            FilterOp::NotContains => write!(f, "!="),
            FilterOp::Regex => write!(f, "|~"),
            FilterOp::NotRegex => write!(f, "!~"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFilter {
    pub op: FilterOp,
    pub pattern: String,
}

/// A parsed log selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub matchers: Vec<LabelMatcher>,
    pub filters: Vec<LineFilter>,
}

#[derive(Debug)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error in selector: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

impl Selector {
    pub fn parse(input: &str) -> Result<Selector, ParseError> {
        Parser::new(input).selector()
    }

    /// Append a regex line-filter stage. Used by the legacy `regexp`
    /// query-string compatibility path.
    pub fn with_regex_filter(mut self, pattern: &str) -> Selector {
        self.filters.push(LineFilter {
            op: FilterOp::Regex,
            pattern: pattern.to_string(),
        });
        self
    }

    /// Compile matcher and filter regexes for evaluation.
    pub fn compile(&self) -> Result<CompiledSelector, ParseError> {
        let mut matchers = Vec::with_capacity(self.matchers.len());
        for m in &self.matchers {
            let compiled = match m.op {
                MatchOp::Eq | MatchOp::Neq => CompiledMatcher {
                    name: m.name.clone(),
                    op: m.op,
                    value: m.value.clone(),
                    re: None,
                },
                MatchOp::Re | MatchOp::NotRe => CompiledMatcher {
                    name: m.name.clone(),
                    op: m.op,
                    value: m.value.clone(),
                    re: Some(compile_anchored(&m.value)?),
                },
            };
            matchers.push(compiled);
        }

        let mut filters = Vec::with_capacity(self.filters.len());
        for f in &self.filters {
            let re = match f.op {
                FilterOp::Regex | FilterOp::NotRegex => Some(
                    Regex::new(&f.pattern)
                        .map_err(|e| ParseError(format!("invalid regex '{}': {}", f.pattern, e)))?,
                ),
                _ => None,
            };
            filters.push(CompiledFilter {
                op: f.op,
                pattern: f.pattern.clone(),
                re,
            });
        }

        Ok(CompiledSelector { matchers, filters })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, m) in self.matchers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}{}{}", m.name, m.op, quote(&m.value))?;
        }
        write!(f, "}}")?;
        for lf in &self.filters {
            write!(f, " {} {}", lf.op, quote(&lf.pattern))?;
        }
        Ok(())
    }
}

/// A selector with regexes compiled, ready to match streams and lines.
pub struct CompiledSelector {
    matchers: Vec<CompiledMatcher>,
    filters: Vec<CompiledFilter>,
}

struct CompiledMatcher {
    name: String,
    op: MatchOp,
    value: String,
    re: Option<Regex>,
}

struct CompiledFilter {
    op: FilterOp,
    pattern: String,
    re: Option<Regex>,
}

impl CompiledSelector {
    /// Whether a stream's label set satisfies every matcher.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.matchers.iter().all(|m| {
            let value = labels.get(&m.name).map(String::as_str).unwrap_or("");
            match m.op {
                MatchOp::Eq => value == m.value,
                MatchOp::Neq => value != m.value,
                // compile() always sets re for regex ops
                MatchOp::Re => m.re.as_ref().map(|re| re.is_match(value)).unwrap_or(false),
                MatchOp::NotRe => m.re.as_ref().map(|re| !re.is_match(value)).unwrap_or(false),
            }
        })
    }

    /// Whether a log line passes every filter stage.
    pub fn accepts(&self, line: &str) -> bool {
        self.filters.iter().all(|f| match f.op {
            FilterOp::Contains => line.contains(&f.pattern),
            FilterOp::NotContains => !line.contains(&f.pattern),
            FilterOp::Regex => f.re.as_ref().map(|re| re.is_match(line)).unwrap_or(false),
            FilterOp::NotRegex => f.re.as_ref().map(|re| !re.is_match(line)).unwrap_or(false),
        })
    }
}

// Label matcher regexes are fully anchored, matching Prometheus semantics.
fn compile_anchored(pattern: &str) -> Result<Regex, ParseError> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| ParseError(format!("invalid regex '{}': {}", pattern, e)))
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn selector(&mut self) -> Result<Selector, ParseError> {
        self.skip_ws();
        self.expect('{')?;
        let mut matchers = Vec::new();
        self.skip_ws();
        if self.peek() != Some('}') {
            loop {
                matchers.push(self.matcher()?);
                self.skip_ws();
                match self.peek() {
                    Some(',') => {
                        self.bump();
                        self.skip_ws();
                    }
                    Some('}') => break,
                    other => {
                        return Err(ParseError(format!(
                            "expected ',' or '}}', got {:?} in '{}'",
                            other, self.input
                        )))
                    }
                }
            }
        }
        self.expect('}')?;

        let mut filters = Vec::new();
        loop {
            self.skip_ws();
            let op = match (self.peek(), self.peek_second()) {
                (Some('|'), Some('=')) => FilterOp::Contains,
                (Some('|'), Some('~')) => FilterOp::Regex,
                (Some('!'), Some('=')) => FilterOp::NotContains,
                (Some('!'), Some('~')) => FilterOp::NotRegex,
                (None, _) => break,
                (other, _) => {
                    return Err(ParseError(format!(
                        "expected filter operator, got {:?} in '{}'",
                        other, self.input
                    )))
                }
            };
            self.bump();
            self.bump();
            self.skip_ws();
            let pattern = self.string()?;
            filters.push(LineFilter { op, pattern });
        }

        Ok(Selector { matchers, filters })
    }

    fn matcher(&mut self) -> Result<LabelMatcher, ParseError> {
        let name = self.identifier()?;
        self.skip_ws();
        let op = match self.peek() {
            Some('=') => {
                self.bump();
                if self.peek() == Some('~') {
                    self.bump();
                    MatchOp::Re
                } else {
                    MatchOp::Eq
                }
            }
            Some('!') => {
                self.bump();
                match self.peek() {
                    Some('=') => {
                        self.bump();
                        MatchOp::Neq
                    }
                    Some('~') => {
                        self.bump();
                        MatchOp::NotRe
                    }
                    other => {
                        return Err(ParseError(format!(
                            "expected '=' or '~' after '!', got {:?}",
                            other
                        )))
                    }
                }
            }
            other => return Err(ParseError(format!("expected matcher operator, got {:?}", other))),
        };
        self.skip_ws();
        let value = self.string()?;
        Ok(LabelMatcher { name, op, value })
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(ParseError(format!("expected label name, got {:?}", self.peek())));
        }
        Ok(out)
    }

    fn string(&mut self) -> Result<String, ParseError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(ParseError("unterminated string".to_string())),
                },
                Some(c) => out.push(c),
                None => return Err(ParseError("unterminated string".to_string())),
            }
        }
    }

    fn expect(&mut self, want: char) -> Result<(), ParseError> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            other => Err(ParseError(format!(
                "expected {:?}, got {:?} in '{}'",
                want, other, self.input
            ))),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_second(&mut self) -> Option<char> {
        let mut clone = self.chars.clone();
        clone.next();
        clone.next().map(|(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Labels;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_and_display_roundtrip() {
        let sel = Selector::parse(r#"{app="x", env!="dev"}"#).unwrap();
        assert_eq!(sel.to_string(), r#"{app="x", env!="dev"}"#);
    }

    #[test]
    fn test_regex_filter_appending() {
        let sel = Selector::parse(r#"{app="x"}"#).unwrap().with_regex_filter("err.*");
        assert_eq!(sel.to_string(), r#"{app="x"} |~ "err.*""#);
    }

    #[test]
    fn test_parse_filters() {
        let sel = Selector::parse(r#"{app="x"} |= "foo" !~ "bar.*""#).unwrap();
        assert_eq!(sel.filters.len(), 2);
        assert_eq!(sel.filters[0].op, FilterOp::Contains);
        assert_eq!(sel.filters[1].op, FilterOp::NotRegex);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Selector::parse("app=x").is_err());
        assert!(Selector::parse(r#"{app="x"#).is_err());
        assert!(Selector::parse(r#"{app=="x"}"#).is_err());
        assert!(Selector::parse(r#"{app="x"} |"#).is_err());
    }

    #[test]
    fn test_label_matching() {
        let sel = Selector::parse(r#"{app="x", env=~"prod|staging"}"#).unwrap();
        let compiled = sel.compile().unwrap();
        assert!(compiled.matches(&labels(&[("app", "x"), ("env", "prod")])));
        assert!(compiled.matches(&labels(&[("app", "x"), ("env", "staging")])));
        assert!(!compiled.matches(&labels(&[("app", "x"), ("env", "production")])));
        assert!(!compiled.matches(&labels(&[("app", "y"), ("env", "prod")])));
    }

    #[test]
    fn test_line_filtering() {
        let sel = Selector::parse(r#"{app="x"} |~ "err.*" != "ignored""#).unwrap();
        let compiled = sel.compile().unwrap();
        assert!(compiled.accepts("error: disk full"));
        assert!(!compiled.accepts("all good"));
        assert!(!compiled.accepts("error: ignored"));
    }

    #[test]
    fn test_bad_regex_surfaces_at_compile() {
        let sel = Selector::parse(r#"{app="x"}"#).unwrap().with_regex_filter("err(");
        assert!(sel.compile().is_err());
    }

    #[test]
    fn test_escaped_quotes_in_values() {
        let sel = Selector::parse(r#"{msg="say \"hi\""}"#).unwrap();
        assert_eq!(sel.matchers[0].value, r#"say "hi""#);
        assert_eq!(sel.to_string(), r#"{msg="say \"hi\""}"#);
    }
}
