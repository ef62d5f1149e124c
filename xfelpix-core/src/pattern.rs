//! Multi-pattern matching of dataset paths.
//!
//! A [`PatternSet`] holds several sub-patterns that must all match the same
//! string. Sub-patterns support a small syntax:
//!
//! | pattern   | matches                                                    |
//! |-----------|------------------------------------------------------------|
//! | `text`    | `text` anywhere in the string                              |
//! | `^start`  | `start` only at the beginning of the string                |
//! | `end$`    | `end` only at the end of the string                        |
//! | `<7>`     | the integer 7, with any number of leading zeros            |
//! | `<1-34>`  | an integer in the inclusive range 1..=34                   |
//! | `<7->`    | an integer greater or equal to 7                           |
//! | `<->`     | any integer                                                |
//!
//! Range tokens may be embedded in literal text, e.g. `tag_<100-200>/`.
//! A token with no literal text in front of it only matches a digit run
//! that does not follow a letter, so `<5-10>` ignores the `5` of `.h5`.
//! A lone `^` or `$` is matched literally.
//! Range bounds must fit in a `u64`; a wider bound is a
//! [`Error::PatternSyntax`]. Digit runs in the matched string may be of any
//! length and exceed every finite upper bound.

use crate::{Error, Result};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

/// Inclusive integer range of a `<lo-hi>` token. Missing bounds are open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NumericRange {
    /// Inclusive lower bound.
    pub lo: Option<u64>,
    /// Inclusive upper bound.
    pub hi: Option<u64>,
}

impl NumericRange {
    /// Creates a range with the given bounds.
    #[must_use]
    pub fn new(lo: Option<u64>, hi: Option<u64>) -> Self {
        Self { lo, hi }
    }

    /// Returns true if the decimal digit run lies inside the range.
    ///
    /// Leading zeros are ignored. A run too long for `u64` is larger than
    /// any finite upper bound.
    #[must_use]
    pub fn contains_digits(&self, digits: &str) -> bool {
        match digits.parse::<u64>() {
            Ok(n) => self.lo.is_none_or(|lo| lo <= n) && self.hi.is_none_or(|hi| n <= hi),
            Err(_) => self.hi.is_none(),
        }
    }

    /// Parses the body of a range token, i.e. the text between `<` and `>`.
    fn parse_body(body: &str) -> Result<Self> {
        let parse_bound = |text: &str| -> Result<Option<u64>> {
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<u64>()
                .map(Some)
                .map_err(|e| Error::PatternSyntax(format!("range bound {text:?}: {e}")))
        };
        match body.split_once('-') {
            Some((lo, hi)) => Ok(Self::new(parse_bound(lo)?, parse_bound(hi)?)),
            None => {
                let value = parse_bound(body)?;
                Ok(Self::new(value, value))
            }
        }
    }
}

#[derive(Clone, Debug)]
enum SubPattern {
    Literal(String),
    Regex {
        regex: Regex,
        ranges: Vec<NumericRange>,
    },
}

impl SubPattern {
    fn compile(pattern: &str) -> Result<Self> {
        let anchor_start = pattern.len() > 1 && pattern.starts_with('^');
        let anchor_end = pattern.len() > 1 && pattern.ends_with('$');
        let mut body = pattern;
        if anchor_start {
            body = &body[1..];
        }
        if anchor_end {
            body = &body[..body.len() - 1];
        }

        let mut expr = String::new();
        let mut ranges = Vec::new();
        let mut last = 0;
        for caps in token_regex().captures_iter(body) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let inner = inner.as_str();
            if !range_body_regex().is_match(inner) {
                if inner.bytes().any(|b| b.is_ascii_digit()) {
                    return Err(Error::PatternSyntax(format!(
                        "malformed range token {:?} in {pattern:?}",
                        whole.as_str()
                    )));
                }
                continue;
            }
            let fragment = &body[last..whole.start()];
            if fragment.is_empty() && last == 0 && !anchor_start {
                // bare token: skip digits glued to a word such as `h5`
                expr.push_str(r"(?:^|[^A-Za-z0-9])");
            }
            expr.push_str(&regex::escape(fragment));
            expr.push_str(r"([0-9]+)");
            ranges.push(NumericRange::parse_body(inner)?);
            last = whole.end();
        }

        if ranges.is_empty() && !anchor_start && !anchor_end {
            return Ok(Self::Literal(pattern.to_string()));
        }

        expr.push_str(&regex::escape(&body[last..]));
        if anchor_start {
            expr.insert(0, '^');
        }
        if anchor_end {
            expr.push('$');
        }
        let regex = Regex::new(&expr)
            .map_err(|e| Error::PatternSyntax(format!("{pattern:?}: {e}")))?;
        Ok(Self::Regex { regex, ranges })
    }

    fn is_match(&self, s: &str) -> bool {
        match self {
            Self::Literal(text) => s.contains(text.as_str()),
            Self::Regex { regex, ranges } if ranges.is_empty() => regex.is_match(s),
            Self::Regex { regex, ranges } => {
                let occurrences: Vec<_> = regex.captures_iter(s).collect();
                if occurrences.is_empty() {
                    return false;
                }
                // Each range is satisfied by any occurrence on its own.
                ranges.iter().enumerate().all(|(i, range)| {
                    occurrences.iter().any(|caps| {
                        caps.get(i + 1)
                            .is_some_and(|digits| range.contains_digits(digits.as_str()))
                    })
                })
            }
        }
    }
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"<([^<>]*)>").expect("static regex"))
}

fn range_body_regex() -> &'static Regex {
    static BODY: OnceLock<Regex> = OnceLock::new();
    BODY.get_or_init(|| Regex::new(r"^(?:[0-9]*-[0-9]*|[0-9]+)$").expect("static regex"))
}

/// Compiled set of sub-patterns that must all match.
///
/// An empty set matches every string.
#[derive(Clone, Debug, Default)]
pub struct PatternSet {
    patterns: Vec<String>,
    matchers: Vec<SubPattern>,
}

impl PatternSet {
    /// Splits `text` into sub-patterns with shell quoting rules and compiles them.
    ///
    /// # Errors
    /// Returns [`Error::PatternSyntax`] for unbalanced quotes or malformed
    /// range tokens.
    pub fn parse(text: &str) -> Result<Self> {
        let words = shlex::split(text)
            .ok_or_else(|| Error::PatternSyntax(format!("unbalanced quotes in {text:?}")))?;
        Self::from_patterns(words)
    }

    /// Compiles a list of sub-patterns. Duplicates are dropped, order kept.
    ///
    /// # Errors
    /// Returns [`Error::PatternSyntax`] for malformed range tokens.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if set.patterns.iter().any(|p| p == pattern) {
                continue;
            }
            set.matchers.push(SubPattern::compile(pattern)?);
            set.patterns.push(pattern.to_string());
        }
        Ok(set)
    }

    /// The unique input sub-patterns in their original order.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if the set has no sub-patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns true if every sub-pattern matches `s`.
    #[must_use]
    pub fn is_match(&self, s: &str) -> bool {
        self.matchers.iter().all(|m| m.is_match(s))
    }
}

impl FromStr for PatternSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One-shot check whether all patterns in `patterns` match `s`.
///
/// # Errors
/// Returns [`Error::PatternSyntax`] if the patterns do not compile.
pub fn is_match<I, S>(patterns: I, s: &str) -> Result<bool>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Ok(PatternSet::from_patterns(patterns)?.is_match(s))
}
