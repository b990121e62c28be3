//! Compiled path matchers and request-time binding extraction.
//!
//! A template without any wildcard compiles to an exact-literal matcher that
//! is evaluated with a plain string comparison. Everything else becomes an
//! anchored regular expression: `*` is `[^/]+`, `**` is `.*`, literals are
//! copied without slash normalisation and the verb is appended before `$`.
use std::{fmt, sync::Arc};

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::{
    specificity::Specificity,
    template::{ParseError, Segment, Template},
};

const SINGLE_WILDCARD: &str = "[^/]+";
const MULTI_WILDCARD: &str = ".*";

#[derive(Debug, Clone)]
enum MatcherKind {
    ExactLiteral(String),
    Pattern {
        /// Canonical, capture-free expression text.
        pattern: String,
        /// Same expression with one group per bound field path.
        regex: Regex,
    },
}

/// A template compiled for request-time matching. Immutable and cheap to share.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    template: String,
    kind: MatcherKind,
    bound_field_paths: Vec<Arc<str>>,
    specificity: Specificity,
}

impl PathMatcher {
    /// Parse and compile in one step.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        Self::compile(&Template::parse(raw)?)
    }

    pub fn compile(template: &Template) -> Result<Self, ParseError> {
        let specificity = Specificity::of(template);

        if !template.has_wildcard() {
            return Ok(Self {
                template: template.raw().to_string(),
                kind: MatcherKind::ExactLiteral(template.literal_path()),
                bound_field_paths: Vec::new(),
                specificity,
            });
        }

        let mut pattern = String::from("^");
        let mut capturing = String::from("(?s)^");
        let mut bound_field_paths = Vec::new();

        for segment in template.segments() {
            pattern.push('/');
            capturing.push('/');
            match segment {
                Segment::Variable(variable) => {
                    let fragment = join_fragments(&variable.sub_segments);
                    pattern.push_str(&fragment);
                    capturing.push('(');
                    capturing.push_str(&fragment);
                    capturing.push(')');
                    bound_field_paths.push(Arc::from(variable.field_path.to_string()));
                }
                other => {
                    let fragment = fragment_for(other);
                    pattern.push_str(&fragment);
                    capturing.push_str(&fragment);
                }
            }
        }

        if let Some(verb) = template.verb() {
            let escaped = regex::escape(&format!(":{verb}"));
            pattern.push_str(&escaped);
            capturing.push_str(&escaped);
        }
        pattern.push('$');
        capturing.push('$');

        let regex = Regex::new(&capturing).map_err(|e| ParseError::Expression {
            template: template.raw().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            template: template.raw().to_string(),
            kind: MatcherKind::Pattern { pattern, regex },
            bound_field_paths,
            specificity,
        })
    }

    /// Test `path` and extract bindings. `path` must already be percent-decoded
    /// and stripped of its query string; nothing is normalised here.
    pub fn matches(&self, path: &str) -> Option<Bindings> {
        match &self.kind {
            MatcherKind::ExactLiteral(literal) => (literal == path).then(Bindings::default),
            MatcherKind::Pattern { regex, .. } => {
                let captures = regex.captures(path)?;
                let values = self
                    .bound_field_paths
                    .iter()
                    .enumerate()
                    .map(|(i, field)| {
                        let value = captures.get(i + 1).map_or("", |m| m.as_str());
                        (field.clone(), value.to_string())
                    })
                    .collect();
                Some(Bindings(values))
            }
        }
    }

    pub fn is_exact_literal(&self) -> bool {
        matches!(self.kind, MatcherKind::ExactLiteral(_))
    }

    /// Canonical anchored expression, or `""` for exact-literal matchers.
    pub fn pattern(&self) -> &str {
        match &self.kind {
            MatcherKind::ExactLiteral(_) => "",
            MatcherKind::Pattern { pattern, .. } => pattern,
        }
    }

    /// The literal compared against for exact-literal matchers.
    pub fn literal(&self) -> Option<&str> {
        match &self.kind {
            MatcherKind::ExactLiteral(literal) => Some(literal),
            MatcherKind::Pattern { .. } => None,
        }
    }

    /// Field paths in template order; this is also the capture order.
    pub fn bound_field_paths(&self) -> &[Arc<str>] {
        &self.bound_field_paths
    }

    pub fn specificity(&self) -> Specificity {
        self.specificity
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

/// The canonical wildcard expression for `raw`, or an empty string when the
/// template is exact-literal or fails to parse.
pub fn wildcard_pattern_for(raw: &str) -> String {
    match PathMatcher::parse(raw) {
        Ok(matcher) => matcher.pattern().to_string(),
        Err(e) => {
            tracing::debug!(template = raw, error = %e, "template rejected");
            String::new()
        }
    }
}

fn fragment_for(segment: &Segment) -> String {
    match segment {
        Segment::Literal(text) => regex::escape(text),
        Segment::SingleWildcard => SINGLE_WILDCARD.to_string(),
        Segment::MultiWildcard => MULTI_WILDCARD.to_string(),
        Segment::Variable(variable) => join_fragments(&variable.sub_segments),
    }
}

fn join_fragments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(fragment_for)
        .collect::<Vec<_>>()
        .join("/")
}

/// Field path → captured value pairs, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(Vec<(Arc<str>, String)>);

impl Bindings {
    pub fn get(&self, field_path: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.as_ref() == field_path)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Bindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k.as_ref(), v)?;
        }
        map.end()
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
