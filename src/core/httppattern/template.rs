//! Parsing of `HttpRule` style path templates.
//!
//! Grammar accepted here:
//!
//! ```text
//! Template = "/" Segments [ ":" Verb ]
//! Segments = Segment { "/" Segment }
//! Segment  = "*" | "**" | LITERAL | Variable
//! Variable = "{" FieldPath [ "=" Segments ] "}"
//! ```
//!
//! Literal text is kept byte-for-byte. In particular a variable sub-pattern
//! that starts with `/` keeps that separator as an empty literal, so
//! `/v1/{name=/books/*}` renders back with a doubled slash.
use std::{collections::HashSet, fmt, str::FromStr};

/// Errors raised while parsing a template. Always surfaced at config load time.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("template '{template}' must start with '/'")]
    MissingLeadingSlash { template: String },

    #[error("template '{template}' has unbalanced braces")]
    UnbalancedBraces { template: String },

    #[error("template '{template}' nests a variable inside another variable")]
    NestedVariable { template: String },

    #[error("template '{template}' has a malformed variable '{token}'")]
    MalformedVariable { template: String, token: String },

    #[error("template '{template}' has an invalid field path '{field_path}'")]
    InvalidFieldPath {
        template: String,
        field_path: String,
    },

    #[error("template '{template}' binds field path '{field_path}' more than once")]
    DuplicateFieldPath {
        template: String,
        field_path: String,
    },

    #[error("template '{template}' has an empty pattern for variable '{field_path}'")]
    EmptyVariablePattern {
        template: String,
        field_path: String,
    },

    #[error("template '{template}' ends with an empty verb")]
    EmptyVerb { template: String },

    #[error("template '{template}' could not be compiled: {message}")]
    Expression { template: String, message: String },
}

/// One `/`-separated piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `*`: exactly one non-empty path segment.
    SingleWildcard,
    /// `**`: any run of characters, slashes included.
    MultiWildcard,
    Variable(Variable),
}

impl Segment {
    /// True for `*`, `**`, and variables whose sub-pattern contains either.
    pub fn has_wildcard(&self) -> bool {
        match self {
            Segment::SingleWildcard | Segment::MultiWildcard => true,
            Segment::Variable(variable) => variable.sub_segments.iter().any(Segment::has_wildcard),
            Segment::Literal(_) => false,
        }
    }
}

/// Dot separated identifiers naming the (possibly nested) request field a
/// variable binds to, e.g. `book.id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parse `a.b.c`. Every part must be an identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<String> = raw.split('.').map(str::to_string).collect();
        if parts.iter().all(|p| is_identifier(p)) {
            Some(Self(parts))
        } else {
            None
        }
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// A `{field.path=sub/pattern}` binding. The sub-pattern never holds another variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub field_path: FieldPath,
    pub sub_segments: Vec<Segment>,
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
    verb: Option<String>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        if !raw.starts_with('/') {
            return Err(ParseError::MissingLeadingSlash {
                template: raw.to_string(),
            });
        }

        let (path, verb) = split_verb(raw)?;
        let mut segments = Vec::new();
        for token in split_top_level(&path[1..]) {
            segments.push(parse_token(raw, token, true)?);
        }

        let mut seen = HashSet::new();
        for segment in &segments {
            if let Segment::Variable(variable) = segment {
                if !seen.insert(&variable.field_path) {
                    return Err(ParseError::DuplicateFieldPath {
                        template: raw.to_string(),
                        field_path: variable.field_path.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            verb,
        })
    }

    /// The template text exactly as configured.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn verb(&self) -> Option<&str> {
        self.verb.as_deref()
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(Segment::has_wildcard)
    }

    /// Field paths in left-to-right order.
    pub fn field_paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable(variable) => Some(&variable.field_path),
            _ => None,
        })
    }

    /// The concrete path this template denotes once variables are inlined.
    ///
    /// Only meaningful when [`Template::has_wildcard`] is false; wildcards are
    /// rendered as `*` / `**`.
    pub fn literal_path(&self) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            out.push('/');
            render_segment(segment, &mut out);
        }
        if let Some(verb) = &self.verb {
            out.push(':');
            out.push_str(verb);
        }
        out
    }
}

impl FromStr for Template {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn render_segment(segment: &Segment, out: &mut String) {
    match segment {
        Segment::Literal(text) => out.push_str(text),
        Segment::SingleWildcard => out.push('*'),
        Segment::MultiWildcard => out.push_str("**"),
        Segment::Variable(variable) => {
            for (i, sub) in variable.sub_segments.iter().enumerate() {
                if i > 0 {
                    out.push('/');
                }
                render_segment(sub, out);
            }
        }
    }
}

/// Checks brace balance and splits off the verb.
///
/// The verb is whatever follows the last top-level `:` provided that colon
/// sits after the last top-level `/`.
fn split_verb(raw: &str) -> Result<(&str, Option<String>), ParseError> {
    let mut depth = 0usize;
    let mut last_slash = 0usize;
    let mut last_colon = None;

    for (i, c) in raw.char_indices() {
        match c {
            '{' => {
                if depth > 0 {
                    return Err(ParseError::NestedVariable {
                        template: raw.to_string(),
                    });
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    return Err(ParseError::UnbalancedBraces {
                        template: raw.to_string(),
                    });
                }
                depth -= 1;
            }
            '/' if depth == 0 => last_slash = i,
            ':' if depth == 0 => last_colon = Some(i),
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ParseError::UnbalancedBraces {
            template: raw.to_string(),
        });
    }

    match last_colon {
        Some(colon) if colon > last_slash => {
            let verb = &raw[colon + 1..];
            if verb.is_empty() {
                return Err(ParseError::EmptyVerb {
                    template: raw.to_string(),
                });
            }
            Ok((&raw[..colon], Some(verb.to_string())))
        }
        _ => Ok((raw, None)),
    }
}

/// Splits on `/` outside of braces. Braces are known to be balanced here.
fn split_top_level(path: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (i, c) in path.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                tokens.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&path[start..]);
    tokens
}

fn parse_token(template: &str, token: &str, allow_variable: bool) -> Result<Segment, ParseError> {
    match token {
        "*" => return Ok(Segment::SingleWildcard),
        "**" => return Ok(Segment::MultiWildcard),
        _ => {}
    }

    let has_brace = token.contains('{') || token.contains('}');
    if !has_brace {
        return Ok(Segment::Literal(token.to_string()));
    }
    if !allow_variable {
        return Err(ParseError::NestedVariable {
            template: template.to_string(),
        });
    }

    let inner = token
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .filter(|inner| !inner.contains('{') && !inner.contains('}'))
        .ok_or_else(|| ParseError::MalformedVariable {
            template: template.to_string(),
            token: token.to_string(),
        })?;

    let (field_raw, sub_pattern) = match inner.split_once('=') {
        Some((field, sub)) => (field, Some(sub)),
        None => (inner, None),
    };

    let field_path = FieldPath::parse(field_raw).ok_or_else(|| ParseError::InvalidFieldPath {
        template: template.to_string(),
        field_path: field_raw.to_string(),
    })?;

    let sub_segments = match sub_pattern {
        None => vec![Segment::SingleWildcard],
        Some("") => {
            return Err(ParseError::EmptyVariablePattern {
                template: template.to_string(),
                field_path: field_path.to_string(),
            });
        }
        Some(sub) => sub
            .split('/')
            .map(|t| parse_token(template, t, false))
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(Segment::Variable(Variable {
        field_path,
        sub_segments,
    }))
}
