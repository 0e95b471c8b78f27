use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use crate::firestore::error::{invalid_field_path, FirestoreResult};

/// Ordered list of raw field names addressing a (possibly nested) document field.
///
/// Segments are stored unquoted. [`FieldPath::canonical_string`] renders the wire form,
/// where every segment that is not a simple identifier is wrapped in backticks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Builds a path from raw segments. Segments are taken literally, dots included.
    pub fn new<S, I>(segments: I) -> FirestoreResult<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(invalid_field_path("FieldPath must contain at least one segment"));
        }
        if segments.iter().any(String::is_empty) {
            return Err(invalid_field_path("FieldPath segments cannot be empty"));
        }
        Ok(Self { segments })
    }

    /// Parses a dotted path such as `user.age` or ``stock.`item-001` ``.
    ///
    /// Dots split segments unless they sit inside backticks or follow a backslash.
    /// A backslash makes the next character literal.
    pub fn parse(path: &str) -> FirestoreResult<Self> {
        if path.is_empty() {
            return Err(invalid_field_path("FieldPath string cannot be empty"));
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        let mut chars = path.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => {
                        return Err(invalid_field_path(format!(
                            "Trailing escape character in field path '{path}'"
                        )))
                    }
                },
                '`' => quoted = !quoted,
                '.' if !quoted => {
                    if current.is_empty() {
                        return Err(invalid_field_path(format!(
                            "Field path '{path}' contains an empty segment"
                        )));
                    }
                    segments.push(std::mem::take(&mut current));
                }
                other => current.push(other),
            }
        }

        if quoted {
            return Err(invalid_field_path(format!(
                "Unterminated backtick in field path '{path}'"
            )));
        }
        if current.is_empty() {
            return Err(invalid_field_path(format!(
                "Field path '{path}' contains an empty segment"
            )));
        }
        segments.push(current);
        Ok(Self { segments })
    }

    pub fn from_dot_separated(path: &str) -> FirestoreResult<Self> {
        Self::parse(path)
    }

    /// The special path addressing a document's name in queries.
    pub fn document_id() -> Self {
        Self {
            segments: vec!["__name__".to_string()],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last_segment(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Returns a new path with `other`'s segments appended.
    pub fn join(&self, other: &FieldPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        self.len() <= other.len() && self.segments.iter().zip(&other.segments).all(|(l, r)| l == r)
    }

    /// Quoted, dot-joined wire form.
    pub fn canonical_string(&self) -> String {
        self.segments
            .iter()
            .map(|segment| quote_segment(segment))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

/// True when `segment` matches `[A-Za-z_][A-Za-z_0-9]*`.
pub fn is_simple_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Quotes a single segment for the wire grammar.
///
/// Simple identifiers pass through. Anything else is wrapped in backticks, with
/// backslashes escaped before backticks so introduced backslashes are not doubled.
pub fn quote_segment(segment: &str) -> Cow<'_, str> {
    if is_simple_identifier(segment) {
        return Cow::Borrowed(segment);
    }
    let escaped = segment.replace('\\', "\\\\").replace('`', "\\`");
    Cow::Owned(format!("`{escaped}`"))
}

/// Splits a dotted path into segments and quotes each one independently.
///
/// A key that must keep a literal dot belongs in [`quote_segment`] instead.
pub fn quote_path(path: &str) -> FirestoreResult<String> {
    Ok(FieldPath::parse(path)?.canonical_string())
}

/// Converts common user inputs into a validated [`FieldPath`].
pub trait IntoFieldPath {
    fn into_field_path(self) -> FirestoreResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> FirestoreResult<FieldPath> {
        Ok(self)
    }
}

impl<'a> IntoFieldPath for &'a FieldPath {
    fn into_field_path(self) -> FirestoreResult<FieldPath> {
        Ok(self.clone())
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> FirestoreResult<FieldPath> {
        FieldPath::parse(&self)
    }
}

impl<'a> IntoFieldPath for &'a str {
    fn into_field_path(self) -> FirestoreResult<FieldPath> {
        FieldPath::parse(self)
    }
}
