/*!
 * JSON-pointer style paths addressing params and their elements.
 *
 * A path such as `/audio/channels/3/gain` is split into name segments, index
 * segments and the one-past-the-end marker `-`. `~0` and `~1` escape `~` and
 * `/` inside names.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

/// One segment of a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A named field or top-level oid
    Name(String),
    /// An array index
    Index(usize),
    /// One past the end of an array (`-`)
    Append,
}

/// A parsed path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Parse a path
    ///
    /// The empty string is the empty path. Anything else must start with `/`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| DeviceError::invalid_argument(format!("'{}' is not a valid path", s)))?;

        let segments = rest
            .split('/')
            .map(|raw| parse_segment(raw).ok_or_else(|| invalid(s)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { segments })
    }

    /// All segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path has no segments
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment as a name, with the remaining segments
    pub fn split_name(&self) -> Option<(&str, &[Segment])> {
        match self.segments.split_first() {
            Some((Segment::Name(name), rest)) => Some((name.as_str(), rest)),
            _ => None,
        }
    }

    /// Whether `prefix` addresses this path or one of its ancestors
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Whether the last segment is the append marker `-`
    pub fn is_append(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Append))
    }
}

fn invalid(s: &str) -> DeviceError {
    DeviceError::invalid_argument(format!("'{}' is not a valid path", s))
}

fn parse_segment(raw: &str) -> Option<Segment> {
    if raw == "-" {
        return Some(Segment::Append);
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse().ok().map(Segment::Index);
    }
    let name = unescape(raw)?;
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return None,
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '~') {
        Some(Segment::Name(name))
    } else {
        None
    }
}

/// Undo `~0` / `~1` escaping; a `~` followed by anything else is invalid
fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn escape(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(name) => f.write_str(&escape(name)),
            Segment::Index(i) => write!(f, "{}", i),
            Segment::Append => f.write_str("-"),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = DeviceError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_segments() {
        let path = Path::parse("/audio/channels/3/-").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Name("audio".to_string()),
                Segment::Name("channels".to_string()),
                Segment::Index(3),
                Segment::Append,
            ]
        );
        assert_eq!(path.to_string(), "/audio/channels/3/-");
    }

    #[test]
    fn test_empty_path() {
        let path = Path::parse("").unwrap();
        assert!(path.is_empty());
        assert_eq!(path.to_string(), "");
    }

    #[test]
    fn test_invalid_paths() {
        for bad in ["a_number", "/", "//x", "/3abc", "/a-b", "/x~2", "/a/"] {
            let err = Path::parse(bad).unwrap_err();
            assert!(matches!(err, DeviceError::InvalidArgument(_)), "{}", bad);
        }
    }

    #[test]
    fn test_escapes() {
        let path = Path::parse("/a~0b~1c").unwrap();
        assert_eq!(path.segments(), &[Segment::Name("a~b/c".to_string())]);
        assert_eq!(path.to_string(), "/a~0b~1c");
    }

    #[test]
    fn test_split_name() {
        let path = Path::parse("/a_number/2").unwrap();
        let (name, rest) = path.split_name().unwrap();
        assert_eq!(name, "a_number");
        assert_eq!(rest, &[Segment::Index(2)]);
        assert!(Path::parse("/2").unwrap().split_name().is_none());
    }

    #[test]
    fn test_ancestry() {
        let location = Path::parse("/location").unwrap();
        let alt = Path::parse("/location/alt").unwrap();
        assert!(alt.starts_with(&location));
        assert!(location.starts_with(&location));
        assert!(!location.starts_with(&alt));
        assert!(!Path::parse("/locations").unwrap().starts_with(&location));

        assert!(Path::parse("/levels/-").unwrap().is_append());
        assert!(!Path::parse("/levels/0").unwrap().is_append());
    }
}
