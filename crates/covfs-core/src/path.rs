//! Logical paths and the separator-normalizing join algebra (spec §3, §4.1).

use crate::error::{Error, Result};
use std::fmt;

/// A forward-slash-rooted, `..`-free logical path naming an entry in the
/// fused view.
///
/// Construction is the only place the `..`-free invariant is enforced;
/// every other operation on a `LogicalPath` preserves it by constructiong
/// only from already-validated segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalPath(String);

impl LogicalPath {
    /// Parse a client-supplied logical path. Rejects any segment beginning
    /// with `..`. The result always starts with `/`; a bare `/` denotes the
    /// fused root.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut out = String::from("/");
        append_segments(&mut out, raw)?;
        Ok(LogicalPath(out))
    }

    /// The fused root, `/`.
    pub fn root() -> Self {
        LogicalPath("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the logical path of a child entry under this (directory) path.
    pub fn join(&self, child: &str) -> Result<Self> {
        let mut out = self.0.clone();
        append_segments(&mut out, child)?;
        Ok(LogicalPath(out))
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append every `/`-delimited segment of `raw` onto `out`, normalizing
/// separators at the junction and rejecting any segment beginning with `..`.
fn append_segments(out: &mut String, raw: &str) -> Result<()> {
    for seg in raw.split('/') {
        if seg.is_empty() {
            continue;
        }
        if seg.starts_with("..") {
            return Err(Error::InvalidPath(seg.to_string()));
        }
        join_one(out, seg);
    }
    Ok(())
}

/// The single two-sided join helper described in spec §4.1: if the left
/// side ends with the separator and the right begins with one, one is
/// stripped; if neither side has one at the junction, one is inserted.
/// Used for every physical path construction so callers never have to
/// reason about trailing separators.
pub fn join_one(out: &mut String, seg: &str) {
    let left_has_sep = out.ends_with('/');
    let right_has_sep = seg.starts_with('/');
    match (left_has_sep, right_has_sep) {
        (true, true) => out.push_str(&seg[1..]),
        (true, false) | (false, true) => out.push_str(seg),
        (false, false) => {
            out.push('/');
            out.push_str(seg);
        }
    }
}

/// Join an ordered list of raw (untrusted) segments using [`join_one`],
/// validating each `/`-delimited component against the `..`-prefix rule.
/// This is the general-purpose entry point `source_of`/`overlay_of` build
/// physical paths with — the root segment (an operator-supplied,
/// already-trusted filesystem path) is taken verbatim, and every
/// subsequent segment is validated the same way `LogicalPath::parse` does.
pub fn join_segments(root: &str, segments: &[&str]) -> Result<String> {
    let mut out = root.to_string();
    for seg in segments {
        append_segments(&mut out, seg)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_and_roots() {
        let p = LogicalPath::parse("a/b/c").unwrap();
        assert_eq!(p.as_str(), "/a/b/c");

        let p = LogicalPath::parse("/a/b/c/").unwrap();
        assert_eq!(p.as_str(), "/a/b/c");

        let p = LogicalPath::parse("").unwrap();
        assert!(p.is_root());
    }

    #[test]
    fn parse_rejects_dotdot_segment() {
        assert!(matches!(
            LogicalPath::parse("/a/../b"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            LogicalPath::parse("..secret"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn join_appends_child() {
        let dir = LogicalPath::parse("/d").unwrap();
        let child = dir.join("x").unwrap();
        assert_eq!(child.as_str(), "/d/x");
    }

    #[test]
    fn join_segments_normalizes_separator_junctions() {
        assert_eq!(join_segments("/root/", &["/mirror/"]).unwrap(), "/root/mirror");
        assert_eq!(join_segments("/root", &["mirror"]).unwrap(), "/root/mirror");
        assert_eq!(join_segments("/root/", &["mirror"]).unwrap(), "/root/mirror");
    }

    #[test]
    fn join_segments_rejects_dotdot() {
        assert!(join_segments("/root", &["../escape"]).is_err());
    }
}
