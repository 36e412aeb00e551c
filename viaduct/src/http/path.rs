//! Canonical request paths.
//!
//! A raw request path is turned into a [`NormalizedPath`
//! ](struct.NormalizedPath.html) exactly once per request, at the routing
//! boundary, and everything downstream works on segments.

use crate::Error;
use std::fmt::{self, Display, Formatter};

// --- NormalizedPath --------------------------------------------------------

/// A root-relative path as an ordered sequence of non-empty segments.
///
/// Invariants: no segment is empty, no segment is `.` or `..`, and no
/// segment contains `/` or NUL.  The empty sequence is the root `/`.
///
/// Equality and hashing are by segment sequence, so `"/a//b/"`, `"a/b"` and
/// `"/a/./b"` all normalize to the same value.
///
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct NormalizedPath {
    segments: Vec<String>,
}

impl NormalizedPath {
    /// The canonical root path `/`.
    ///
    pub fn root() -> Self {
        Self::default()
    }

    /// Normalize a raw, already percent-decoded path.
    ///
    /// Rules, in order: split on `/`; drop empty pieces from leading,
    /// trailing, or repeated separators; drop `.` pieces; on `..` pop the
    /// last accumulated segment.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidPath` if the path contains NUL bytes or a `..` would
    /// traverse above the root.  Percent-decoding failures are the caller's
    /// to report, normalization never decodes.
    ///
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.contains('\0') {
            return Err(Error::invalid_path("NUL byte in path"));
        }
        let mut segments: Vec<String> = Vec::new();
        for piece in raw.split('/') {
            match piece {
                "" | "." => (),
                ".." => {
                    if segments.pop().is_none() {
                        return Err(Error::invalid_path(format!(
                            "'{}' traverses above the root",
                            raw,
                        )));
                    }
                }
                seg => segments.push(seg.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// `true` iff this is the root path.
    ///
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The number of segments.
    ///
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segments in order.
    ///
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// A new path with `other`'s segments appended to `self`'s.
    ///
    pub fn join(&self, other: &NormalizedPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    // Caller guarantees the segment invariants, so this stays crate
    // internal.
    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }
}

impl Display for NormalizedPath {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "/")
        } else {
            for seg in &self.segments {
                write!(f, "/{}", seg)?;
            }
            Ok(())
        }
    }
}
