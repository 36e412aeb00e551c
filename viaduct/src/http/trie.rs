//! The prefix tree behind the router.
//!
//! Patterns are compiled to segment sequences and stored in a [`PathTrie`
//! ](struct.PathTrie.html) whose nodes live in an arena indexed by
//! position, so children refer to each other without ownership cycles.
//! Lookup walks the tree segment by segment with the priority literal >
//! parameter > wildcard > tail, optionally backtracking into dynamic
//! branches when a literal branch under-matches.

use crate::{http::path::NormalizedPath, Error};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

// --- Pattern ---------------------------------------------------------------

/// One compiled segment of a route pattern.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PatternSegment {
    /// Matches one segment byte-for-byte, case sensitive.
    Literal(String),

    /// Matches exactly one segment and captures it under the name.
    Parameter(String),

    /// Matches exactly one segment without capturing.
    Wildcard,

    /// Matches zero or more trailing segments.  With a name, the joined
    /// remainder is captured as a single value.  Only valid last.
    Tail(Option<String>),
}

/// A route pattern as an ordered sequence of [`PatternSegment`
/// ](enum.PatternSegment.html).
///
/// The wire syntax is `/`-separated segments where `:name` is a parameter,
/// `*` a wildcard, `**` an anonymous tail, and `**:name` a capturing tail.
/// Anything else is a literal.  `name` is an identifier: letters, digits,
/// and `_`, not starting with a digit.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pattern {
    segments: Vec<PatternSegment>,
}

fn identifier() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

impl Pattern {
    /// The empty pattern, matching only the root path.
    ///
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Compile the wire syntax.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidPattern` for a tail that is not the last segment, a
    /// malformed parameter or tail name, a repeated parameter name, or a
    /// literal containing `:` or `*`.
    ///
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut segments: Vec<PatternSegment> = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        for piece in raw.split('/').filter(|p| !p.is_empty()) {
            if matches!(segments.last(), Some(PatternSegment::Tail(_))) {
                return Err(Error::invalid_pattern(format!(
                    "'{}': tail must be the last segment",
                    raw,
                )));
            }
            if piece == "." || piece == ".." {
                return Err(Error::invalid_pattern(format!(
                    "'{}': dot segments are not allowed in patterns",
                    raw,
                )));
            }
            if piece == "*" {
                segments.push(PatternSegment::Wildcard);
            } else if piece == "**" {
                segments.push(PatternSegment::Tail(None));
            } else if let Some(name) = piece.strip_prefix("**:") {
                Self::check_name(raw, name, &mut names)?;
                segments
                    .push(PatternSegment::Tail(Some(name.to_string())));
            } else if let Some(name) = piece.strip_prefix(':') {
                Self::check_name(raw, name, &mut names)?;
                segments
                    .push(PatternSegment::Parameter(name.to_string()));
            } else if piece.contains(':') || piece.contains('*') {
                return Err(Error::invalid_pattern(format!(
                    "'{}': ':' and '*' only start a segment",
                    raw,
                )));
            } else {
                segments.push(PatternSegment::Literal(piece.to_string()));
            }
        }
        Ok(Self { segments })
    }

    /// The compiled segments in order.
    ///
    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    /// `true` iff every segment is a literal.
    ///
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, PatternSegment::Literal(_)))
    }

    /// A new pattern with `self`'s segments followed by `other`'s.
    ///
    pub fn concat(&self, other: &Pattern) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// `true` iff `prefix`'s segments equal `self`'s leading segments.
    ///
    pub fn starts_with(&self, prefix: &Pattern) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    pub(crate) fn from_segments(segments: Vec<PatternSegment>) -> Self {
        Self { segments }
    }

    fn check_name<'a>(
        raw: &str,
        name: &'a str,
        taken: &mut Vec<&'a str>,
    ) -> Result<(), Error> {
        if !identifier().is_match(name) {
            return Err(Error::invalid_pattern(format!(
                "'{}': '{}' is not an identifier",
                raw, name,
            )));
        }
        if taken.contains(&name) {
            return Err(Error::invalid_pattern(format!(
                "'{}': parameter name '{}' is used more than once",
                raw, name,
            )));
        }
        taken.push(name);
        Ok(())
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for seg in &self.segments {
            match seg {
                PatternSegment::Literal(s) => write!(f, "/{}", s)?,
                PatternSegment::Parameter(n) => write!(f, "/:{}", n)?,
                PatternSegment::Wildcard => write!(f, "/*")?,
                PatternSegment::Tail(None) => write!(f, "/**")?,
                PatternSegment::Tail(Some(n)) => write!(f, "/**:{}", n)?,
            }
        }
        Ok(())
    }
}

// --- PathTrie --------------------------------------------------------------

/// A successful lookup.
///
/// `remaining` is empty except for tail matches, where it holds the suffix
/// the tail consumed and `matched` the prefix up to the tail's node.
///
#[derive(Debug)]
pub struct TrieMatch<'t, V> {
    pub value: &'t V,
    pub parameters: HashMap<String, String>,
    pub matched: NormalizedPath,
    pub remaining: NormalizedPath,
}

#[derive(Debug)]
struct TrieNode<V> {
    value: Option<V>,
    // BTreeMap so that entries() is deterministic.
    literals: BTreeMap<String, usize>,
    parameter: Option<(String, usize)>,
    wildcard: Option<usize>,
    // Terminal by construction, a tail never has children.
    tail: Option<(Option<String>, V)>,
}

impl<V> TrieNode<V> {
    fn new() -> Self {
        Self {
            value: None,
            literals: BTreeMap::new(),
            parameter: None,
            wildcard: None,
            tail: None,
        }
    }
}

// Where in the arena a pattern terminates.
enum Target {
    Node(usize),
    Tail(usize, Option<String>),
}

// A tail seen during lookup, with the captures accumulated on the way
// there.  The deepest one wins.
struct TailHit {
    node: usize,
    depth: usize,
    captures: Vec<(String, String)>,
}

/// A prefix tree from path patterns to values, generic over the value.
///
/// Nodes are stored in an arena `Vec` and reference each other by index.
/// The tree is meant to be built up front and read concurrently afterwards;
/// lookups take `&self`.
///
#[derive(Debug)]
pub struct PathTrie<V> {
    nodes: Vec<TrieNode<V>>,
}

impl<V> PathTrie<V> {
    /// An empty trie.
    ///
    pub fn new() -> Self {
        Self { nodes: vec![TrieNode::new()] }
    }

    /// `true` iff no value was ever inserted.
    ///
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
            && self.nodes[0].value.is_none()
            && self.nodes[0].tail.is_none()
    }

    /// Associate `value` with `pattern`.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::DuplicateRoute` if the pattern already has a value, and
    /// `Error::ParameterNameConflict` if a parameter or capturing tail at
    /// the same position was registered under a different name.
    ///
    pub fn insert(
        &mut self,
        pattern: &Pattern,
        value: V,
    ) -> Result<(), Error> {
        match self.make_path(pattern)? {
            Target::Node(ix) => {
                if self.nodes[ix].value.is_some() {
                    return Err(Error::duplicate_route(pattern));
                }
                self.nodes[ix].value = Some(value);
            }
            Target::Tail(ix, name) => {
                if self.nodes[ix].tail.is_some() {
                    return Err(Error::duplicate_route(pattern));
                }
                self.nodes[ix].tail = Some((name, value));
            }
        }
        Ok(())
    }

    /// The value at exactly `pattern`, creating it with `default` if the
    /// pattern is new.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::ParameterNameConflict` as for [`insert()`](#method.insert).
    ///
    pub fn value_or_insert_with(
        &mut self,
        pattern: &Pattern,
        default: impl FnOnce() -> V,
    ) -> Result<&mut V, Error> {
        match self.make_path(pattern)? {
            Target::Node(ix) => {
                let node = &mut self.nodes[ix];
                if node.value.is_none() {
                    node.value = Some(default());
                }
                Ok(node.value.as_mut().unwrap())
            }
            Target::Tail(ix, name) => {
                let node = &mut self.nodes[ix];
                match &mut node.tail {
                    Some((stored, value)) => {
                        if *stored != name {
                            return Err(Error::parameter_name_conflict(
                                format!(
                                    "'{}': tail already registered with a \
                                     different capture",
                                    pattern,
                                ),
                            ));
                        }
                        Ok(value)
                    }
                    slot @ None => {
                        *slot = Some((name, default()));
                        Ok(&mut slot.as_mut().unwrap().1)
                    }
                }
            }
        }
    }

    /// Match `path` against the tree.
    ///
    /// Child selection per segment prefers a literal over the parameter
    /// child over the wildcard child; a tail anywhere along the walk is a
    /// last-resort candidate and the deepest one wins.  With `backtrack`
    /// the walk unwinds into lower-priority branches when a higher-priority
    /// branch fails further down; without it, each step commits to the
    /// first applicable child.
    ///
    pub fn find(
        &self,
        path: &NormalizedPath,
        backtrack: bool,
    ) -> Option<TrieMatch<V>> {
        let segs = path.segments();
        let mut captures: Vec<(String, String)> = Vec::new();
        let mut best_tail: Option<TailHit> = None;
        if let Some(end) = self.descend(
            0,
            segs,
            0,
            &mut captures,
            backtrack,
            &mut best_tail,
        ) {
            return Some(TrieMatch {
                value: self.nodes[end].value.as_ref()?,
                parameters: captures.into_iter().collect(),
                matched: path.clone(),
                remaining: NormalizedPath::root(),
            });
        }
        let hit = best_tail?;
        let (name, value) = self.nodes[hit.node].tail.as_ref()?;
        let mut parameters: HashMap<String, String> =
            hit.captures.into_iter().collect();
        let remaining = segs[hit.depth..].to_vec();
        if let Some(name) = name {
            parameters.insert(name.clone(), remaining.join("/"));
        }
        Some(TrieMatch {
            value,
            parameters,
            matched: NormalizedPath::from_segments(
                segs[..hit.depth].to_vec(),
            ),
            remaining: NormalizedPath::from_segments(remaining),
        })
    }

    /// All `(pattern, value)` pairs in deterministic order.
    ///
    pub fn entries(&self) -> Vec<(Pattern, &V)> {
        let mut out = Vec::new();
        self.collect(0, &mut Vec::new(), &mut out);
        out
    }

    /// Splice every entry of `other` below the literal-only `prefix`.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidPattern` if `prefix` is not literal-only, otherwise
    /// as for [`insert()`](#method.insert) per rebased entry.
    ///
    pub fn graft(
        &mut self,
        prefix: &Pattern,
        other: PathTrie<V>,
    ) -> Result<(), Error> {
        for (pattern, value) in other.into_entries_under(prefix)? {
            self.insert(&pattern, value)?;
        }
        Ok(())
    }

    /// Consume the trie into `(pattern, value)` pairs rebased under the
    /// literal-only `prefix`.
    ///
    pub(crate) fn into_entries_under(
        mut self,
        prefix: &Pattern,
    ) -> Result<Vec<(Pattern, V)>, Error> {
        if !prefix.is_literal() {
            return Err(Error::invalid_pattern(format!(
                "'{}': mount prefix must be literal",
                prefix,
            )));
        }
        let mut out = Vec::new();
        self.drain(0, &mut prefix.segments().to_vec(), &mut out);
        Ok(out)
    }

    // - - private - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    fn make_path(&mut self, pattern: &Pattern) -> Result<Target, Error> {
        let mut node = 0;
        for seg in pattern.segments() {
            node = match seg {
                PatternSegment::Literal(s) => {
                    match self.nodes[node].literals.get(s) {
                        Some(child) => *child,
                        None => {
                            let child = self.push_node();
                            self.nodes[node]
                                .literals
                                .insert(s.clone(), child);
                            child
                        }
                    }
                }
                PatternSegment::Parameter(name) => {
                    match &self.nodes[node].parameter {
                        Some((stored, child)) => {
                            if stored != name {
                                return Err(
                                    Error::parameter_name_conflict(format!(
                                        "'{}': parameter ':{}' already \
                                         registered as ':{}'",
                                        pattern, name, stored,
                                    )),
                                );
                            }
                            *child
                        }
                        None => {
                            let child = self.push_node();
                            self.nodes[node].parameter =
                                Some((name.clone(), child));
                            child
                        }
                    }
                }
                PatternSegment::Wildcard => {
                    match self.nodes[node].wildcard {
                        Some(child) => child,
                        None => {
                            let child = self.push_node();
                            self.nodes[node].wildcard = Some(child);
                            child
                        }
                    }
                }
                PatternSegment::Tail(name) => {
                    return Ok(Target::Tail(node, name.clone()));
                }
            };
        }
        Ok(Target::Node(node))
    }

    fn push_node(&mut self) -> usize {
        self.nodes.push(TrieNode::new());
        self.nodes.len() - 1
    }

    fn descend(
        &self,
        node: usize,
        segs: &[String],
        idx: usize,
        captures: &mut Vec<(String, String)>,
        backtrack: bool,
        best_tail: &mut Option<TailHit>,
    ) -> Option<usize> {
        let n = &self.nodes[node];
        if n.tail.is_some()
            && best_tail.as_ref().map(|t| idx > t.depth).unwrap_or(true)
        {
            *best_tail = Some(TailHit {
                node,
                depth: idx,
                captures: captures.clone(),
            });
        }
        if idx == segs.len() {
            return n.value.is_some().then_some(node);
        }
        let seg = &segs[idx];
        if let Some(child) = n.literals.get(seg) {
            if let Some(end) = self.descend(
                *child,
                segs,
                idx + 1,
                captures,
                backtrack,
                best_tail,
            ) {
                return Some(end);
            }
            if !backtrack {
                return None;
            }
        }
        if let Some((name, child)) = &n.parameter {
            captures.push((name.clone(), seg.clone()));
            if let Some(end) = self.descend(
                *child,
                segs,
                idx + 1,
                captures,
                backtrack,
                best_tail,
            ) {
                return Some(end);
            }
            captures.pop();
            if !backtrack {
                return None;
            }
        }
        if let Some(child) = n.wildcard {
            return self.descend(
                child,
                segs,
                idx + 1,
                captures,
                backtrack,
                best_tail,
            );
        }
        None
    }

    fn collect<'t>(
        &'t self,
        node: usize,
        prefix: &mut Vec<PatternSegment>,
        out: &mut Vec<(Pattern, &'t V)>,
    ) {
        let n = &self.nodes[node];
        if let Some(value) = &n.value {
            out.push((Pattern::from_segments(prefix.clone()), value));
        }
        if let Some((name, value)) = &n.tail {
            let mut segs = prefix.clone();
            segs.push(PatternSegment::Tail(name.clone()));
            out.push((Pattern::from_segments(segs), value));
        }
        for (lit, child) in &n.literals {
            prefix.push(PatternSegment::Literal(lit.clone()));
            self.collect(*child, prefix, out);
            prefix.pop();
        }
        if let Some((name, child)) = n.parameter.clone() {
            prefix.push(PatternSegment::Parameter(name));
            self.collect(child, prefix, out);
            prefix.pop();
        }
        if let Some(child) = n.wildcard {
            prefix.push(PatternSegment::Wildcard);
            self.collect(child, prefix, out);
            prefix.pop();
        }
    }

    fn drain(
        &mut self,
        node: usize,
        prefix: &mut Vec<PatternSegment>,
        out: &mut Vec<(Pattern, V)>,
    ) {
        if let Some(value) = self.nodes[node].value.take() {
            out.push((Pattern::from_segments(prefix.clone()), value));
        }
        if let Some((name, value)) = self.nodes[node].tail.take() {
            let mut segs = prefix.clone();
            segs.push(PatternSegment::Tail(name));
            out.push((Pattern::from_segments(segs), value));
        }
        let literals: Vec<(String, usize)> = self.nodes[node]
            .literals
            .iter()
            .map(|(s, c)| (s.clone(), *c))
            .collect();
        for (lit, child) in literals {
            prefix.push(PatternSegment::Literal(lit));
            self.drain(child, prefix, out);
            prefix.pop();
        }
        if let Some((name, child)) = self.nodes[node].parameter.clone() {
            prefix.push(PatternSegment::Parameter(name));
            self.drain(child, prefix, out);
            prefix.pop();
        }
        if let Some(child) = self.nodes[node].wildcard {
            prefix.push(PatternSegment::Wildcard);
            self.drain(child, prefix, out);
            prefix.pop();
        }
    }
}

impl<V> Default for PathTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}
