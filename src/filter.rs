//! Line filters.
//!
//! Every filter implements [`Filter::accept`]. Filters are shared read-only
//! between the caller and the interceptor, so they must be `Send + Sync`.

use crate::error::Result;
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::Arc;

/// Decides whether a raw line is kept.
pub trait Filter: Send + Sync {
    /// Returns `true` if `line` should be captured.
    fn accept(&self, line: &str) -> bool;
}

impl<F: Filter + ?Sized> Filter for Arc<F> {
    fn accept(&self, line: &str) -> bool {
        (**self).accept(line)
    }
}

impl<F: Filter + ?Sized> Filter for Box<F> {
    fn accept(&self, line: &str) -> bool {
        (**self).accept(line)
    }
}

/// Apply top-level filters with implicit AND. An empty list accepts every line.
pub fn accept_all(filters: &[Arc<dyn Filter>], line: &str) -> bool {
    filters.iter().all(|f| f.accept(line))
}

/// Whether a pattern match keeps or drops the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Keep only matching lines.
    #[default]
    Whitelist,
    /// Drop matching lines.
    Blacklist,
}

/// Regular-expression filter.
///
/// The pattern is searched anywhere in the line, not anchored.
///
/// # Examples
///
/// ```
/// use logtap::{Filter, FilterMode, PatternFilter};
///
/// let errors = PatternFilter::whitelist("ERROR").unwrap();
/// assert!(errors.accept("ERROR: disk full\n"));
/// assert!(!errors.accept("INFO: ok\n"));
///
/// let no_debug = PatternFilter::new("debug", FilterMode::Blacklist, false).unwrap();
/// assert!(!no_debug.accept("DEBUG: noise"));
/// ```
#[derive(Debug, Clone)]
pub struct PatternFilter {
    regex: Regex,
    mode: FilterMode,
}

impl PatternFilter {
    /// Compile `pattern` once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`](crate::Error::Pattern) if the pattern is
    /// not a valid regular expression.
    pub fn new(pattern: &str, mode: FilterMode, case_sensitive: bool) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(PatternFilter { regex, mode })
    }

    /// Case-sensitive whitelist filter.
    pub fn whitelist(pattern: &str) -> Result<Self> {
        Self::new(pattern, FilterMode::Whitelist, true)
    }

    /// Case-sensitive blacklist filter.
    pub fn blacklist(pattern: &str) -> Result<Self> {
        Self::new(pattern, FilterMode::Blacklist, true)
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }
}

impl Filter for PatternFilter {
    fn accept(&self, line: &str) -> bool {
        let matches = self.regex.is_match(line);
        match self.mode {
            FilterMode::Whitelist => matches,
            FilterMode::Blacklist => !matches,
        }
    }
}

/// Filter backed by a caller-supplied function.
///
/// A panic inside the predicate is not caught. It unwinds out of the
/// filtering step to whoever is processing the change.
pub struct PredicateFilter<F> {
    predicate: F,
}

impl<F> PredicateFilter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        PredicateFilter { predicate }
    }
}

impl<F> fmt::Debug for PredicateFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateFilter").finish_non_exhaustive()
    }
}

impl<F> Filter for PredicateFilter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accept(&self, line: &str) -> bool {
        (self.predicate)(line)
    }
}

/// How a [`CompositeFilter`] combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

/// Boolean combination of other filters, evaluated in order with
/// short-circuiting.
///
/// With no children, `And` accepts everything and `Or` accepts nothing.
///
/// # Examples
///
/// ```
/// use logtap::{CompositeFilter, Filter, PatternFilter};
/// use std::sync::Arc;
///
/// let alerts = CompositeFilter::any(vec![
///     Arc::new(PatternFilter::whitelist("ERROR").unwrap()),
///     Arc::new(PatternFilter::whitelist("WARN").unwrap()),
/// ]);
/// assert!(alerts.accept("WARN: low memory"));
/// assert!(!alerts.accept("INFO: started"));
///
/// assert!(CompositeFilter::all(Vec::new()).accept("anything"));
/// assert!(!CompositeFilter::any(Vec::new()).accept("anything"));
/// ```
pub struct CompositeFilter {
    filters: Vec<Arc<dyn Filter>>,
    combinator: Combinator,
}

impl CompositeFilter {
    pub fn new(filters: Vec<Arc<dyn Filter>>, combinator: Combinator) -> Self {
        CompositeFilter {
            filters,
            combinator,
        }
    }

    /// Accept a line only if every child accepts it.
    pub fn all(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self::new(filters, Combinator::And)
    }

    /// Accept a line if at least one child accepts it.
    pub fn any(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self::new(filters, Combinator::Or)
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for CompositeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("combinator", &self.combinator)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl Filter for CompositeFilter {
    fn accept(&self, line: &str) -> bool {
        match self.combinator {
            Combinator::And => self.filters.iter().all(|f| f.accept(line)),
            Combinator::Or => self.filters.iter().any(|f| f.accept(line)),
        }
    }
}
