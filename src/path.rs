//! Path template matching.
//!
//! Two template dialects are supported. API templates use bracketed
//! placeholders (`/users/{id}`) and are compiled to an anchored regex where a
//! placeholder matches one or more non-slash characters. Frontend route
//! patterns mark parameter segments with a leading `$` (`/users/$id`) and are
//! compared segment by segment.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}").expect("placeholder regex is valid"));

const SEGMENT_WILDCARD: &str = "[^/]+";
const ROUTE_PARAM_SIGIL: char = '$';

/// Compiled matcher for an API path template.
#[derive(Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    placeholders: usize,
}

impl PathPattern {
    /// Compiles a template such as `/users/{id}/orders`.
    ///
    /// Literal text is escaped, so characters like `.` only match themselves.
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let mut pattern = String::with_capacity(template.len() + 8);
        pattern.push('^');
        let mut last = 0;
        let mut placeholders = 0;
        for found in PLACEHOLDER.find_iter(&template) {
            pattern.push_str(&regex::escape(&template[last..found.start()]));
            pattern.push_str(SEGMENT_WILDCARD);
            last = found.end();
            placeholders += 1;
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push('$');

        // Literals are escaped and the wildcard is fixed.
        let regex = Regex::new(&pattern).expect("escaped path template is a valid regex");
        Self {
            template,
            regex,
            placeholders,
        }
    }

    /// Returns true when `path` matches the whole template.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Original template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Number of `{...}` placeholders in the template.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathPattern")
            .field("template", &self.template)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for PathPattern {}

/// One-shot form of [`PathPattern::matches`].
pub fn match_path(url: &str, template: &str) -> bool {
    PathPattern::new(template).matches(url)
}

/// Matches a concrete route against a `$param` route pattern.
///
/// Empty segments are ignored on both sides, segment counts must be equal and
/// every non-parameter segment must be equal to the route segment at the same
/// position.
pub fn match_route_pattern(path: &str, pattern: &str) -> bool {
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();

    if path_segments.len() != pattern_segments.len() {
        return false;
    }

    pattern_segments
        .iter()
        .zip(&path_segments)
        .all(|(segment, actual)| segment.starts_with(ROUTE_PARAM_SIGIL) || segment == actual)
}
