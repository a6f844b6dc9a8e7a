//! Ordered include/exclude glob filtering over resource paths.

use crate::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// A single rule in a [`FilterList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    /// Matching paths are included
    Include(String),
    /// Matching paths are excluded
    Exclude(String),
}

impl FilterRule {
    fn pattern(&self) -> &str {
        match self {
            Self::Include(p) | Self::Exclude(p) => p,
        }
    }

    /// Parse one token of the documented input shape: an optional `+`/`-`/`!`
    /// prefix (`!` is an alias for `-`; no prefix defaults to `+`) followed by
    /// a glob pattern. Normalizes the shorthand directory forms `foo/`,
    /// `foo/**/`, `foo/**/*` to `foo/**`, and `**/` to the universal `**/*`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for an empty token or a pattern that
    /// fails to compile as a glob.
    pub fn from_token(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::invalid_pattern(token, "empty filter token"));
        }
        let (pattern, rule): (&str, fn(String) -> Self) = match token.split_at(1) {
            ("+", rest) => (rest, Self::Include),
            ("-", rest) => (rest, Self::Exclude),
            ("!", rest) => (rest, Self::Exclude),
            _ => (token, Self::Include),
        };
        if pattern.is_empty() {
            return Err(Error::invalid_pattern(token, "filter token has no pattern after its prefix"));
        }
        let normalized = normalize_shorthand(pattern);
        compile_one(&normalized)?;
        Ok(rule(normalized))
    }
}

/// Normalize the shorthand directory forms documented for `FilterList`
/// tokens: `foo/`, `foo/**/`, and `foo/**/*` all mean "everything under
/// `foo`"; `**/` is an alias for the universal pattern `**/*`.
fn normalize_shorthand(pattern: &str) -> String {
    if pattern == "**/" {
        return "**/*".to_string();
    }
    for suffix in ["/**/*", "/**/"] {
        if let Some(stripped) = pattern.strip_suffix(suffix) {
            return format!("{stripped}/**");
        }
    }
    if let Some(stripped) = pattern.strip_suffix('/') {
        return format!("{stripped}/**");
    }
    pattern.to_string()
}

/// Patterns split into globset-compatible positive/negative groups, used as
/// a fast pre-filter ahead of a directory walk. `requires_post_filtering` is
/// set whenever rule order makes a flat positive/negative split an
/// approximation — i.e. an include appears after an exclude in the original
/// token order, a re-inclusion glob evaluation alone cannot express.
#[derive(Debug, Clone)]
pub struct GlobPatterns {
    /// Patterns that admit a path
    pub positive: Vec<String>,
    /// Patterns that reject a path
    pub negative: Vec<String>,
    /// Whether rule order means the compiled sets are an approximation only,
    /// and sequential [`FilterList::matches`] is the semantic source of
    /// truth
    pub requires_post_filtering: bool,
}

/// An ordered list of include/exclude rules evaluated against resource
/// paths, with a configurable default for paths no rule touches and an
/// optional required file-type suffix set.
pub struct FilterList {
    rules: Vec<FilterRule>,
    match_by_default: bool,
    suffixes: Option<Vec<String>>,
}

impl FilterList {
    /// Construct a filter list from rules in evaluation order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if any rule's glob fails to compile.
    pub fn new(rules: Vec<FilterRule>, match_by_default: bool) -> Result<Self> {
        for rule in &rules {
            compile_one(rule.pattern())?;
        }
        Ok(Self {
            rules,
            match_by_default,
            suffixes: None,
        })
    }

    /// Parse a list of `+pattern`/`-pattern`/`!pattern` tokens (bare tokens
    /// default to `+`) into rules, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for an empty/malformed token or one
    /// whose pattern fails to compile as a glob.
    pub fn from_tokens<I, S>(tokens: I, match_by_default: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = tokens
            .into_iter()
            .map(|t| FilterRule::from_token(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(rules, match_by_default)
    }

    /// Require that, in addition to the rule verdict, a path end with one of
    /// `suffixes` (e.g. `".js"`) to match.
    #[must_use]
    pub fn with_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.suffixes = Some(suffixes);
        self
    }

    /// An empty filter list that matches everything (or nothing, if
    /// `match_by_default` is `false`).
    #[must_use]
    pub fn empty(match_by_default: bool) -> Self {
        Self {
            rules: Vec::new(),
            match_by_default,
            suffixes: None,
        }
    }

    /// The default outcome for a path no rule matches.
    #[must_use]
    pub fn match_by_default(&self) -> bool {
        self.match_by_default
    }

    /// Evaluate all rules against `path` in order: the last matching rule
    /// wins, with no permanent override. If a suffix set is configured, the
    /// path must also end with one of its entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if a rule's glob fails to compile
    /// (rules are validated at construction, so this should not occur for a
    /// `FilterList` built via [`Self::new`]).
    pub fn matches(&self, path: &str) -> Result<bool> {
        let mut result = self.match_by_default;
        for rule in &self.rules {
            let glob = compile_one(rule.pattern())?;
            if !glob.compile_matcher().is_match(path) {
                continue;
            }
            result = matches!(rule, FilterRule::Include(_));
        }
        if result {
            if let Some(suffixes) = &self.suffixes {
                result = suffixes.iter().any(|s| path.ends_with(s.as_str()));
            }
        }
        Ok(result)
    }

    /// Compile the rule set into a positive/negative glob split for use as a
    /// directory-walk pre-filter. Always check [`GlobPatterns::requires_post_filtering`]
    /// and fall back to [`Self::matches`] per candidate when it is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if any rule's glob fails to compile.
    pub fn to_glob_patterns(&self) -> Result<GlobPatterns> {
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        let mut requires_post_filtering = false;
        let mut seen_exclude = false;

        for rule in &self.rules {
            compile_one(rule.pattern())?;
            match rule {
                FilterRule::Include(p) => {
                    positive.push(p.clone());
                    if seen_exclude {
                        requires_post_filtering = true;
                    }
                }
                FilterRule::Exclude(p) => {
                    negative.push(p.clone());
                    seen_exclude = true;
                }
            }
        }

        if self.match_by_default && !negative.is_empty() && !positive.iter().any(|p| p == "**/*") {
            positive.push("**/*".to_string());
        }

        Ok(GlobPatterns {
            positive,
            negative,
            requires_post_filtering,
        })
    }

    /// Compile this list's positive patterns into a single [`GlobSet`] for
    /// bulk matching during a directory walk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if any pattern fails to compile.
    pub fn compiled_positive_set(&self) -> Result<GlobSet> {
        let patterns = self.to_glob_patterns()?;
        build_set(&patterns.positive)
    }

    /// Compile this list's negative patterns into a single [`GlobSet`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if any pattern fails to compile.
    pub fn compiled_negative_set(&self) -> Result<GlobSet> {
        let patterns = self.to_glob_patterns()?;
        build_set(&patterns.negative)
    }
}

fn compile_one(pattern: &str) -> Result<Glob> {
    Glob::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e.to_string()))
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(compile_one(p)?);
    }
    builder
        .build()
        .map_err(|e| Error::invalid_pattern(patterns.join(","), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_true_admits_unmatched_paths() {
        let fl = FilterList::empty(true);
        assert!(fl.matches("/anything").unwrap());
    }

    #[test]
    fn default_false_rejects_unmatched_paths() {
        let fl = FilterList::empty(false);
        assert!(!fl.matches("/anything").unwrap());
    }

    #[test]
    fn later_rule_overrides_earlier() {
        let fl = FilterList::new(
            vec![
                FilterRule::Include("/**/*.js".into()),
                FilterRule::Exclude("/test/**".into()),
            ],
            false,
        )
        .unwrap();
        assert!(fl.matches("/src/app.js").unwrap());
        assert!(!fl.matches("/test/app.js").unwrap());
    }

    #[test]
    fn exclude_is_not_permanent_a_later_include_can_win() {
        let fl = FilterList::new(
            vec![
                FilterRule::Exclude("/vendor/**".into()),
                FilterRule::Include("/**/*.js".into()),
            ],
            false,
        )
        .unwrap();
        assert!(fl.matches("/vendor/lib.js").unwrap());
    }

    #[test]
    fn invalid_pattern_is_rejected_at_construction() {
        let err = FilterList::new(vec![FilterRule::Include("[".into())], true);
        assert!(err.is_err());
    }

    #[test]
    fn to_glob_patterns_flags_reinclusion_after_exclude() {
        let fl = FilterList::new(
            vec![
                FilterRule::Exclude("/vendor/**".into()),
                FilterRule::Include("/vendor/keep.js".into()),
            ],
            true,
        )
        .unwrap();
        let patterns = fl.to_glob_patterns().unwrap();
        assert!(patterns.requires_post_filtering);
    }

    #[test]
    fn to_glob_patterns_without_reinclusion_needs_no_post_filter() {
        let fl = FilterList::new(
            vec![
                FilterRule::Include("/**/*.js".into()),
                FilterRule::Exclude("/test/**".into()),
            ],
            false,
        )
        .unwrap();
        let patterns = fl.to_glob_patterns().unwrap();
        assert!(!patterns.requires_post_filtering);
    }

    #[test]
    fn to_glob_patterns_injects_universal_positive_when_default_true_with_excludes() {
        let fl = FilterList::new(vec![FilterRule::Exclude("/vendor/**".into())], true).unwrap();
        let patterns = fl.to_glob_patterns().unwrap();
        assert!(patterns.positive.iter().any(|p| p == "**/*"));
    }

    #[test]
    fn to_glob_patterns_does_not_inject_universal_without_matching_default() {
        let fl = FilterList::new(vec![FilterRule::Exclude("/vendor/**".into())], false).unwrap();
        let patterns = fl.to_glob_patterns().unwrap();
        assert!(!patterns.positive.iter().any(|p| p == "**/*"));
    }

    #[test]
    fn from_token_parses_prefixes() {
        assert_eq!(FilterRule::from_token("+src/**").unwrap(), FilterRule::Include("src/**".into()));
        assert_eq!(FilterRule::from_token("-src/**").unwrap(), FilterRule::Exclude("src/**".into()));
        assert_eq!(FilterRule::from_token("!src/**").unwrap(), FilterRule::Exclude("src/**".into()));
        assert_eq!(FilterRule::from_token("src/**").unwrap(), FilterRule::Include("src/**".into()));
    }

    #[test]
    fn from_token_normalizes_shorthand_directory_forms() {
        assert_eq!(FilterRule::from_token("+foo/").unwrap(), FilterRule::Include("foo/**".into()));
        assert_eq!(FilterRule::from_token("+foo/**/").unwrap(), FilterRule::Include("foo/**".into()));
        assert_eq!(FilterRule::from_token("+foo/**/*").unwrap(), FilterRule::Include("foo/**".into()));
        assert_eq!(FilterRule::from_token("**/").unwrap(), FilterRule::Include("**/*".into()));
    }

    #[test]
    fn from_token_rejects_empty_token_and_bare_prefix() {
        assert!(FilterRule::from_token("").is_err());
        assert!(FilterRule::from_token("+").is_err());
    }

    #[test]
    fn from_tokens_builds_a_filter_list() {
        let fl = FilterList::from_tokens(["+/**/*.js", "-/test/**"], false).unwrap();
        assert!(fl.matches("/src/app.js").unwrap());
        assert!(!fl.matches("/test/app.js").unwrap());
    }

    #[test]
    fn suffix_filter_must_also_be_satisfied() {
        let fl = FilterList::new(vec![FilterRule::Include("/**/*".into())], false)
            .unwrap()
            .with_suffixes(vec![".js".to_string()]);
        assert!(fl.matches("/src/app.js").unwrap());
        assert!(!fl.matches("/src/app.css").unwrap());
    }

    fn arb_rule() -> impl Strategy<Value = FilterRule> {
        prop_oneof![
            1_u32 => "(/a|/b|/c)(/\\*\\*)?",
        ]
        .prop_flat_map(|pattern| prop_oneof![Just(FilterRule::Include(pattern.clone())), Just(FilterRule::Exclude(pattern))])
    }

    proptest! {
        #[test]
        fn to_glob_patterns_consistent_with_matches_when_no_post_filtering_required(
            rules in proptest::collection::vec(arb_rule(), 0..6),
            match_by_default in any::<bool>(),
            path in "/(a|b|c)(/(a|b|c)){0,2}",
        ) {
            let fl = FilterList::new(rules, match_by_default).unwrap();
            let patterns = fl.to_glob_patterns().unwrap();
            if !patterns.requires_post_filtering {
                let positive = build_set(&patterns.positive).unwrap();
                let negative = build_set(&patterns.negative).unwrap();
                let expected = positive.is_match(&path) && !negative.is_match(&path);
                prop_assert_eq!(fl.matches(&path).unwrap(), expected);
            }
        }
    }
}
