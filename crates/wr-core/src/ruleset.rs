//! Rule sets and compiled URL patterns
//!
//! A pattern is a short token program (byte / wildcard / separator)
//! evaluated against the lowercased request URL. There is no regex
//! engine; matching is a single-pass glob that only ever backtracks to the
//! most recent `*`, so a pattern costs O(url * pattern) at worst.

use crate::error::RuleSetError;
use crate::site::is_third_party;
use crate::types::{Category, PartyMask, ResourceMask, ResourceType, RuleAction};
use crate::url::{get_host_position, is_boundary_char};

// =============================================================================
// Patterns
// =============================================================================

/// Where a pattern is allowed to start matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnchorType {
    /// Anywhere in the URL
    #[default]
    None,
    /// `|` - start of the URL
    Left,
    /// `||` - start of a host label
    Hostname,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Token {
    Byte(u8),
    Wildcard,
    Separator,
}

/// A compiled match pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    tokens: Vec<Token>,
    anchor: AnchorType,
    right_anchor: bool,
    source: String,
}

impl Pattern {
    /// Compile a pattern body (anchors already stripped).
    pub fn new(body: &str, anchor: AnchorType, right_anchor: bool) -> Result<Self, RuleSetError> {
        let body = body.trim();
        let mut tokens = Vec::with_capacity(body.len());

        for b in body.bytes() {
            match b {
                // Collapse runs of wildcards
                b'*' if tokens.last() == Some(&Token::Wildcard) => {}
                b'*' => tokens.push(Token::Wildcard),
                b'^' => tokens.push(Token::Separator),
                b => tokens.push(Token::Byte(b.to_ascii_lowercase())),
            }
        }

        // A trailing wildcard without a right anchor adds nothing
        if !right_anchor && tokens.last() == Some(&Token::Wildcard) {
            tokens.pop();
        }
        if anchor == AnchorType::None && tokens.first() == Some(&Token::Wildcard) {
            tokens.remove(0);
        }

        if tokens.is_empty() {
            return if body.is_empty() {
                Err(RuleSetError::EmptyPattern)
            } else {
                Err(RuleSetError::MatchesEverything(body.to_string()))
            };
        }

        let mut source = String::with_capacity(body.len() + 3);
        match anchor {
            AnchorType::None => {}
            AnchorType::Left => source.push('|'),
            AnchorType::Hostname => source.push_str("||"),
        }
        source.push_str(body);
        if right_anchor {
            source.push('|');
        }

        Ok(Self {
            tokens,
            anchor,
            right_anchor,
            source,
        })
    }

    /// The pattern as written in the rule text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn anchor(&self) -> AnchorType {
        self.anchor
    }

    /// Match against a prepared request.
    pub fn matches(&self, req: &PreparedRequest<'_>) -> bool {
        let s = req.url_lower.as_bytes();
        match self.anchor {
            AnchorType::None => match_tokens(&self.tokens, s, 0, true, self.right_anchor),
            AnchorType::Left => match_tokens(&self.tokens, s, 0, false, self.right_anchor),
            AnchorType::Hostname => {
                let (host_start, host_end) = match req.host {
                    Some(pos) => pos,
                    None => return false,
                };
                std::iter::once(host_start)
                    .chain((host_start..host_end).filter(|&i| s[i] == b'.').map(|i| i + 1))
                    .any(|start| match_tokens(&self.tokens, s, start, false, self.right_anchor))
            }
        }
    }
}

/// Glob match of `tokens` against `s` starting at `start`. A floating match
/// behaves as if the pattern began with `*`.
///
/// Only the position of the last `*` is kept: a later wildcard can absorb
/// anything an earlier one would have, so retrying earlier ones never finds
/// a match the last one misses.
fn match_tokens(tokens: &[Token], s: &[u8], start: usize, floating: bool, right_anchor: bool) -> bool {
    let (mut t, mut i) = (0, start);
    // (token after the last `*`, URL position that `*` currently ends at)
    let mut resume = floating.then_some((0, start));

    loop {
        match tokens.get(t) {
            Some(Token::Wildcard) => {
                t += 1;
                resume = Some((t, i));
                continue;
            }
            Some(Token::Byte(b)) if s.get(i) == Some(b) => {
                t += 1;
                i += 1;
                continue;
            }
            Some(Token::Separator) => match s.get(i) {
                Some(&c) if is_boundary_char(c) => {
                    t += 1;
                    i += 1;
                    continue;
                }
                // Separator also matches the end of the URL
                None => {
                    t += 1;
                    continue;
                }
                Some(_) => {}
            },
            Some(Token::Byte(_)) => {}
            None if !right_anchor || i == s.len() => return true,
            None => {}
        }

        // Mismatch: let the last `*` swallow one more byte
        match resume {
            Some((rt, ri)) if ri < s.len() => {
                resume = Some((rt, ri + 1));
                t = rt;
                i = ri + 1;
            }
            _ => return false,
        }
    }
}

// =============================================================================
// Prepared Request
// =============================================================================

/// A request URL lowercased once and annotated for matching.
#[derive(Debug, Clone)]
pub struct PreparedRequest<'a> {
    url_lower: String,
    host: Option<(usize, usize)>,
    resource_type: ResourceType,
    third_party: bool,
    site_host: &'a str,
}

impl<'a> PreparedRequest<'a> {
    /// Prepare a request. `site_host` is the host of the top-level document
    /// (empty when unknown).
    pub fn new(url: &str, resource_type: ResourceType, site_host: &'a str) -> Self {
        let url_lower = url.trim().to_ascii_lowercase();
        let host = get_host_position(&url_lower);
        let third_party = match host {
            Some((start, end)) => is_third_party(site_host, &url_lower[start..end]),
            None => false,
        };
        Self {
            url_lower,
            host,
            resource_type,
            third_party,
            site_host,
        }
    }

    pub fn url(&self) -> &str {
        &self.url_lower
    }

    pub fn host(&self) -> Option<&str> {
        self.host.map(|(start, end)| &self.url_lower[start..end])
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn is_third_party(&self) -> bool {
        self.third_party
    }

    pub fn site_host(&self) -> &str {
        self.site_host
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A single pattern with its type and party constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub pattern: Pattern,
    pub resources: ResourceMask,
    pub party: PartyMask,
}

impl Rule {
    /// A rule that applies to every resource type and party.
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            resources: ResourceMask::ALL,
            party: PartyMask::ALL,
        }
    }

    /// Check type and party constraints, then the pattern.
    #[inline]
    pub fn matches(&self, req: &PreparedRequest<'_>) -> bool {
        if !self.resources.intersects(req.resource_type.mask()) {
            return false;
        }
        let party = if req.third_party {
            PartyMask::THIRD_PARTY
        } else {
            PartyMask::FIRST_PARTY
        };
        if !self.party.intersects(party) {
            return false;
        }
        self.pattern.matches(req)
    }
}

// =============================================================================
// Rule Sets
// =============================================================================

/// An immutable, loaded collection of rules tagged with a category and
/// priority.
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    category: Category,
    priority: i32,
    action: RuleAction,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a rule set. Fails when `rules` is empty.
    pub fn new(
        name: impl Into<String>,
        category: Category,
        priority: i32,
        action: RuleAction,
        rules: Vec<Rule>,
    ) -> Result<Self, RuleSetError> {
        let name = name.into();
        if rules.is_empty() {
            return Err(RuleSetError::NoRules(name));
        }
        Ok(Self {
            name,
            category,
            priority,
            action,
            rules,
        })
    }

    /// Build a block set from plain substring patterns.
    pub fn from_patterns<I, S>(
        name: impl Into<String>,
        category: Category,
        priority: i32,
        patterns: I,
    ) -> Result<Self, RuleSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| Pattern::new(p.as_ref(), AnchorType::None, false).map(Rule::new))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, category, priority, RuleAction::Block, rules)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn action(&self) -> RuleAction {
        self.action
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule (in load order) matching the request.
    pub fn first_match(&self, req: &PreparedRequest<'_>) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(url: &str) -> PreparedRequest<'static> {
        PreparedRequest::new(url, ResourceType::Script, "example.com")
    }

    fn pat(body: &str, anchor: AnchorType) -> Pattern {
        Pattern::new(body, anchor, false).expect("pattern should compile")
    }

    #[test]
    fn test_substring_pattern() {
        let p = pat("ad_script", AnchorType::None);
        assert!(p.matches(&req("http://localhost/ad_script01.js")));
        assert!(p.matches(&req("http://localhost/AD_SCRIPT01.js")));
        assert!(!p.matches(&req("http://localhost/script01.js")));
    }

    #[test]
    fn test_wildcard_and_separator() {
        let p = pat("/banner/*/img^", AnchorType::None);
        assert!(p.matches(&req("http://example.com/banner/foo/img?x=1")));
        assert!(p.matches(&req("http://example.com/banner/foo/bar/img")));
        assert!(!p.matches(&req("http://example.com/banner/img")));
        assert!(!p.matches(&req("http://example.com/banner/foo/imgs")));
    }

    #[test]
    fn test_hostname_anchor() {
        let p = pat("ads.example.com^", AnchorType::Hostname);
        assert!(p.matches(&req("https://ads.example.com/x.js")));
        assert!(p.matches(&req("https://cdn.ads.example.com/x.js")));
        assert!(!p.matches(&req("https://badads.example.com/x.js")));
        assert!(!p.matches(&req("https://example.com/?u=ads.example.com")));
    }

    #[test]
    fn test_left_and_right_anchor() {
        let p = Pattern::new("https://example.com/ad.js", AnchorType::Left, true).unwrap();
        assert!(p.matches(&req("https://example.com/ad.js")));
        assert!(!p.matches(&req("https://example.com/ad.js?v=2")));
        assert!(!p.matches(&req("http://x.com/https://example.com/ad.js")));
        assert_eq!(p.as_str(), "|https://example.com/ad.js|");
    }

    #[test]
    fn test_many_wildcards_stay_linear() {
        let p = pat("a*a*a*a*a*a*b", AnchorType::None);
        let url = format!("http://localhost/{}", "a".repeat(4_000));

        let start = std::time::Instant::now();
        assert!(!p.matches(&req(&url)));
        assert!(p.matches(&req(&format!("{}b", url))));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_wildcard_backtracking() {
        let p = pat("ad*.js^", AnchorType::None);
        assert!(p.matches(&req("http://x.com/ad/a.json/b.js")));
        assert!(!p.matches(&req("http://x.com/ad/a.json")));

        let p = Pattern::new("https://*.example.com/*.gif", AnchorType::Left, true).unwrap();
        assert!(p.matches(&req("https://img.example.com/a/b.gif")));
        assert!(!p.matches(&req("https://img.example.com/a/b.gif?x")));
        assert!(!p.matches(&req("http://img.example.com/a/b.gif")));

        let p = pat("ads.example.com/*^", AnchorType::Hostname);
        assert!(p.matches(&req("https://ads.example.com/")));
    }

    #[test]
    fn test_rejects_degenerate_patterns() {
        assert_eq!(Pattern::new("", AnchorType::None, false), Err(RuleSetError::EmptyPattern));
        assert!(matches!(
            Pattern::new("**", AnchorType::None, false),
            Err(RuleSetError::MatchesEverything(_))
        ));
    }

    #[test]
    fn test_rule_type_and_party_constraints() {
        let mut rule = Rule::new(pat("tracker", AnchorType::None));
        rule.resources = ResourceMask::IMAGE;
        rule.party = PartyMask::THIRD_PARTY;

        let img_3p = PreparedRequest::new("https://tracker.net/p.gif", ResourceType::Image, "example.com");
        let img_1p = PreparedRequest::new("https://example.com/tracker.gif", ResourceType::Image, "example.com");
        let script_3p = PreparedRequest::new("https://tracker.net/t.js", ResourceType::Script, "example.com");

        assert!(rule.matches(&img_3p));
        assert!(!rule.matches(&img_1p));
        assert!(!rule.matches(&script_3p));
    }

    #[test]
    fn test_rule_set_requires_rules() {
        let err = RuleSet::new("empty", Category::Ads, 1, RuleAction::Block, Vec::new()).unwrap_err();
        assert_eq!(err, RuleSetError::NoRules("empty".into()));

        let set = RuleSet::from_patterns("ads", Category::Ads, 1, ["ad_img", "ad_frame"]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.first_match(&req("http://localhost/ad_frame01.html")).is_some());
    }
}
