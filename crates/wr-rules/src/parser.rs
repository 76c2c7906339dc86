//! Rule list text parser
//!
//! One rule per line:
//!
//! ```text
//! ! comment
//! ad_banner                      substring
//! ||ads.example.com^             hostname anchor + separator
//! |https://cdn.example.net/ad|   start and end anchors
//! /pixel/*.gif$image,third-party
//! @@||example.com/ad_ok.js       allow rule
//! 0.0.0.0 tracker.example.org    hosts file entry
//! ```

use std::net::IpAddr;

use wr_core::{AnchorType, PartyMask, Pattern, ResourceMask, Rule, RuleAction};

use crate::error::LineError;

/// A rule line compiled into a core `Rule` plus its action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedRule {
    pub action: RuleAction,
    pub rule: Rule,
}

/// A line that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number
    pub line_no: usize,
    pub text: String,
    pub error: LineError,
}

/// Result of parsing one rule list.
#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    pub rules: Vec<ParsedRule>,
    pub rejected: Vec<RejectedLine>,
    /// Comments, blank lines and element-hiding rules
    pub skipped: usize,
}

impl ParsedList {
    /// Lines that were meant to be rules.
    pub fn rule_lines(&self) -> usize {
        self.rules.len() + self.rejected.len()
    }
}

pub fn parse_rule_list(text: &str) -> ParsedList {
    let mut out = ParsedList::default();

    for (idx, raw_line) in text.lines().enumerate() {
        match parse_rule_line(raw_line) {
            Ok(Some(rule)) => out.rules.push(rule),
            Ok(None) => out.skipped += 1,
            Err(error) => out.rejected.push(RejectedLine {
                line_no: idx + 1,
                text: raw_line.trim().to_string(),
                error,
            }),
        }
    }

    out
}

/// Parse a single line. `Ok(None)` for lines that carry no rule.
pub fn parse_rule_line(raw_line: &str) -> Result<Option<ParsedRule>, LineError> {
    let mut line = raw_line.trim();
    if line.is_empty() || is_comment_line(line) {
        return Ok(None);
    }

    // Element hiding applies to the DOM, not to requests
    if line.contains("##") || line.contains("#@#") || line.contains("#?#") {
        return Ok(None);
    }

    let mut action = RuleAction::Block;
    if let Some(rest) = line.strip_prefix("@@") {
        action = RuleAction::Allow;
        line = rest.trim_start();
    }

    let (pattern_part, options_text) = split_rule_options(line);
    let options = match options_text {
        Some(options_text) => parse_options(options_text)?,
        None => ParsedOptions::default(),
    };

    let pattern = match parse_hosts_entry(pattern_part) {
        Some(HostsEntry::Domain(domain)) => {
            Pattern::new(&format!("{}^", domain), AnchorType::Hostname, false)?
        }
        Some(HostsEntry::Local) => return Ok(None),
        None => parse_pattern(pattern_part)?,
    };

    Ok(Some(ParsedRule {
        action,
        rule: Rule {
            pattern,
            resources: options.resources,
            party: options.party,
        },
    }))
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[') || line.starts_with('#')
}

/// Options follow the last `$`; earlier ones belong to the pattern.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    match line.rfind('$') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

fn parse_pattern(text: &str) -> Result<Pattern, LineError> {
    let text = text.trim();

    let (anchor, rest) = if let Some(rest) = text.strip_prefix("||") {
        (AnchorType::Hostname, rest)
    } else if let Some(rest) = text.strip_prefix('|') {
        (AnchorType::Left, rest)
    } else {
        (AnchorType::None, text)
    };

    let (body, right_anchor) = match rest.strip_suffix('|') {
        Some(body) => (body, true),
        None => (rest, false),
    };

    Ok(Pattern::new(body, anchor, right_anchor)?)
}

/// Names every stock hosts file maps to the local machine or network.
const LOCAL_HOST_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

enum HostsEntry {
    Domain(String),
    /// Preamble entry for the local machine; carries no rule
    Local,
}

fn parse_hosts_entry(line: &str) -> Option<HostsEntry> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;

    if first.parse::<IpAddr>().is_err() {
        return None;
    }
    if second.parse::<IpAddr>().is_ok() {
        return Some(HostsEntry::Local);
    }

    let domain = normalize_domain(second)?;
    if LOCAL_HOST_NAMES.contains(&domain.as_str()) {
        return Some(HostsEntry::Local);
    }
    Some(HostsEntry::Domain(domain))
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

// =============================================================================
// Options
// =============================================================================

struct ParsedOptions {
    resources: ResourceMask,
    party: PartyMask,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            resources: ResourceMask::ALL,
            party: PartyMask::ALL,
        }
    }
}

fn parse_options(text: &str) -> Result<ParsedOptions, LineError> {
    let mut type_include = 0u8;
    let mut type_exclude = 0u8;
    let mut party_include = 0u8;
    let mut party_exclude = 0u8;

    for raw in text.trim().split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower.as_str()),
        };

        if let Some(mask) = resource_mask(name) {
            if negated {
                type_exclude |= mask.bits();
            } else {
                type_include |= mask.bits();
            }
            continue;
        }

        if let Some(mask) = party_mask(name) {
            if negated {
                party_exclude |= mask.bits();
            } else {
                party_include |= mask.bits();
            }
            continue;
        }

        return Err(LineError::UnknownOption(raw.to_string()));
    }

    let type_bits = finalize_mask(type_include, type_exclude, ResourceMask::ALL.bits())
        .ok_or(LineError::EmptyTypeMask)?;
    let party_bits = finalize_mask(party_include, party_exclude, PartyMask::ALL.bits())
        .ok_or(LineError::EmptyPartyMask)?;

    Ok(ParsedOptions {
        resources: ResourceMask::from_bits_truncate(type_bits),
        party: PartyMask::from_bits_truncate(party_bits),
    })
}

/// Includes win over the full set; excludes are removed afterwards.
fn finalize_mask(include: u8, exclude: u8, all: u8) -> Option<u8> {
    let include = include & all;
    let exclude = exclude & all;
    let mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    Some(mask)
}

fn resource_mask(name: &str) -> Option<ResourceMask> {
    match name {
        "image" => Some(ResourceMask::IMAGE),
        "script" => Some(ResourceMask::SCRIPT),
        "stylesheet" => Some(ResourceMask::STYLESHEET),
        "subdocument" | "sub_frame" => Some(ResourceMask::SUBFRAME),
        "other" => Some(ResourceMask::OTHER),
        _ => None,
    }
}

fn party_mask(name: &str) -> Option<PartyMask> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY),
        _ => None,
    }
}
