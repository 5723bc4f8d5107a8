//! Inline compiler version constraints
//!
//! Reads the `pragma solidity ...;` directive from source text and translates
//! Solidity's range syntax into semver requirements:
//!
//! - a bare version (`0.8.18`) is an exact match
//! - whitespace separated comparators (`>=0.8.0 <0.9.0`) must all hold
//! - `a - b` is an inclusive range
//! - `||` separates alternatives, any of which may hold

use semver::{Version, VersionReq};
use std::fmt;

/// A parsed version constraint, possibly with several alternatives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionConstraint {
    /// Parse a Solidity-style version range
    pub fn parse(raw: &str) -> Result<Self, semver::Error> {
        let raw = raw.trim();
        let alternatives = raw
            .split("||")
            .map(|alt| VersionReq::parse(&to_semver_syntax(alt)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    /// Extract the constraint from a `pragma solidity` directive, if any
    ///
    /// Returns `None` when the source carries no pragma or the pragma cannot
    /// be parsed; callers then fall back to the unconstrained default.
    pub fn from_source(source: &str) -> Option<Self> {
        let mut in_block_comment = false;

        for line in source.lines() {
            let mut line = line.trim();

            if in_block_comment {
                match line.find("*/") {
                    Some(end) => {
                        in_block_comment = false;
                        line = line[end + 2..].trim();
                    }
                    None => continue,
                }
            }
            if line.starts_with("/*") && !line.contains("*/") {
                in_block_comment = true;
                continue;
            }
            if line.starts_with("//") {
                continue;
            }

            if let Some(rest) = line.strip_prefix("pragma") {
                let rest = rest.trim_start();
                if let Some(range) = rest.strip_prefix("solidity") {
                    let range = range.split(';').next().unwrap_or("");
                    return Self::parse(range).ok();
                }
            }
        }

        None
    }

    /// Whether any alternative accepts `version`
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The constraint as written in the source
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Rewrite one Solidity alternative into a comma separated semver requirement
fn to_semver_syntax(alternative: &str) -> String {
    let tokens = merge_operators(alternative.split_whitespace());

    // `a - b` hyphen range
    if tokens.len() == 3 && tokens[1] == "-" {
        return format!(">={}, <={}", tokens[0], tokens[2]);
    }

    tokens
        .into_iter()
        .map(|token| {
            let bare = token.starts_with(|c: char| c.is_ascii_digit());
            let wildcard = token.contains(['*', 'x', 'X']);
            if bare && !wildcard {
                format!("={}", token)
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Join dangling operators with the version that follows (`>= 0.8.0` -> `>=0.8.0`)
fn merge_operators<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut pending: Option<&str> = None;

    for token in tokens {
        if is_operator(token) {
            pending = Some(token);
            continue;
        }
        match pending.take() {
            Some(op) => merged.push(format!("{}{}", op, token)),
            None => merged.push(token.to_string()),
        }
    }

    merged
}

fn is_operator(token: &str) -> bool {
    matches!(token, ">" | ">=" | "<" | "<=" | "=" | "^" | "~")
}
