// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Line-oriented regex rule files: `run_shell_command.auto_deny`,
//! `.ask_approval`, `.auto_approve` under the user config directory.
//!
//! Parsing is a pure function over the file's text, unit-tested against
//! fixture strings rather than real files — the same file-reading code path
//! is shared with the rest of the config loader, so only the line-parsing
//! logic needs its own tests.
use regex::Regex;
use tracing::warn;

/// One compiled rule-file line: a regex plus whether it was negated with a
/// leading `!` (only meaningful — and only parsed — in the `auto_approve`
/// file).
struct RulePattern {
    regex: Regex,
    negate: bool,
}

/// An ordered sequence of regex patterns read from one rule file.
pub struct RuleFile {
    patterns: Vec<RulePattern>,
}

impl RuleFile {
    /// Parse rule-file text. `allow_negation` must be `true` only for the
    /// `auto_approve` file; the other two files treat a leading `!` as a
    /// literal regex character (never stripped).
    pub fn parse(text: &str, allow_negation: bool) -> Self {
        let mut patterns = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negate, pattern) = if allow_negation && line.starts_with('!') {
                (true, line[1..].trim())
            } else {
                (false, line)
            };

            // Bare `!` (empty pattern after stripping negation) is a
            // match-everything footgun — skip it.
            if pattern.is_empty() {
                continue;
            }

            match Regex::new(pattern) {
                Ok(regex) => patterns.push(RulePattern { regex, negate }),
                Err(e) => warn!(line = lineno + 1, pattern, error = %e, "skipping invalid rule pattern"),
            }
        }
        Self { patterns }
    }

    /// Read and parse a rule file from disk. A missing file parses as an
    /// empty rule set (not an error) — most users never create any of the
    /// three rule files.
    pub fn load(path: &std::path::Path, allow_negation: bool) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, allow_negation),
            Err(_) => Self { patterns: Vec::new() },
        }
    }

    /// True if any pattern in this rule file matches `command`. A negated
    /// pattern matches when the command does *not* match its regex.
    pub fn matches(&self, command: &str) -> bool {
        self.patterns.iter().any(|p| {
            let hit = p.regex.is_match(command);
            if p.negate {
                !hit
            } else {
                hit
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Folds another rule file's patterns into this one, preserving order
    /// (this file's patterns are checked first). Used to combine config-level
    /// inline patterns with the on-disk rule file for the same tool.
    pub fn merge(mut self, other: RuleFile) -> Self {
        self.patterns.extend(other.patterns);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        let rf = RuleFile::parse("\n# a comment\n\n  \n", false);
        assert!(rf.is_empty());
    }

    #[test]
    fn plain_pattern_matches_literally() {
        let rf = RuleFile::parse("rm -rf /", false);
        assert!(rf.matches("rm -rf /"));
        assert!(!rf.matches("ls -la"));
    }

    #[test]
    fn partial_match_is_sufficient() {
        let rf = RuleFile::parse("^rm ", false);
        assert!(rf.matches("rm -rf /tmp/x"));
    }

    #[test]
    fn negation_only_applied_when_allowed() {
        // Negation disabled: leading `!` is a literal regex character,
        // which makes this an invalid pattern at position 0 for most
        // engines — but `!` is valid in a regex class, not bare, so this
        // becomes a literal-character match attempt instead of negation.
        let rf = RuleFile::parse("!cat secrets.txt", false);
        assert!(!rf.matches("cat secrets.txt"));
        assert!(rf.matches("!cat secrets.txt"));
    }

    #[test]
    fn negation_allowed_flips_match_semantics() {
        let rf = RuleFile::parse("!^git push", true);
        // Matches everything that is NOT a `git push` command.
        assert!(rf.matches("ls -la"));
        assert!(!rf.matches("git push origin main"));
    }

    #[test]
    fn bare_negation_is_skipped() {
        let rf = RuleFile::parse("!\n!   \n", true);
        assert!(rf.is_empty());
    }

    #[test]
    fn invalid_regex_is_skipped_not_fatal() {
        let rf = RuleFile::parse("[unterminated", false);
        assert!(rf.is_empty());
    }

    #[test]
    fn load_missing_file_is_empty_not_error() {
        let rf = RuleFile::load(std::path::Path::new("/nonexistent/path/xyz"), true);
        assert!(rf.is_empty());
    }

    #[test]
    fn multiple_patterns_any_match_wins() {
        let rf = RuleFile::parse("foo\nbar\nbaz", false);
        assert!(rf.matches("contains bar here"));
        assert!(!rf.matches("none of them"));
    }
}
