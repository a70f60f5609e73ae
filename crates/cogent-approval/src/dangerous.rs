// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Fixed set of dangerous shell-command patterns (spec.md §3), checked
//! before rule-file evaluation so a user's `auto_approve` file can never
//! silently wave through a command from this list — it always re-prompts
//! with the reason surfaced, even under `--yolo`.
use std::sync::OnceLock;

use regex::Regex;

/// One dangerous pattern: a compiled regex plus the reason shown to the
/// user when it matches.
struct Pattern {
    regex: Regex,
    reason: &'static str,
}

fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let specs: &[(&str, &str)] = &[
            (r"rm\s+(-\w*r\w*f\w*|-\w*f\w*r\w*)\s+(/$|/\s|/\*|~(/|\s|$))", "recursive force-delete of a root or home path"),
            (r"\bdd\s+.*of=/dev/(sd|nvme|hd|disk)", "writes raw bytes directly to a block device"),
            (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;?\s*:", "fork bomb"),
            (r"\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(sh|bash|zsh)\b", "pipes a downloaded script straight into a shell"),
            (r"\bchmod\s+(-R\s+)?777\s+/(\s|$)", "world-writable permissions on the filesystem root"),
            (r"\bcat\b.*\b(id_rsa|id_ed25519|\.pem|\.ssh/config)\b", "reads a private key or SSH config"),
            (r"\bgit\s+push\s+.*--force\b", "force-push can overwrite remote history"),
            (r"\bgit\s+push\s+.*-f\b", "force-push can overwrite remote history"),
            (r"\bmkfs\.", "reformats a filesystem"),
            (r">\s*/dev/sd[a-z]\b", "redirects output directly onto a block device"),
        ];
        specs
            .iter()
            .filter_map(|(pat, reason)| match Regex::new(pat) {
                Ok(regex) => Some(Pattern { regex, reason }),
                Err(_) => None,
            })
            .collect()
    })
}

/// Returns the reason string for the first dangerous pattern matching
/// `command`, or `None` if it matches none of them.
pub fn dangerous_pattern_match(command: &str) -> Option<&'static str> {
    patterns().iter().find(|p| p.regex.is_match(command)).map(|p| p.reason)
}
