//! Learned asset-name patterns.
//!
//! Once an asset has been picked for a repository, its name is turned into a pattern by replacing
//! every dotted version number with `*`, so `app-1.4.2-win64.zip` becomes `app-*-win64.zip`. The
//! next time the repository is checked, the pattern is turned back into a regex that matches the
//! same asset from a newer release.

use anyhow::{Context, Result};
use itertools::Itertools;
use lazy_regex::regex;
use regex::Regex;

const VERSION_FRAGMENT: &str = r"\d+(?:\.\d+)*";

/// Replaces every run of dot-separated digits (with at least one dot) in `asset_name` with `*`.
#[must_use]
pub fn to_pattern(asset_name: &str) -> String {
    regex!(r"\d+(?:\.\d+)+")
        .replace_all(asset_name, "*")
        .into_owned()
}

/// Builds a regex from a learned pattern. Everything but `*` is matched literally, and each run of
/// `*` matches a version number. The regex is anchored at both ends.
///
/// # Errors
///
/// This only fails if the resulting regex is too large to compile.
pub fn to_matcher(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    for (is_star, chunk) in &pattern.chars().chunk_by(|c| *c == '*') {
        if is_star {
            re.push_str(VERSION_FRAGMENT);
        } else {
            re.push_str(&regex::escape(&chunk.collect::<String>()));
        }
    }
    re.push('$');

    Regex::new(&re).with_context(|| format!("could not build a matcher for pattern `{pattern}`"))
}
