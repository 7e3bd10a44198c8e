//! Identifier normalizer: catalog display names to search keys.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::config::NormalizeConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedName {
    /// Cleaned key used for matching.
    pub search_key: String,
    /// Presentation form. Keeps possessives, component letters and binary
    /// markers; only catalog noise and extra whitespace are removed.
    pub display: String,
}

fn possessive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"['’]s(\s|$)").unwrap())
}

fn component_letter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s[A-D]$").unwrap())
}

fn binary_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(AB\)$").unwrap())
}

/// Collapse internal whitespace runs to one space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop a trailing component letter, if any.
pub fn strip_component_letter(name: &str) -> String {
    component_letter_re().replace(name.trim_end(), "").into_owned()
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    noise_prefixes: Vec<String>,
    aliases: Vec<(String, String)>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizeConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        // Longest prefix first so "** " wins over "* ".
        let mut noise_prefixes = config.noise_prefixes.clone();
        noise_prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        let mut aliases: Vec<(String, String)> =
            config.aliases.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { noise_prefixes, aliases }
    }

    pub fn normalize(&self, raw: &str) -> NormalizedName {
        let cleaned = collapse_whitespace(raw);
        let display = self.strip_noise(&cleaned);

        let mut key = possessive_re().replace_all(&display, "$1").into_owned();
        key = strip_component_letter(&key);
        key = binary_marker_re().replace(&key, "").into_owned();
        key = self.strip_noise(&key);
        key = self.apply_alias(&key);
        let search_key = collapse_whitespace(&key);

        log::debug!("normalize: '{raw}' -> key '{search_key}', display '{display}'");
        NormalizedName { search_key, display }
    }

    /// Substitute a known catalog-alias prefix (`Gliese 876` -> `GJ 876`).
    pub fn apply_alias(&self, name: &str) -> String {
        for (from, to) in &self.aliases {
            if let Some(rest) = name.strip_prefix(from.as_str()) {
                return format!("{to}{rest}");
            }
        }
        name.to_string()
    }

    fn strip_noise(&self, name: &str) -> String {
        let mut current = name.trim_start();
        'outer: loop {
            for prefix in &self.noise_prefixes {
                if let Some(rest) = current.strip_prefix(prefix.as_str()) {
                    current = rest.trim_start();
                    continue 'outer;
                }
            }
            break;
        }
        current.to_string()
    }
}
