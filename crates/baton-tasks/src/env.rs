//! Environment variable resolution for hashing and child processes

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use regex::Regex;
use sha2::{Digest, Sha256};

use baton_core::config::EnvMode;

/// Variables every task may see even in strict mode
pub const BUILTIN_PASS_THROUGH: &[&str] = &[
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "PATH",
    "TERM",
    "TMPDIR",
    "TEMP",
    "TMP",
    "LANG",
    "LC_ALL",
    "SYSTEMROOT",
    "COMSPEC",
];

/// Errors while resolving env patterns
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("Invalid env pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Sorted name -> value map of environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentVariableMap(BTreeMap<String, String>);

impl EnvironmentVariableMap {
    /// Snapshot of the current process environment
    pub fn infer() -> Self {
        Self(std::env::vars().collect())
    }

    /// Sorted variable names
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// `NAME=<sha256 of value>` pairs, sorted by name. Values never appear in
    /// clear text; an empty value hashes to `NAME=`.
    pub fn to_hashable(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    format!("{}=", k)
                } else {
                    format!("{}={:x}", k, Sha256::digest(v.as_bytes()))
                }
            })
            .collect()
    }

    /// Add every variable of `other`, overwriting on conflict
    pub fn union(&mut self, other: &EnvironmentVariableMap) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Remove every variable named in `other`
    pub fn difference(&mut self, other: &EnvironmentVariableMap) {
        for k in other.0.keys() {
            self.0.remove(k);
        }
    }

    /// Resolve patterns against this map.
    ///
    /// `*` matches any run of characters and `\*` a literal star. Patterns
    /// starting with `!` remove matches.
    pub fn from_wildcards(&self, patterns: &[String]) -> Result<Self, EnvError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for pattern in patterns {
            match pattern.strip_prefix('!') {
                Some(negated) => exclude.push(wildcard_to_regex(negated)),
                None => include.push(wildcard_to_regex(pattern)),
            }
        }

        let mut resolved = Self::default();
        if include.is_empty() {
            return Ok(resolved);
        }

        let include_re = compile(&include, patterns)?;
        let exclude_re = if exclude.is_empty() {
            None
        } else {
            Some(compile(&exclude, patterns)?)
        };

        for (name, value) in &self.0 {
            let excluded = exclude_re.as_ref().is_some_and(|re| re.is_match(name));
            if include_re.is_match(name) && !excluded {
                resolved.0.insert(name.clone(), value.clone());
            }
        }

        Ok(resolved)
    }
}

impl Deref for EnvironmentVariableMap {
    type Target = BTreeMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for EnvironmentVariableMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(String, String)> for EnvironmentVariableMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn compile(parts: &[String], patterns: &[String]) -> Result<Regex, EnvError> {
    let joined = format!("^(?:{})$", parts.join("|"));
    Regex::new(&joined).map_err(|source| EnvError::Pattern {
        pattern: patterns.join(","),
        source,
    })
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'*') => {
                chars.next();
                literal.push('*');
            }
            '*' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(".*");
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}

/// Resolve `infer` for one task: strict when the task declares pass-through
/// env, loose otherwise.
pub fn resolve_env_mode(mode: EnvMode, pass_through_env: Option<&[String]>) -> EnvMode {
    match mode {
        EnvMode::Infer if pass_through_env.is_some() => EnvMode::Strict,
        EnvMode::Infer => EnvMode::Loose,
        other => other,
    }
}

/// Pass-through names as they enter the task hash: dropped in loose mode,
/// an absent list becomes empty in strict mode.
pub fn hashable_pass_through(mode: EnvMode, pass_through_env: Option<&[String]>) -> Option<Vec<String>> {
    match mode {
        EnvMode::Loose => None,
        _ => {
            let mut names = pass_through_env.map(<[String]>::to_vec).unwrap_or_default();
            names.sort();
            Some(names)
        }
    }
}
