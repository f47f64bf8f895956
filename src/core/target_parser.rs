// src/core/target_parser.rs

//! Splits a targets specification into the ordered targets of one build.

use crate::{
    constants::{NON_INTERACTIVE_FLAG, UPGRADE_TARGET},
    models::{BuildConfig, TargetInvocation, TargetSpec},
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // A double-quoted group, a bare word, or a stray quote.
    static ref TOKEN_RE: Regex =
        Regex::new(r#""([^"]*)"|([^\s"]+)|(")"#).expect("token regex must compile");
}

/// Splits a targets specification into an ordered list of targets.
///
/// # Logic:
/// - Tokens are separated by whitespace. Only double quotes group, so a quoted token
///   may contain spaces (`"test-app -clean"`). `#` and `'` are ordinary characters.
/// - Each token is then split on whitespace into `[target, extra-args...]`.
///
/// Empty input yields an empty list. An unclosed quote is logged and also yields an
/// empty list; it is never an error.
pub fn parse(targets_spec: &str) -> TargetInvocation {
    if targets_spec.trim().is_empty() {
        return Vec::new();
    }

    let mut targets = Vec::new();
    for caps in TOKEN_RE.captures_iter(targets_spec) {
        if caps.get(3).is_some() {
            log::warn!("Unclosed quote in targets '{}'; no targets will run.", targets_spec);
            return Vec::new();
        }
        let Some(token) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let mut pieces = token.as_str().split_whitespace().map(str::to_string);
        if let Some(name) = pieces.next() {
            targets.push(TargetSpec::new(name, pieces.collect()));
        }
    }
    targets
}

/// Builds the full list of targets for a build, prepending
/// `upgrade --non-interactive` when `force-upgrade` is set.
pub fn targets_to_run(config: &BuildConfig) -> TargetInvocation {
    let mut targets = Vec::new();
    if config.force_upgrade {
        targets.push(TargetSpec::new(
            UPGRADE_TARGET,
            vec![NON_INTERACTIVE_FLAG.to_string()],
        ));
    }
    targets.extend(parse(config.targets.as_deref().unwrap_or("")));
    log::debug!("Targets to run: {:?}", targets);
    targets
}
