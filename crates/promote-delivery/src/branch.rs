//! Promotion branch naming.
//!
//! Branches live under `promote/{repository}/{target}/{overlays}/`. A
//! per-run branch ends in `{runKey}-{sha7}`; an aggregated branch ends in
//! `{uniqueKey}-{sha7}` and is matched by its prefix so later runs with the
//! same key land on the same pull request.

use regex::Regex;

use promote_core::short_sha;

/// Make one branch-name component safe: characters git refuses in ref
/// names, and `/`, become `-`.
pub fn sanitize(component: &str) -> String {
    let mapped: String = component
        .trim()
        .replace("..", "-")
        .replace("@{", "-")
        .chars()
        .map(|c| match c {
            '/' | '~' | '^' | ':' | '?' | '*' | '[' | '\\' => '-',
            c if c.is_whitespace() || c.is_control() => '-',
            c => c,
        })
        .collect();

    let mut collapsed = String::with_capacity(mapped.len());
    for c in mapped.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// Sorted, sanitized overlay paths joined with `_`.
pub fn overlay_component(overlays: &[String]) -> String {
    let mut parts: Vec<String> = overlays.iter().map(|o| sanitize(o)).collect();
    parts.sort();
    parts.dedup();
    parts.join("_")
}

/// `promote/{repository}/{target}/{overlays}/{key}` with sanitized parts.
pub fn branch_prefix(repository: &str, target: &str, overlays: &[String], key: &str) -> String {
    format!(
        "promote/{}/{}/{}/{}",
        sanitize(repository),
        sanitize(target),
        overlay_component(overlays),
        sanitize(key)
    )
}

/// Full branch name: the prefix followed by `-{sha7}`.
pub fn branch_name(prefix: &str, sha: &str) -> String {
    format!("{prefix}-{}", short_sha(sha))
}

/// Whether `head` is a branch created from `prefix`.
///
/// Matches `{prefix}-{hex}` exactly, so a key that is a prefix of another
/// key does not collide.
pub fn matches_prefix(prefix: &str, head: &str) -> bool {
    match Regex::new(&format!("^{}-[0-9a-f]{{7,40}}$", regex::escape(prefix))) {
        Ok(re) => re.is_match(head),
        Err(_) => false,
    }
}

/// The first open head branch created from `prefix`, in sorted order.
pub fn find_reusable(prefix: &str, heads: &[String]) -> Option<String> {
    let mut matches: Vec<&String> = heads.iter().filter(|h| matches_prefix(prefix, h)).collect();
    matches.sort();
    matches.first().map(|h| (*h).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlays(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn slashes_become_hyphens() {
        assert_eq!(sanitize("acme/deploy"), "acme-deploy");
        assert_eq!(sanitize("release/1.x"), "release-1.x");
        assert_eq!(sanitize("weird key~^:"), "weird-key");
    }

    #[test]
    fn overlays_are_sorted_and_joined() {
        assert_eq!(
            overlay_component(&overlays(&["env/prod", "env/dev"])),
            "env-dev_env-prod"
        );
    }

    #[test]
    fn run_branch_layout() {
        let prefix = branch_prefix("acme/deploy", "main", &overlays(&["env/dev"]), "42-1");
        assert_eq!(prefix, "promote/acme-deploy/main/env-dev/42-1");
        assert_eq!(
            branch_name(&prefix, "0123456789abcdef"),
            "promote/acme-deploy/main/env-dev/42-1-0123456"
        );
    }

    #[test]
    fn prefix_match_requires_hex_suffix() {
        let prefix = "promote/acme-deploy/main/env-prod/nightly";
        assert!(matches_prefix(prefix, &format!("{prefix}-abc1234")));
        assert!(!matches_prefix(prefix, &format!("{prefix}-2-abc1234")));
        assert!(!matches_prefix(prefix, &format!("{prefix}x-abc1234")));
        assert!(!matches_prefix(prefix, &format!("{prefix}-abc")));
        assert!(!matches_prefix(prefix, prefix));
    }

    #[test]
    fn reusable_branch_is_found_among_others() {
        let prefix = "promote/acme-deploy/main/env-prod/nightly";
        let heads = vec![
            "feature/other".to_string(),
            format!("{prefix}-fedcba9"),
            "promote/acme-deploy/main/env-prod/nightly2-1234567".to_string(),
        ];
        assert_eq!(find_reusable(prefix, &heads), Some(format!("{prefix}-fedcba9")));
    }
}
