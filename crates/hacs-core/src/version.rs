//! Available version resolution.

use std::sync::LazyLock;

use regex::Regex;

static PRERELEASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])(?:alpha|beta|rc|dev|pre|preview)(?:[^a-z]|$)|\d(?:a|b|rc)\d+$")
        .expect("unable to compile prerelease regex")
});

/// Number of sha characters used as a version when a repository has no releases.
pub const SHORT_SHA_LEN: usize = 7;

/// Returns true when `tag` carries a prerelease marker.
///
/// Semver tags (with an optional leading `v`) are prereleases when they have a pre-release
/// part. Other tags are checked for `alpha`, `beta`, `rc`, `dev`, `pre` and python style
/// suffixes such as `2.0.0b1`.
pub fn is_prerelease(tag: &str) -> bool {
    let trimmed = tag.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = semver::Version::parse(bare) {
        return !version.pre.is_empty();
    }

    PRERELEASE_RE.is_match(bare)
}

pub fn short_sha(sha: &str) -> String {
    sha.chars().take(SHORT_SHA_LEN).collect()
}

/// Computes the version a repository would install next.
///
/// `releases` is newest first. Without beta, the first stable release wins; when every
/// release is a prerelease, or beta is on, the newest release is returned. Without releases
/// the short default branch sha is used.
pub fn resolve<S: AsRef<str>>(releases: &[S], default_branch_sha: &str, beta: bool) -> String {
    resolve_flagged(releases, &[] as &[&str], default_branch_sha, beta)
}

/// Like [`resolve`], also treating every tag listed in `flagged` as a prerelease.
pub fn resolve_flagged<S, F>(releases: &[S], flagged: &[F], default_branch_sha: &str, beta: bool) -> String
where
    S: AsRef<str>,
    F: AsRef<str>,
{
    let Some(newest) = releases.first() else {
        return short_sha(default_branch_sha);
    };

    if !beta {
        let stable = releases.iter().map(AsRef::as_ref).find(|tag| {
            !is_prerelease(tag) && !flagged.iter().any(|f| f.as_ref() == *tag)
        });
        if let Some(stable) = stable {
            return stable.to_string();
        }
    }

    newest.as_ref().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "abcdef123456";

    #[test]
    fn test_resolve_latest_stable() {
        assert_eq!(resolve(&["1.2.0", "1.1.0"], SHA, false), "1.2.0");
    }

    #[test]
    fn test_resolve_no_releases_uses_short_sha() {
        assert_eq!(resolve::<&str>(&[], SHA, false), "abcdef1");
        assert_eq!(resolve::<&str>(&[], SHA, true), "abcdef1");
        assert_eq!(resolve::<&str>(&[], "abc", false), "abc");
    }

    #[test]
    fn test_resolve_beta_preference() {
        let releases = ["2.0.0-beta1", "1.9.0"];
        assert_eq!(resolve(&releases, SHA, false), "1.9.0");
        assert_eq!(resolve(&releases, SHA, true), "2.0.0-beta1");
    }

    #[test]
    fn test_resolve_only_prereleases() {
        let releases = ["3.0.0rc2", "3.0.0rc1"];
        assert_eq!(resolve(&releases, SHA, false), "3.0.0rc2");
    }

    #[test]
    fn test_resolve_flagged_upstream() {
        let releases = ["2024.5.0", "2024.4.0"];
        assert_eq!(
            resolve_flagged(&releases, &["2024.5.0"], SHA, false),
            "2024.4.0"
        );
        assert_eq!(
            resolve_flagged(&releases, &["2024.5.0"], SHA, true),
            "2024.5.0"
        );
    }

    #[test]
    fn test_is_prerelease() {
        for tag in [
            "2.0.0-beta1",
            "v1.0.0-rc.1",
            "2.0.0b1",
            "1.0a2",
            "1.4.0rc3",
            "0.9.0.dev4",
            "nightly-alpha",
            "V3.0.0-alpha",
        ] {
            assert!(is_prerelease(tag), "{tag}");
        }
        for tag in ["1.2.0", "v2.0.0", "2024.6.1", "1.0.0+build5", "release-42", "v1"] {
            assert!(!is_prerelease(tag), "{tag}");
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let releases = vec!["1.1.0".to_string(), "1.0.0".to_string()];
        let first = resolve(&releases, SHA, false);
        let second = resolve(&releases, SHA, false);
        assert_eq!(first, second);
    }
}
