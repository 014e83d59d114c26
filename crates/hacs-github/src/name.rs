use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static FULL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?/[A-Za-z0-9._-]+$")
        .expect("unable to compile repository name regex")
});

/// Normalizes user input naming a GitHub repository into `owner/name`.
///
/// Accepts `owner/name`, `https://github.com/owner/name`, `github.com/owner/name`, with an
/// optional `.git` suffix or trailing slash.
pub fn parse_full_name(input: &str) -> Option<String> {
    let input = input.trim().trim_end_matches('/');
    let input = input.strip_suffix(".git").unwrap_or(input);

    let candidate = if input.contains("://") || input.starts_with("github.com/") {
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{input}")
        };
        let url = Url::parse(&with_scheme).ok()?;
        if !matches!(url.host_str(), Some("github.com" | "www.github.com")) {
            return None;
        }
        let segments: Vec<_> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [owner, name] => format!("{owner}/{name}"),
            _ => return None,
        }
    } else {
        input.to_string()
    };

    let candidate = candidate.strip_suffix(".git").unwrap_or(&candidate).to_string();
    if FULL_NAME_RE.is_match(&candidate) && !candidate.ends_with("/.") && !candidate.ends_with("/..")
    {
        Some(candidate)
    } else {
        None
    }
}
