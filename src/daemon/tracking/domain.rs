use tracing::debug;
use url::Url;

/// Resolves the domain time is attributed to. Only web pages have one: internal browser pages,
/// blank pages and anything that fails to parse resolve to [None].
///
/// - `https://www.example.com/path` -> `www.example.com`
/// - `chrome://extensions` -> [None]
/// - `about:blank` -> [None]
pub fn resolve_domain(url: &str) -> Option<String> {
    let parsed = match Url::parse(url) {
        Ok(v) => v,
        Err(e) => {
            debug!("Can't resolve domain of {url:?}: {e}");
            return None;
        }
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    parsed
        .host_str()
        .map(|host| host.trim_end_matches('.'))
        .filter(|host| !host.is_empty())
        .map(str::to_owned)
}
