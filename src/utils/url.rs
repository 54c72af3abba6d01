// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Resolve a potentially relative URL against a base URL.
///
/// # Examples
/// ```
/// use toplist_archive::utils::url::resolve;
///
/// assert_eq!(
///     resolve("https://e-hentai.org/toplist.php", "/g/1/abc/"),
///     "https://e-hentai.org/g/1/abc/"
/// );
/// ```
pub fn resolve(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract the lowercase host from a URL string.
pub fn get_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}

/// Whether `url` points at `host` or one of its subdomains.
pub fn is_same_site(url: &str, host: &str) -> bool {
    let host = host.to_lowercase();
    match get_domain(url) {
        Some(domain) => domain == host || domain.ends_with(&format!(".{host}")),
        None => false,
    }
}

/// Route `target` through a relay endpoint as `?to=<encoded target>`.
pub fn relay_target(relay: &str, target: &str) -> crate::error::Result<String> {
    let mut url = Url::parse(relay)?;
    url.query_pairs_mut().append_pair("to", target);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_domain() {
        assert_eq!(
            get_domain("https://E-Hentai.org/g/1/x/"),
            Some("e-hentai.org".to_string())
        );
        assert_eq!(get_domain("not a url"), None);
    }

    #[test]
    fn test_is_same_site() {
        assert!(is_same_site("https://e-hentai.org/toplist.php", "e-hentai.org"));
        assert!(is_same_site("https://api.e-hentai.org/", "e-hentai.org"));
        assert!(!is_same_site("https://cloudflare.com/cdn-cgi/trace", "e-hentai.org"));
        assert!(!is_same_site("https://note-hentai.org/", "e-hentai.org"));
    }

    #[test]
    fn test_relay_target_encodes() {
        let url = relay_target(
            "https://relay.internal/fetch-proxy",
            "https://e-hentai.org/toplist.php?tl=11&p=1",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://relay.internal/fetch-proxy?to=https%3A%2F%2Fe-hentai.org%2Ftoplist.php%3Ftl%3D11%26p%3D1"
        );
    }
}
