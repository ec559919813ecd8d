//! URL utilities shared by the frontier, safety gate, and fetch engine.

use url::Url;

/// Canonical form used as the identity for deduplication: lowercased
/// scheme/host, fragment stripped, "/" for an empty path. Unparseable
/// input is returned unchanged so callers can still track it.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

/// Extract the domain (host, plus port when explicit) from a URL.
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    match parsed.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed.has_host() && !parsed.scheme().is_empty(),
        Err(_) => false,
    }
}

/// Two URLs belong to the same crawl scope when their domains match exactly.
pub fn is_same_domain(url_a: &str, url_b: &str) -> bool {
    match (extract_domain(url_a), extract_domain(url_b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Extension of the URL path, lowercased, including the leading dot.
/// Empty string when the path has no extension.
pub fn file_extension(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => return String::new(),
    };

    let file_name = path.rsplit('/').next().unwrap_or("");
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

pub fn has_excluded_extension(url: &str, excluded: &[String]) -> bool {
    let extension = file_extension(url);
    if extension.is_empty() {
        return false;
    }
    excluded.iter().any(|e| e.to_ascii_lowercase() == extension)
}

pub fn is_html_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    ["text/html", "application/xhtml", "html"]
        .iter()
        .any(|marker| lower.contains(marker))
}

pub fn is_binary_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    ["application/octet-stream", "image/", "video/", "audio/"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Resolve a possibly-relative href against its page URL.
pub fn join_url(base_url: &str, href: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let joined = base.join(href).ok()?;
    Some(joined.to_string())
}

/// Add https:// prefix for bare domains (CLI convenience).
pub fn normalize_url_for_cli(url: &str) -> String {
    let trimmed = url.trim();

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }

    format!("https://{}", trimmed)
}
