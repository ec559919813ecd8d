//! HTML parsing surface consumed by the crawl engine: anchor enumeration
//! for link discovery and form signatures for the safety gate. Parse
//! problems yield empty results, never errors.

use scraper::{Html, Selector};

use crate::url_utils;

/// Signature of a form found in a page, as much as the safety gate needs.
#[derive(Debug, Clone)]
pub struct FormDescriptor {
    pub has_password_field: bool,
    pub action: String,
}

/// Extract absolute, same-domain, normalized, deduplicated link targets
/// from anchor elements. Fragment-only, empty, and non-navigational hrefs
/// (javascript:, mailto:, tel:, data:) are excluded.
pub fn extract_links(html_body: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html_body);
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut links = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("data:")
        {
            continue;
        }

        let Some(absolute) = url_utils::join_url(base_url, href) else {
            continue;
        };

        if !url_utils::is_same_domain(base_url, &absolute) {
            continue;
        }

        let normalized = url_utils::normalize_url(&absolute);
        if !links.contains(&normalized) {
            links.push(normalized);
        }
    }

    links
}

/// Enumerate form signatures: whether each form carries a password input,
/// and its action attribute.
pub fn extract_forms(html_body: &str) -> Vec<FormDescriptor> {
    let document = Html::parse_document(html_body);
    let form_selector = match Selector::parse("form") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let password_selector = match Selector::parse(r#"input[type="password"]"#) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    document
        .select(&form_selector)
        .map(|form| FormDescriptor {
            has_password_field: form.select(&password_selector).next().is_some(),
            action: form
                .value()
                .attr("action")
                .unwrap_or("")
                .to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.com/dir/page";

    #[test]
    fn test_extract_same_domain_links() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="contact">Contact</a>
            <a href="https://example.com/pricing">Pricing</a>
            <a href="https://other-site.com/external">External</a>
        </body></html>"#;

        let links = extract_links(html, BASE);
        assert_eq!(
            links,
            vec![
                "https://example.com/about",
                "https://example.com/dir/contact",
                "https://example.com/pricing",
            ]
        );
    }

    #[test]
    fn test_skips_fragment_and_scheme_links() {
        let html = r##"<html><body>
            <a href="#section">Anchor</a>
            <a href="">Empty</a>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:a@example.com">Mail</a>
            <a href="tel:+123">Tel</a>
        </body></html>"##;

        assert!(extract_links(html, BASE).is_empty());
    }

    #[test]
    fn test_deduplicates_by_normalized_form() {
        let html = r##"<html><body>
            <a href="/page">One</a>
            <a href="/page#top">Two</a>
            <a href="https://EXAMPLE.com/page">Three</a>
        </body></html>"##;

        let links = extract_links(html, BASE);
        assert_eq!(links, vec!["https://example.com/page"]);
    }

    #[test]
    fn test_malformed_html_is_tolerated() {
        let html = r#"<html><body><a href="/ok">Link<div>unclosed<p>text"#;
        let links = extract_links(html, BASE);
        assert_eq!(links, vec!["https://example.com/ok"]);
    }

    #[test]
    fn test_no_links() {
        assert!(extract_links("<html><body><p>text</p></body></html>", BASE).is_empty());
        assert!(extract_links("", BASE).is_empty());
    }

    #[test]
    fn test_extract_forms() {
        let html = r#"<html><body>
            <form action="/login" method="post">
                <input type="text" name="username">
                <input type="password" name="password">
            </form>
            <form action="/Search"><input type="text" name="q"></form>
            <form><input type="text" name="misc"></form>
        </body></html>"#;

        let forms = extract_forms(html);
        assert_eq!(forms.len(), 3);
        assert!(forms[0].has_password_field);
        assert_eq!(forms[0].action, "/login");
        assert!(!forms[1].has_password_field);
        assert_eq!(forms[1].action, "/search");
        assert_eq!(forms[2].action, "");
    }
}
