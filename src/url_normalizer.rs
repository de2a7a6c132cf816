use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::interpreter::strip_code_fences;
use crate::llm_gateway::{user_message, CompletionApi};

static URL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("url regex"));
static DOUBLED_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://(https?://)+").expect("scheme regex"));

fn build_url_prompt(site_input: &str) -> String {
    format!(
        r#"Given the website input: "{site_input}"

Return ONLY a valid, complete URL with proper format.

Rules:
1. Return ONLY the URL, nothing else
2. Must start with https://
3. Use correct domain extension (.com, .org, .net, .io, etc.)
4. For popular sites, use the exact correct URL
5. No www duplication
6. Clean, single URL only

Examples:
Input: "youtube" -> Output: https://www.youtube.com
Input: "gmail" -> Output: https://mail.google.com
Input: "github" -> Output: https://github.com
Input: "reddit" -> Output: https://www.reddit.com

Now process: "{site_input}"

Return ONLY the URL:"#
    )
}

/// Deterministic last resort when the gateway gives us nothing. Known to be
/// wrong for sites whose canonical domain is not `www.<name>.com`; kept as
/// intended degradation.
pub fn fallback_url(site_input: &str) -> String {
    if site_input.starts_with("http") {
        site_input.to_string()
    } else {
        format!("https://www.{site_input}.com")
    }
}

/// Repair a model-produced URL string: fence strip, pick the first URL token
/// out of any surrounding prose, force a scheme, collapse doubled schemes.
pub fn sanitize_url(raw: &str) -> String {
    let mut url = strip_code_fences(raw);

    if let Some(found) = URL_TOKEN.find(&url) {
        url = found.as_str().to_string();
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("https://{url}");
    }

    DOUBLED_SCHEME.replace_all(&url, "https://").to_string()
}

pub struct UrlNormalizer {
    llm: Arc<dyn CompletionApi>,
}

impl UrlNormalizer {
    pub fn new(llm: Arc<dyn CompletionApi>) -> Self {
        Self { llm }
    }

    /// Always returns a usable URL. Never fails.
    pub async fn resolve(&self, site_input: &str) -> String {
        let prompt = build_url_prompt(site_input);
        match self.llm.call(user_message(&prompt), false).await {
            Ok(response) if !response.trim().is_empty() => {
                let url = sanitize_url(&response);
                info!(%url, input = site_input, "constructed URL");
                url
            }
            Ok(_) => fallback_url(site_input),
            Err(err) => {
                warn!(%err, input = site_input, "URL construction failed, using fallback");
                fallback_url(site_input)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::tests::StubApi;

    #[test]
    fn schemeless_answer_gets_https() {
        assert_eq!(sanitize_url("github.com"), "https://github.com");
    }

    #[test]
    fn doubled_scheme_collapses_to_one() {
        assert_eq!(sanitize_url("https://https://example.com"), "https://example.com");
        assert_eq!(sanitize_url("https://http://example.com"), "https://example.com");
    }

    #[test]
    fn url_is_extracted_from_prose() {
        let url = sanitize_url("The URL you want is https://www.reddit.com — enjoy!");
        assert_eq!(url, "https://www.reddit.com");
    }

    #[test]
    fn fenced_answer_is_unwrapped() {
        assert_eq!(sanitize_url("```\nhttps://github.com\n```"), "https://github.com");
    }

    #[test]
    fn fallback_shape_is_preserved() {
        assert_eq!(fallback_url("github"), "https://www.github.com");
        assert_eq!(fallback_url("http://already.example"), "http://already.example");
    }

    #[tokio::test]
    async fn resolve_uses_fallback_on_gateway_failure() {
        let normalizer = UrlNormalizer::new(StubApi::fail("timeout"));
        assert_eq!(normalizer.resolve("github").await, "https://www.github.com");
    }

    #[tokio::test]
    async fn resolve_sanitizes_gateway_answer() {
        let normalizer = UrlNormalizer::new(StubApi::ok("https://https://github.com"));
        let url = normalizer.resolve("github").await;
        assert!(url.starts_with("https://"));
        assert!(url.contains("github"));
        assert_eq!(url.matches("https://").count(), 1);
    }

    #[tokio::test]
    async fn empty_answer_falls_back() {
        let normalizer = UrlNormalizer::new(StubApi::ok("   "));
        assert_eq!(normalizer.resolve("github").await, "https://www.github.com");
    }
}
