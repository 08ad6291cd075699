//! Page fetching with HTML to text conversion

use crate::error::{Result, SourceError};
use crate::services::PageFetcher;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Fetches pages over HTTP and strips them to text
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Fetching page {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::status("page fetch", status, url.to_string()));
        }

        let html = response.text().await?;
        Ok(html_to_text(&html))
    }
}

/// Blocks whose content is never visible
static INVISIBLE_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)<script[^>]*>.*?</script>",
        r"(?is)<style[^>]*>.*?</style>",
        r"(?is)<noscript[^>]*>.*?</noscript>",
        r"(?s)<!--.*?-->",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static BLOCK_END: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)</(p|h[1-6]|section|article|table)>").ok());
static LINE_END: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</(div|li|tr)>").ok());
static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());
static INLINE_SPACE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f\v]+").ok());
static BLANK_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n{3,}").ok());

fn replace_all(re: Option<&Regex>, text: String, with: &str) -> String {
    match re {
        Some(re) => re.replace_all(&text, with).into_owned(),
        None => text,
    }
}

/// Convert HTML to plain text, keeping paragraph breaks as blank lines
pub fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    for re in INVISIBLE_BLOCKS.iter() {
        text = re.replace_all(&text, "").into_owned();
    }

    text = replace_all(BLOCK_END.as_ref(), text, "\n\n");
    text = replace_all(LINE_END.as_ref(), text, "\n");
    text = replace_all(TAG.as_ref(), text, "");

    text = decode_entities(&text);

    text = replace_all(INLINE_SPACE.as_ref(), text, " ");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    text = replace_all(BLANK_RUN.as_ref(), lines.join("\n"), "\n\n");

    text.trim().to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&#x27;", "'")
        .replace("&rsquo;", "'")
        .replace("&mdash;", "-")
        .replace("&ndash;", "-")
        .replace("&amp;", "&")
}
