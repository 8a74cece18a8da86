use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::tools::{DetailFetcher, PageDetail, ToolError};

const STORAGE_SIZES_GB: &[u32] = &[32, 64, 128, 256, 512, 1024];

/// Fetches product pages and pulls model and storage out of the HTML.
/// Never fails: transport and status errors come back as `ok == false`.
pub struct HttpDetailFetcher {
    http: reqwest::Client,
    patterns: PagePatterns,
}

struct PagePatterns {
    storage: Regex,
    microdata_model: Regex,
    json_ld_model: Regex,
}

impl PagePatterns {
    fn compile() -> Result<Self, ToolError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|error| ToolError::Unsupported(error.to_string()))
        };

        Ok(Self {
            storage: compile(
                r"(?i)([0-9٠-٩]{1,4})\s*(GB|TB|جيجابايت|جيجا|غيغابايت|تيرابايت|تيرا)",
            )?,
            microdata_model: compile(
                r#"(?i)itemprop\s*=\s*["']model["'][^>]*content\s*=\s*["']([^"']+)["']"#,
            )?,
            json_ld_model: compile(r#""model"\s*:\s*"([^"]+)""#)?,
        })
    }

    fn storage(&self, html: &str) -> Option<String> {
        self.storage.captures_iter(html).find_map(|captures| {
            let amount = ascii_digits(captures.get(1)?.as_str()).parse::<u32>().ok()?;
            let unit = captures.get(2)?.as_str().to_lowercase();
            let is_tb = unit == "tb" || unit.starts_with("تيرا");

            if is_tb {
                (1..=8).contains(&amount).then(|| format!("{amount}TB"))
            } else {
                STORAGE_SIZES_GB.contains(&amount).then(|| format!("{amount}GB"))
            }
        })
    }

    fn model(&self, html: &str) -> Option<String> {
        [&self.microdata_model, &self.json_ld_model]
            .into_iter()
            .find_map(|pattern| pattern.captures(html))
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

fn ascii_digits(raw: &str) -> String {
    raw.chars()
        .map(|character| match character {
            '٠'..='٩' => char::from(b'0' + (character as u32 - '٠' as u32) as u8),
            other => other,
        })
        .collect()
}

impl HttpDetailFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; concierge/0.1)")
            .build()?;
        Ok(Self { http, patterns: PagePatterns::compile()? })
    }

    async fn fetch_html(&self, url: &str) -> Result<String, ToolError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status { status: status.as_u16(), body: String::new() });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl DetailFetcher for HttpDetailFetcher {
    async fn fetch_detail(&self, url: &str) -> PageDetail {
        match self.fetch_html(url).await {
            Ok(html) => PageDetail::found(self.patterns.model(&html), self.patterns.storage(&html)),
            Err(error) => PageDetail::failed(error.to_string()),
        }
    }
}
