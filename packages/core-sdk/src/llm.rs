use std::future::Future;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Settings;

/** \brief Public Gemini endpoint. */
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
/** \brief Model used for every completion. */
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/**
 * \brief Instructions prepended to every user prompt.
 */
pub const ADVISOR_PREAMBLE: &str = "You are an AI Financial Advisor specializing in personal finance, investments, \
and financial planning. Provide helpful, accurate, and ethical financial advice. \
Focus on educational content rather than specific investment recommendations. \
When uncertain, acknowledge limitations and suggest consulting professional advisors. \
Always prioritize the user's financial well-being.";

const API_KEY_HEADER: &str = "x-goog-api-key";

/**
 * \brief Why a completion produced no text.
 * \details The controller shows the same apology for every variant.
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionFailure {
    #[error("no API key available")]
    MissingCredential,
    #[error("completion endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("completion rejected: {0}")]
    Rejected(String),
}

/**
 * \brief One request/response cycle against a language model.
 * \details One attempt per call, no retries, no timeout, no cancellation.
 */
pub trait CompletionClient {
    fn complete(
        &self,
        user_text: &str,
        secret: &str,
    ) -> impl Future<Output = Result<String, CompletionFailure>> + Send;
}

/**
 * \brief Prompt actually sent: preamble, blank line, then the user's query.
 */
pub fn compose_prompt(user_text: &str) -> String {
    format!("{}\n\nUser query: {}", ADVISOR_PREAMBLE, user_text)
}

/**
 * \brief Client for the Gemini `generateContent` API.
 */
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_base: String,
    model: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_base: &str, model: &str) -> Self {
        Self {
            api_base: api_base.to_string(),
            model: model.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.api_base, &settings.model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            normalize_gemini_base(&self.api_base),
            self.model
        )
    }

    /**
     * \brief Send `preamble + user_text` and return the candidate text.
     */
    pub async fn generate(&self, user_text: &str, secret: &str) -> Result<String, CompletionFailure> {
        if secret.trim().is_empty() {
            return Err(CompletionFailure::MissingCredential);
        }
        let headers = auth_headers(secret)?;
        let body = build_request_body(&compose_prompt(user_text));

        let resp = self
            .http
            .post(self.generate_url())
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionFailure::Unreachable(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CompletionFailure::Rejected(format!("{} -> {}", status, text)));
        }
        let v: Value = resp.json().await.map_err(|e| {
            CompletionFailure::Rejected(format!("malformed response: {}", e.without_url()))
        })?;
        if let Some(reason) = block_reason(&v) {
            return Err(CompletionFailure::Rejected(format!("prompt blocked: {}", reason)));
        }
        let text = extract_gemini_content(&v);
        if text.trim().is_empty() {
            return Err(CompletionFailure::Rejected("empty response".to_string()));
        }
        Ok(text)
    }

    /**
     * \brief List models visible to `secret`; used as a health check.
     */
    pub async fn list_models(&self, secret: &str) -> Result<Vec<String>> {
        let url = format!("{}/models", normalize_gemini_base(&self.api_base));
        let headers = auth_headers(secret).map_err(|e| anyhow!("{}", e))?;
        let resp = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| e.without_url())?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("gemini list models failed: {} -> {}", status, text));
        }
        parse_gemini_model_list(resp.json().await?)
    }
}

impl CompletionClient for GeminiClient {
    async fn complete(&self, user_text: &str, secret: &str) -> Result<String, CompletionFailure> {
        self.generate(user_text, secret).await
    }
}

/**
 * \brief Offline advisor answering from a fixed set of topics.
 * \details Useful without an API key; never fails.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedAdvisor;

impl CannedAdvisor {
    pub fn reply(&self, user_text: &str) -> &'static str {
        let q = user_text.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|w| q.contains(w));
        if mentions(&["sip", "mutual fund"]) {
            "SIPs (Systematic Investment Plans) are a great way to invest in mutual funds. They allow you to invest small amounts regularly, typically monthly, which helps in reducing the average cost of investment through rupee cost averaging. I recommend starting with index funds for beginners due to their lower expense ratios and market-matching returns."
        } else if mentions(&["stock", "shares"]) {
            "When investing in stocks, it's important to focus on companies with strong fundamentals, good management, and growth potential. Consider diversifying your portfolio across different sectors to manage risk. Currently, the technology and healthcare sectors are showing strong performance in the market."
        } else if mentions(&["gold", "silver"]) {
            "Gold and silver can be good diversification assets in your portfolio. They often act as a hedge against inflation and economic uncertainty. You can invest in physical metals, ETFs, or sovereign gold bonds. Sovereign gold bonds offer the additional benefit of 2.5% annual interest along with potential capital appreciation."
        } else if mentions(&["budget", "expense"]) {
            "Creating a budget is essential for financial health. Consider using the 50-30-20 rule: 50% for needs, 30% for wants, and 20% for savings and debt repayment. Track your expenses regularly and look for areas where you can reduce spending without significantly impacting your lifestyle."
        } else {
            "I'd be happy to help with your financial queries. You can ask me about investments, SIPs, mutual funds, stocks, market trends, budgeting, or financial planning. What specific aspect of your finances would you like to explore?"
        }
    }
}

impl CompletionClient for CannedAdvisor {
    async fn complete(&self, user_text: &str, _secret: &str) -> Result<String, CompletionFailure> {
        Ok(self.reply(user_text).to_string())
    }
}

fn auth_headers(secret: &str) -> Result<HeaderMap, CompletionFailure> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut key = HeaderValue::from_str(secret.trim()).map_err(|_| {
        CompletionFailure::Rejected("API key contains invalid characters".to_string())
    })?;
    key.set_sensitive(true);
    headers.insert(API_KEY_HEADER, key);
    Ok(headers)
}

fn build_request_body(prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{"text": prompt}]
        }]
    })
}

fn block_reason(v: &Value) -> Option<String> {
    v.get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
}

fn extract_gemini_content(v: &Value) -> String {
    if let Some(candidates) = v.get("candidates").and_then(|c| c.as_array()) {
        if let Some(first) = candidates.first() {
            if let Some(parts) = first
                .get("content")
                .and_then(|c| c.get("parts"))
                .and_then(|p| p.as_array())
            {
                return parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("");
            }
            if let Some(text) = first.get("output").and_then(|t| t.as_str()) {
                return text.to_string();
            }
        }
    }
    v.get("text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string()
}

fn normalize_gemini_base(api_base: &str) -> String {
    let trimmed = api_base.trim_end_matches('/');
    if trimmed.ends_with("/v1")
        || trimmed.ends_with("/v1beta")
        || trimmed.contains("/v1/")
        || trimmed.contains("/v1beta/")
    {
        trimmed.to_string()
    } else {
        format!("{}/v1beta", trimmed)
    }
}

fn parse_gemini_model_list(v: Value) -> Result<Vec<String>> {
    if let Some(arr) = v.get("models").and_then(|x| x.as_array()) {
        Ok(arr
            .iter()
            .filter_map(|item| {
                item.get("name")
                    .and_then(|s| s.as_str())
                    .or_else(|| item.get("id").and_then(|s| s.as_str()))
            })
            .map(|s| s.to_string())
            .collect())
    } else {
        Err(anyhow!("unexpected gemini models payload: {}", v))
    }
}
