//! HTTP resolver for Anthropic-messages compatible endpoints
//!
//! Builds a closed-world prompt (numbered candidate list, a few confirmed
//! examples) and parses the JSON answer. Requests are spaced by a minimum
//! interval; there are no automatic retries.

use async_trait::async_trait;
use pcm_common::config::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::resolver::{parse_proposal, Resolver, ResolverError, ResolverProposal, ResolverRequest, TokenUsage};

const USER_AGENT: &str = concat!("pcm-matcher/", env!("CARGO_PKG_VERSION"));
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_HISTORY_EXAMPLES: usize = 5;

const SYSTEM_PROMPT: &str = "你是一个专业的医药连锁名称匹配助手。

核心原则：
1. 严禁编造简称，所有简称必须来自候选库
2. 省份必须严格匹配，只能从目标省份的候选库中选择
3. 找不到匹配时留空，必须返回空值或 null

输出要求：
- 始终返回有效的 JSON 格式
- 简称必须完全匹配候选库中的某一项
- 理由要简洁明了";

/// Minimum spacing between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Resolver rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl MessagesResponse {
    /// Concatenated text blocks; thinking blocks are ignored
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Prompt for one item
pub fn build_prompt(request: &ResolverRequest) -> String {
    let mut prompt = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(prompt, "请将以下连锁药店全称匹配到正确的简称。\n");
    let _ = writeln!(prompt, "## 目标省份\n{}\n", request.province);
    let _ = writeln!(prompt, "## 连锁药店全称\n{}\n", request.full_name);
    let _ = writeln!(prompt, "## 候选简称库（必须从中选择）");
    for (i, label) in request.candidates.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, label);
    }

    if !request.history.is_empty() {
        let _ = writeln!(prompt, "\n## 历史确认案例");
        for example in request.history.iter().take(MAX_HISTORY_EXAMPLES) {
            let _ = writeln!(
                prompt,
                "  - 全称: {}\n    简称: {}\n    确认次数: {}",
                example.full_name, example.label, example.count
            );
        }
    }

    let _ = write!(
        prompt,
        "\n## 任务要求\n\
         1. 严格约束：只能从上述候选简称库中选择，严禁编造或使用库外简称\n\
         2. 省份匹配：简称必须属于目标省份【{}】\n\
         3. 找不到匹配时留空：如果候选库中没有合适的简称，必须返回空值（null 或空字符串）\n\n\
         ## 输出格式\n\
         请严格按照以下 JSON 格式输出：\n\
         {{\"abbreviation\": \"选择的简称或空字符串\", \"confidence\": \"High/Medium/Low\", \"reasoning\": \"选择理由（简要说明）\"}}\n",
        request.province
    );

    prompt
}

/// Resolver backed by an LLM messages endpoint
pub struct LlmResolver {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmResolver {
    pub fn new(api_key: String, config: &ResolverConfig) -> Result<Self, ResolverError> {
        if api_key.trim().is_empty() {
            return Err(ResolverError::NotConfigured("empty API key".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResolverError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(config.min_interval_ms)),
            api_key,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Resolver for LlmResolver {
    fn name(&self) -> &str {
        &self.model
    }

    async fn propose(&self, request: &ResolverRequest) -> Result<ResolverProposal, ResolverError> {
        self.rate_limiter.wait().await;

        let prompt = build_prompt(request);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };

        tracing::debug!(
            province = %request.province,
            full_name = %request.full_name,
            candidates = request.candidates.len(),
            history = request.history.len(),
            "Querying resolver"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolverError::NetworkError(e.to_string()))?;

        let status = response.status();

        if status == 401 {
            return Err(ResolverError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ResolverError::ApiError(status.as_u16(), error_text));
        }

        let messages: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ResolverError::ParseError(e.to_string()))?;

        let mut proposal = parse_proposal(&messages.text())?;
        proposal.model = messages.model.or_else(|| Some(self.model.clone()));
        proposal.usage = messages.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
        });

        tracing::debug!(
            label = proposal.label.as_deref().unwrap_or(""),
            confidence = %proposal.confidence,
            "Resolver answered"
        );

        Ok(proposal)
    }
}
