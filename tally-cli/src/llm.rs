use anyhow::{Context, Result, anyhow, bail};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tally_categorise::CompletionModel;
use tracing::debug;

use crate::config::ModelSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAI,
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" | "openai-compatible" => Ok(Provider::OpenAI),
            other => bail!("unknown model provider: {other} (expected ollama or openai)"),
        }
    }
}

/// HTTP client for one configured model endpoint.
#[derive(Debug, Clone)]
pub struct ModelClient {
    provider: Provider,
    model: String,
    base_url: String,
    temperature: f32,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl ModelClient {
    pub fn from_config(section: &ModelSection) -> Result<Self> {
        let provider: Provider = section.provider.parse()?;
        let api_key = match &section.api_key_env {
            Some(var) => Some(std::env::var(var).with_context(|| format!("{var} is not set"))?),
            None => None,
        };
        if provider == Provider::OpenAI && api_key.is_none() {
            bail!("provider openai needs [model].api_key_env");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            provider,
            model: section.model.clone(),
            base_url: section.base_url.trim_end_matches('/').to_string(),
            temperature: section.temperature,
            api_key,
            http,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete_async(&self, prompt: &str) -> Result<String> {
        match self.provider {
            Provider::Ollama => self.ollama_generate(prompt).await,
            Provider::OpenAI => self.openai_complete(prompt).await,
        }
    }

    async fn ollama_generate(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Options {
            temperature: f32,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: Options,
        }

        #[derive(Deserialize)]
        struct Resp {
            response: String,
        }

        let body = Req {
            model: &self.model,
            prompt,
            stream: false,
            options: Options {
                temperature: self.temperature,
            },
        };

        let resp = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("ollama request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("ollama error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse ollama response")?;
        Ok(out.response.trim().to_string())
    }

    async fn openai_complete(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("missing api key for {}", self.base_url))?;

        let body = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .json(&body)
            .send()
            .await
            .context("openai request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("openai error: {status} {txt}");
        }

        let out: Resp = resp.json().await.context("parse openai response")?;
        let content = out
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

impl CompletionModel for ModelClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        debug!(provider = ?self.provider, model = %self.model, chars = prompt.len(), "model request");
        // Batches call in from blocking worker threads of the CLI runtime.
        // Without a runtime (library use), run a private one.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(self.complete_async(prompt)))
        } else {
            let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
            rt.block_on(self.complete_async(prompt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names() {
        assert_eq!("ollama".parse::<Provider>().unwrap(), Provider::Ollama);
        assert_eq!(" OpenAI ".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert_eq!("openai-compatible".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert!("anthropic".parse::<Provider>().is_err());
    }

    #[test]
    fn test_default_section_builds_ollama_client() {
        let client = ModelClient::from_config(&ModelSection::default()).unwrap();
        assert_eq!(client.provider(), Provider::Ollama);
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_openai_requires_key_variable() {
        let section = ModelSection {
            provider: "openai".into(),
            api_key_env: None,
            ..Default::default()
        };
        assert!(ModelClient::from_config(&section).is_err());

        let section = ModelSection {
            provider: "openai".into(),
            api_key_env: Some("TALLY_TEST_KEY_THAT_IS_NEVER_SET".into()),
            ..Default::default()
        };
        let err = ModelClient::from_config(&section).unwrap_err();
        assert!(err.to_string().contains("TALLY_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
