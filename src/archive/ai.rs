//! AI text classifier used as the last resort for folders and files.
//!
//! Answers must be a single token from a closed set.
//! Anything else, including request failures and timeouts, is treated as no decision.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use itertools::Itertools;
use reqwest::Client;
use serde_json::Value;

use crate::archive::category::Category;
use crate::archive::config::AiConfig;
use crate::print_warning;

/// Characters of extracted text included in a file prompt.
const PROMPT_EXCERPT_CHARS: usize = 300;

const FOLDER_SYSTEM_PROMPT: &str = "You are a film archivist. You decide whether a folder holds the material of one \
specific film or general resources. Answer only FILM or NON_FILM.";

/// Chat completion service.
pub trait CompletionBackend: Send + Sync {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// OpenAI compatible chat completions endpoint.
#[derive(Debug)]
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

/// What the classifier sees of a file.
#[derive(Debug, Clone, Default)]
pub struct FileRequest<'a> {
    pub file_name: &'a str,
    pub relative_path: &'a str,
    pub extension: &'a str,
    pub excerpt: Option<&'a str>,
    pub metadata: Option<String>,
}

/// What the classifier sees of a folder.
#[derive(Debug, Clone, Default)]
pub struct FolderRequest {
    pub folder_name: String,
    pub sample_subdirs: Vec<String>,
    pub sample_files: Vec<String>,
}

/// Classifier wrapping a completion backend with a per-call timeout.
#[derive(Clone)]
pub struct AiClassifier {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
}

impl OpenAiBackend {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    /// Returns an error if the API key variable is not set or the HTTP client cannot be built.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env)
            .with_context(|| format!("Environment variable {} is not set", config.api_key_env))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn chat(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": 20,
            "temperature": 0.1,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Completion request failed with status {status}");
        }

        let json: Value = response.json().await.context("Failed to parse completion response")?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .context("Completion response missing message content")
    }
}

impl CompletionBackend for OpenAiBackend {
    fn complete<'a>(&'a self, system: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.chat(system, prompt))
    }
}

impl AiClassifier {
    #[must_use]
    pub fn new(backend: Arc<dyn CompletionBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Classifier for the configured endpoint, or `None` when AI is disabled or unavailable.
    #[must_use]
    pub fn from_config(config: &AiConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        match OpenAiBackend::from_config(config) {
            Ok(backend) => Some(Self::new(Arc::new(backend), Duration::from_secs(config.timeout_secs.max(1)))),
            Err(error) => {
                print_warning!("AI classification disabled: {error:#}");
                None
            }
        }
    }

    /// Ask for exactly one category name. Invalid answers and failures give `None`.
    pub async fn classify_file(&self, request: &FileRequest<'_>) -> Option<Category> {
        let system = format!(
            "You are an expert film archivist. Classify the given file into one of these categories: {}.",
            Category::ALL.iter().map(|category| category.as_str()).join(", ")
        );
        let prompt = file_prompt(request);
        let answer = self.ask(&system, &prompt, request.file_name).await?;
        answer.parse::<Category>().ok()
    }

    /// Ask whether a folder is a single film. `None` when there is no usable answer.
    pub async fn classify_folder(&self, request: &FolderRequest) -> Option<bool> {
        let prompt = folder_prompt(request);
        let answer = self.ask(FOLDER_SYSTEM_PROMPT, &prompt, &request.folder_name).await?;
        parse_folder_answer(&answer)
    }

    async fn ask(&self, system: &str, prompt: &str, subject: &str) -> Option<String> {
        match tokio::time::timeout(self.timeout, self.backend.complete(system, prompt)).await {
            Ok(Ok(answer)) => Some(answer),
            Ok(Err(error)) => {
                print_warning!("AI request failed for {subject}: {error:#}");
                None
            }
            Err(_) => {
                print_warning!("AI request timed out for {subject}");
                None
            }
        }
    }
}

fn file_prompt(request: &FileRequest<'_>) -> String {
    let mut context = format!(
        "Extension: .{}\nRelative path: {}",
        request.extension, request.relative_path
    );
    if let Some(excerpt) = request.excerpt {
        context.push_str(&format!(
            "\nText excerpt: {}",
            crate::truncate_chars(excerpt, PROMPT_EXCERPT_CHARS)
        ));
    }
    if let Some(metadata) = &request.metadata {
        context.push_str(&format!("\nImage metadata: {metadata}"));
    }

    let categories = Category::ALL
        .iter()
        .map(|category| format!("- {} ({})", category.as_str(), category.description()))
        .join("\n");

    format!(
        "Classify this file into the most appropriate category. \
Use the name, path, extension and any extracted content.\n\n\
File name: {}\n{context}\n\n\
Choose ONE category from this list, with exactly this spelling:\n{categories}\n\n\
Answer ONLY with the category name.",
        request.file_name
    )
}

fn folder_prompt(request: &FolderRequest) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(", ")
        }
    };
    format!(
        "Does this folder hold the material of ONE specific film, or is it a collection, \
resources, administration or some other general folder?\n\n\
Folder name: {}\nSubfolders (sample): {}\nFiles (sample): {}\n\n\
Answer FILM for a single film folder and NON_FILM in every other case.",
        request.folder_name,
        list(&request.sample_subdirs),
        list(&request.sample_files)
    )
}

fn parse_folder_answer(answer: &str) -> Option<bool> {
    let token = answer
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
        .to_uppercase();
    match token.as_str() {
        "FILM" => Some(true),
        "NON_FILM" => Some(false),
        _ => None,
    }
}
