//! Chat assistant and product suggestions backed by the Gemini
//! `generateContent` REST endpoint

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::dataset::CLASS_SEPARATOR;
use crate::diagnosis::labels::title_case;
use crate::diagnosis::{parse_suggested_products, recommended_products, Product};
use crate::utils::error::{CropCareError, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Reply when no API key is configured
pub const NO_KEY_REPLY: &str = "I see you're interested in Leaf Bot! To make me smart, I need a Gemini API Key. Please provide one to the developer variables.";

/// Reply when the upstream call fails
pub const APOLOGY_REPLY: &str =
    "😅 Oops! I'm having a bit of trouble thinking right now. Could you try asking again in a moment?";

const PERSONA: &str = "You are Leaf Bot 🌱, a friendly and knowledgeable agricultural assistant helping farmers and gardeners.

Your personality:
- Warm, enthusiastic, and encouraging
- Use relevant emojis naturally throughout your responses (🌾 🌻 🌿 🍅 🥕 🌧️ ☀️ 💧 🌡️ etc.)
- Keep responses concise but informative (2-4 sentences or bullet points)
- Use simple, clear language that farmers can easily understand
- Be practical and action-oriented";

const HINDI_INSTRUCTION: &str = "
IMPORTANT: The user has requested to communicate in Hindi.
- You MUST reply in Hindi (Devanagari script).
- Keep the same emoji-rich, friendly tone.
- Translate technical terms if needed but commonly used English terms in farming are okay if written in Hindi script.
";

/// Full prompt for one user message; `language == "hi"` asks for Hindi
pub fn build_chat_prompt(message: &str, language: &str) -> String {
    let lang_instruction = if language == "hi" { HINDI_INSTRUCTION } else { "" };
    format!(
        "{}\n{}\n\nUser's question: {}\n\nProvide a helpful, friendly response with appropriate emojis. Format your answer clearly with line breaks if listing multiple points.",
        PERSONA, lang_instruction, message
    )
}

const VARIETY_HINTS: [&str; 5] = [
    "Focus on different brands and price ranges",
    "Mix organic and chemical solutions",
    "Include both preventive and curative products",
    "Recommend products from different manufacturers",
    "Vary between traditional and modern solutions",
];

/// Prompt asking for three products for `class_name` as a JSON array
pub fn build_products_prompt(class_name: &str, variety_hint: &str) -> String {
    let (plant, disease) = match class_name.split_once(CLASS_SEPARATOR) {
        Some((plant, disease)) => (
            title_case(&plant.replace('_', " ")),
            title_case(&disease.replace('_', " ")),
        ),
        None => ("Unknown".to_string(), "Unknown".to_string()),
    };
    format!(
        "You are an agricultural expert recommending products for plant diseases.

Disease detected: {disease} in {plant}
Instruction: {variety_hint}

Recommend 3 different agricultural products that would be effective for treating this disease.
Use real, commercially available products in India from different brands, vary the product
types (Fungicide, Pesticide, Organic Solution, Bio-fertilizer, Equipment), give prices in
Indian Rupees (e.g. ₹450) and an Amazon.in search URL for each.

Format your response as a JSON array with this exact structure:
[
  {{\"name\": \"Brand Product Name\", \"type\": \"Product Type\", \"price\": \"₹XXX\", \"purchase_url\": \"https://www.amazon.in/s?k=product+name\"}}
]

Only return the JSON array, no additional text."
    )
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Thin async client for text generation
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("has_key", &self.has_key())
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send `prompt` and return the first candidate's text
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CropCareError::Chat("no API key configured".to_string()))?;

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CropCareError::Chat(e.to_string()))?
            .error_for_status()
            .map_err(|e| CropCareError::Chat(e.to_string()))?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CropCareError::Chat(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CropCareError::Chat("empty response from model".to_string()));
        }
        Ok(text)
    }

    /// Products for a predicted class; the static table when there is no
    /// key, the call fails or the reply holds no usable product list
    pub async fn recommend_products(&self, class_name: &str) -> Vec<Product> {
        if !self.has_key() {
            return recommended_products(class_name);
        }

        let hint = VARIETY_HINTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(VARIETY_HINTS[0]);
        match self.generate(&build_products_prompt(class_name, hint)).await {
            Ok(text) => parse_suggested_products(&text).unwrap_or_else(|| {
                warn!("No usable product list in model reply; using static products");
                recommended_products(class_name)
            }),
            Err(e) => {
                warn!("Product suggestion failed: {}; using static products", e);
                recommended_products(class_name)
            }
        }
    }

    /// Answer a user message; never fails, falls back to fixed texts
    pub async fn reply(&self, message: &str, language: &str) -> String {
        if !self.has_key() {
            return NO_KEY_REPLY.to_string();
        }

        debug!("Chat request ({} chars, language {})", message.len(), language);
        match self.generate(&build_chat_prompt(message, language)).await {
            Ok(text) => text,
            Err(e) => {
                error!("Chat error: {}", e);
                APOLOGY_REPLY.to_string()
            }
        }
    }
}
