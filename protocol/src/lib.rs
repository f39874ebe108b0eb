//! Shared protocol definitions for Prosody client-server communication.
//!
//! The protocol is simple:
//! - Client sends: JSON body `{"text": "..."}` to [`DEFAULT_ENDPOINT_PATH`]
//! - Server returns: the model's JSON reply (normally an array of
//!   [`Segment`]s), or an [`ErrorResponse`]
//!
//! The server builds its model prompt with [`build_prompt`] and turns the
//! model's reply into JSON with [`parse_reply`]. Clients read segments out of
//! it with [`parse_segments`] or `serde_json::from_value`.

use std::ops::RangeInclusive;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Path the server mounts the prosody endpoint on.
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/generateProsody";

/// Pitch range the model is asked to stay within.
pub const PITCH_RANGE: RangeInclusive<f32> = 0.5..=1.5;
/// Rate range the model is asked to stay within.
pub const RATE_RANGE: RangeInclusive<f32> = 0.8..=1.2;

/// Hard limits accepted by a web-style speech synthesizer.
pub const SYNTH_PITCH_LIMITS: RangeInclusive<f32> = 0.0..=2.0;
pub const SYNTH_RATE_LIMITS: RangeInclusive<f32> = 0.1..=10.0;
pub const SYNTH_VOLUME_LIMITS: RangeInclusive<f32> = 0.0..=1.0;

/// Error messages returned to clients.
pub const MSG_METHOD_NOT_ALLOWED: &str = "Method Not Allowed";
pub const MSG_TEXT_REQUIRED: &str = "Text is required in the request body.";
pub const MSG_GENERATION_FAILED: &str = "Failed to generate speech prosody.";

/// Request from client to server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The text to direct. Usually a string, but any JSON value is accepted;
    /// falsy values are rejected by the server.
    #[serde(default)]
    pub text: Option<Value>,
}

impl GenerateRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(Value::String(text.into())),
        }
    }

    /// The text as it goes into the prompt, or `None` when it is missing,
    /// `null`, `false`, `0` or `""`.
    pub fn prompt_text(&self) -> Option<String> {
        let text = self.text.as_ref()?;
        if is_falsy(text) {
            return None;
        }
        Some(to_js_string(text))
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0 || f.is_nan()),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Render a JSON value the way string interpolation would in a browser.
fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Speech parameters for one segment, in web speech synthesis units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProsodyParams {
    /// 1.0 is the voice's normal pitch
    #[serde(default = "default_param", deserialize_with = "param_or_default")]
    pub pitch: f32,
    /// 1.0 is the voice's normal speaking rate
    #[serde(default = "default_param", deserialize_with = "param_or_default")]
    pub rate: f32,
    /// 0.0 (silent) to 1.0 (full)
    #[serde(default = "default_param", deserialize_with = "param_or_default")]
    pub volume: f32,
}

fn default_param() -> f32 {
    1.0
}

/// An explicit `null` counts as missing.
fn param_or_default<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or_else(default_param))
}

impl Default for ProsodyParams {
    fn default() -> Self {
        Self {
            pitch: default_param(),
            rate: default_param(),
            volume: default_param(),
        }
    }
}

impl ProsodyParams {
    pub fn new(pitch: f32, rate: f32, volume: f32) -> Self {
        Self {
            pitch,
            rate,
            volume,
        }
    }

    /// Clamp every parameter into what a synthesizer accepts.
    pub fn clamped(self) -> Self {
        Self {
            pitch: clamp_or_default(self.pitch, &SYNTH_PITCH_LIMITS),
            rate: clamp_or_default(self.rate, &SYNTH_RATE_LIMITS),
            volume: clamp_or_default(self.volume, &SYNTH_VOLUME_LIMITS),
        }
    }
}

fn clamp_or_default(value: f32, limits: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        return default_param();
    }
    value.clamp(*limits.start(), *limits.end())
}

/// One expressive piece of the input text and how to voice it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment: String,
    #[serde(default)]
    pub params: ProsodyParams,
}

impl Segment {
    pub fn new(segment: impl Into<String>, params: ProsodyParams) -> Self {
        Self {
            segment: segment.into(),
            params,
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("model reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Build the speech director prompt for `text`.
pub fn build_prompt(text: &str) -> String {
    format!(
        "You are a speech director AI. Your task is to take a sentence, break it into \
expressive segments, and assign speech parameters (pitch, rate, volume) to each segment \
to make it sound natural and emotional.
  - The 'pitch' should be between {} and {}.
  - The 'rate' should be between {} and {}.
  - Respond ONLY with a valid JSON array of objects, where each object contains a 'segment' and its 'params'.
  Text: \"{}\"",
        PITCH_RANGE.start(),
        PITCH_RANGE.end(),
        RATE_RANGE.start(),
        RATE_RANGE.end(),
        text
    )
}

const FENCE: &str = "```";
const JSON_TAG: &str = "json\n";

/// Remove markdown code fences the model likes to wrap JSON in.
///
/// Every "```json\n" and every other "```" is dropped, then the result is
/// trimmed.
pub fn strip_code_fence(reply: &str) -> String {
    let mut out = String::with_capacity(reply.len());
    let mut rest = reply;
    while let Some(idx) = rest.find(FENCE) {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + FENCE.len()..];
        if let Some(after_tag) = rest.strip_prefix(JSON_TAG) {
            rest = after_tag;
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Strip fences from a raw model reply and parse whatever JSON is left.
pub fn parse_reply(reply: &str) -> Result<Value, ProtocolError> {
    let cleaned = strip_code_fence(reply);
    Ok(serde_json::from_str(&cleaned)?)
}

/// Strip fences from a raw model reply and parse it as segments.
pub fn parse_segments(reply: &str) -> Result<Vec<Segment>, ProtocolError> {
    let cleaned = strip_code_fence(reply);
    Ok(serde_json::from_str(&cleaned)?)
}
