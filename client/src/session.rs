//! One text in, directed speech out.

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use prosody_protocol::{GenerateRequest, Segment};

use crate::speech::{speak_segments, Speaker};

/// What happened to a line of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// Blank input, nothing was sent.
    Ignored,
    /// This many segments were queued for speech.
    Queued(usize),
    /// The server answered with something other than a segment array.
    InvalidFormat,
}

pub struct Session<S> {
    http: reqwest::Client,
    endpoint: String,
    speaker: S,
}

impl<S: Speaker> Session<S> {
    pub fn new(endpoint: impl Into<String>, speaker: S) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            speaker,
        }
    }

    /// POST the text to the prosody endpoint and return the raw JSON reply.
    pub async fn fetch(&self, text: &str) -> Result<Value> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&GenerateRequest::new(text))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "API Error: {}",
                status.canonical_reason().unwrap_or(status.as_str())
            );
        }

        Ok(response.json().await?)
    }

    /// Fetch directions for `text`, print them and speak the segments.
    pub async fn speak_text(&mut self, text: &str) -> Result<Playback> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Playback::Ignored);
        }

        println!("Analyzing text and generating speech...");
        let start = std::time::Instant::now();
        let reply = self.fetch(text).await?;
        debug!("Fetched directions in {:?}", start.elapsed());

        println!("{}", serde_json::to_string_pretty(&reply)?);

        if !reply.is_array() {
            self.speaker.cancel()?;
            println!("\nError: Invalid data format from API.");
            return Ok(Playback::InvalidFormat);
        }

        let segments: Vec<Segment> =
            serde_json::from_value(reply).context("segments have an unexpected shape")?;
        let queued = speak_segments(&mut self.speaker, &segments)?;
        info!("Queued {} segments", queued);
        let speaker = &mut self.speaker;
        tokio::task::block_in_place(|| speaker.wait_until_done())?;

        Ok(Playback::Queued(queued))
    }

    /// Speak one text and report how it went as a process exit code.
    pub async fn speak_once(&mut self, text: &str) -> ExitCode {
        match self.speak_text(text).await {
            Ok(Playback::InvalidFormat) => ExitCode::FAILURE,
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                println!("Error: {}", e);
                ExitCode::FAILURE
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn speaker(&self) -> &S {
        &self.speaker
    }
}
