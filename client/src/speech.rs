//! Speech output for directed segments
//!
//! Segments are queued one utterance each, in order, on a [`Speaker`].
//! With the `native-tts` feature the platform's own synthesizer does the
//! talking; otherwise utterances are printed as a transcript.

use std::io::Write;

use anyhow::Result;

use prosody_protocol::{ProsodyParams, Segment};

/// One queued piece of speech.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub params: ProsodyParams,
}

impl From<&Segment> for Utterance {
    fn from(segment: &Segment) -> Self {
        Self {
            text: segment.segment.clone(),
            params: segment.params.clamped(),
        }
    }
}

pub trait Speaker {
    /// Drop anything still queued.
    fn cancel(&mut self) -> Result<()>;

    /// Queue an utterance behind the ones already queued.
    fn enqueue(&mut self, utterance: &Utterance) -> Result<()>;

    /// Block until the queue has been spoken.
    fn wait_until_done(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: Speaker + ?Sized> Speaker for Box<S> {
    fn cancel(&mut self) -> Result<()> {
        (**self).cancel()
    }

    fn enqueue(&mut self, utterance: &Utterance) -> Result<()> {
        (**self).enqueue(utterance)
    }

    fn wait_until_done(&mut self) -> Result<()> {
        (**self).wait_until_done()
    }
}

/// Cancel pending speech, then queue every segment in order.
pub fn speak_segments<S: Speaker + ?Sized>(speaker: &mut S, segments: &[Segment]) -> Result<usize> {
    speaker.cancel()?;
    for segment in segments {
        speaker.enqueue(&Utterance::from(segment))?;
    }
    Ok(segments.len())
}

/// Writes utterances instead of speaking them.
pub struct TranscriptSpeaker<W> {
    out: W,
}

impl<W: Write> TranscriptSpeaker<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Speaker for TranscriptSpeaker<W> {
    fn cancel(&mut self) -> Result<()> {
        Ok(())
    }

    fn enqueue(&mut self, utterance: &Utterance) -> Result<()> {
        let p = utterance.params;
        writeln!(
            self.out,
            "[pitch {:.2} | rate {:.2} | volume {:.2}] {}",
            p.pitch, p.rate, p.volume, utterance.text
        )?;
        Ok(())
    }

    fn wait_until_done(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Scale a web-style factor (1.0 = normal) onto an engine's own range.
#[cfg(any(feature = "native-tts", test))]
fn scale_relative(factor: f32, normal: f32, min: f32, max: f32) -> f32 {
    (normal * factor).clamp(min, max)
}

/// Map a 0.0..=1.0 fraction onto an engine's own range.
#[cfg(any(feature = "native-tts", test))]
fn interpolate(fraction: f32, min: f32, max: f32) -> f32 {
    min + (max - min) * fraction.clamp(0.0, 1.0)
}

#[cfg(feature = "native-tts")]
pub use native::NativeSpeaker;

#[cfg(feature = "native-tts")]
mod native {
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use tts::{Features, Tts};

    use super::{interpolate, scale_relative, Speaker, Utterance};

    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// The platform speech synthesizer.
    pub struct NativeSpeaker {
        tts: Tts,
        features: Features,
    }

    impl NativeSpeaker {
        pub fn new() -> Result<Self> {
            let tts = Tts::default().map_err(|e| anyhow!("failed to start speech engine: {}", e))?;
            let features = tts.supported_features();
            Ok(Self { tts, features })
        }

        fn apply(&mut self, utterance: &Utterance) -> Result<()> {
            let p = utterance.params;
            if self.features.rate {
                let rate = scale_relative(
                    p.rate,
                    self.tts.normal_rate(),
                    self.tts.min_rate(),
                    self.tts.max_rate(),
                );
                self.tts.set_rate(rate).map_err(|e| anyhow!(e))?;
            }
            if self.features.pitch {
                let pitch = scale_relative(
                    p.pitch,
                    self.tts.normal_pitch(),
                    self.tts.min_pitch(),
                    self.tts.max_pitch(),
                );
                self.tts.set_pitch(pitch).map_err(|e| anyhow!(e))?;
            }
            if self.features.volume {
                let volume = interpolate(p.volume, self.tts.min_volume(), self.tts.max_volume());
                self.tts.set_volume(volume).map_err(|e| anyhow!(e))?;
            }
            Ok(())
        }
    }

    impl Speaker for NativeSpeaker {
        fn cancel(&mut self) -> Result<()> {
            if self.features.stop {
                self.tts.stop().map_err(|e| anyhow!(e))?;
            }
            Ok(())
        }

        fn enqueue(&mut self, utterance: &Utterance) -> Result<()> {
            self.apply(utterance)?;
            self.tts
                .speak(utterance.text.as_str(), false)
                .map_err(|e| anyhow!(e))?;
            Ok(())
        }

        fn wait_until_done(&mut self) -> Result<()> {
            if !self.features.is_speaking {
                return Ok(());
            }
            loop {
                std::thread::sleep(POLL_INTERVAL);
                if !self.tts.is_speaking().map_err(|e| anyhow!(e))? {
                    return Ok(());
                }
            }
        }
    }
}
