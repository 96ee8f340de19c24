//! Line-oriented script format for driving the simulated platform
//!
//! Each line is one JSON object, e.g.
//! `{"type":"hear","text":"hey notes take a note","final":true}`.

use anyhow::{Context, Result};
use base64::prelude::*;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::warn;

use super::platform::SimHandle;
use crate::config::SharedSettings;
use crate::lifecycle::{ControlRequest, ControllerInput};
use crate::recognition::RecognizerErrorKind;
use crate::state::ActiveKind;

/// One scripted step
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptLine {
    StartAmbient,
    StartActive {
        mode: ActiveKind,
    },
    Stop,
    Hear {
        text: String,
        #[serde(rename = "final", default)]
        is_final: bool,
    },
    EndStream,
    Error {
        kind: RecognizerErrorKind,
    },
    /// Base64-encoded audio bytes reported by the recorder
    Chunk {
        data: String,
    },
    Microphone {
        granted: bool,
    },
    HandsFree {
        enabled: bool,
    },
}

impl ScriptLine {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).with_context(|| format!("invalid script line: {}", line))
    }

    /// Perform the step against the controller and the simulated platform
    pub async fn apply(
        self,
        sim: &SimHandle,
        settings: &SharedSettings,
        input_tx: &mpsc::UnboundedSender<ControllerInput>,
    ) -> Result<()> {
        let delivered = match self {
            ScriptLine::StartAmbient => {
                return send(input_tx, ControlRequest::StartAmbient);
            }
            ScriptLine::StartActive { mode } => {
                return send(input_tx, ControlRequest::StartActive(mode));
            }
            ScriptLine::Stop => return send(input_tx, ControlRequest::Stop),
            ScriptLine::Hear { text, is_final } => sim.hear(&text, is_final),
            ScriptLine::EndStream => sim.end_stream(),
            ScriptLine::Error { kind } => sim.fail(kind),
            ScriptLine::Chunk { data } => {
                let bytes = BASE64_STANDARD
                    .decode(data.trim())
                    .context("chunk data is not valid base64")?;
                sim.chunk(bytes)
            }
            ScriptLine::Microphone { granted } => {
                sim.set_microphone_granted(granted);
                true
            }
            ScriptLine::HandsFree { enabled } => {
                settings.set_hands_free(enabled);
                true
            }
        };

        if !delivered {
            warn!("script step had no open stream or recording to target");
        }
        Ok(())
    }
}

fn send(input_tx: &mpsc::UnboundedSender<ControllerInput>, request: ControlRequest) -> Result<()> {
    input_tx
        .send(request.into())
        .context("controller is no longer running")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        assert_eq!(
            ScriptLine::parse(r#"{"type":"start_active","mode":"dictation"}"#).unwrap(),
            ScriptLine::StartActive {
                mode: ActiveKind::Dictation
            }
        );
        assert_eq!(
            ScriptLine::parse(r#"{"type":"hear","text":"new note","final":true}"#).unwrap(),
            ScriptLine::Hear {
                text: "new note".into(),
                is_final: true
            }
        );
        assert_eq!(
            ScriptLine::parse(r#"{"type":"error","kind":"no-speech"}"#).unwrap(),
            ScriptLine::Error {
                kind: RecognizerErrorKind::NoSpeech
            }
        );
    }

    #[test]
    fn test_interim_is_the_default() {
        let line = ScriptLine::parse(r#"{"type":"hear","text":"add a"}"#).unwrap();
        assert!(matches!(line, ScriptLine::Hear { is_final: false, .. }));
    }

    #[test]
    fn test_unknown_line_is_rejected() {
        assert!(ScriptLine::parse(r#"{"type":"dance"}"#).is_err());
        assert!(ScriptLine::parse("not json").is_err());
    }

    #[tokio::test]
    async fn test_requests_reach_the_controller_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_platform, sim) = crate::sim::simulated_platform(tx.clone());
        let settings = SharedSettings::new(true);

        ScriptLine::Stop.apply(&sim, &settings, &tx).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ControllerInput::Request(ControlRequest::Stop))
        );

        ScriptLine::HandsFree { enabled: false }
            .apply(&sim, &settings, &tx)
            .await
            .unwrap();
        use crate::config::Settings;
        assert!(!settings.hands_free_enabled());
    }
}
