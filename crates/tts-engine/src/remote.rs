use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, instrument, warn};

use crate::{audio::decode_wav, EngineKind, EngineRequest, RawAudio, TtsEngine, TtsEngineError};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RemoteEngineConfig {
    pub kind: EngineKind,
    pub endpoint: String,
    #[serde(default)]
    pub ready_endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub engine_label: Option<String>,
}

fn default_timeout_secs() -> Option<u64> {
    Some(120)
}

#[derive(Debug, Serialize)]
struct RemotePayload<'a> {
    engine: &'static str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_text: Option<&'a str>,
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    accent_hint: Option<&'a str>,
    exaggeration: f32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

/// Either a bare audio body or the job-queue envelope `{ "output": {...} }`.
#[derive(Debug, Default, Deserialize)]
struct RemoteResponse {
    #[serde(default, alias = "audio_base64")]
    audio: Option<String>,
    #[serde(default)]
    output: Option<RemoteOutput>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteOutput {
    #[serde(alias = "audio_base64")]
    audio: String,
}

impl RemoteResponse {
    fn into_audio(self) -> Result<String, TtsEngineError> {
        if let Some(err) = self.error {
            return Err(TtsEngineError::Upstream(err));
        }
        self.audio
            .or(self.output.map(|output| output.audio))
            .ok_or_else(|| TtsEngineError::Upstream("response carried no audio".to_string()))
    }
}

/// Model server reached over HTTP; the model itself lives out of process.
#[derive(Clone)]
pub struct RemoteEngine {
    config: RemoteEngineConfig,
    http: reqwest::Client,
}

impl RemoteEngine {
    pub fn new(config: RemoteEngineConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let http = builder.build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &RemoteEngineConfig {
        &self.config
    }
}

#[async_trait]
impl TtsEngine for RemoteEngine {
    fn kind(&self) -> EngineKind {
        self.config.kind
    }

    fn label(&self) -> String {
        self.config
            .engine_label
            .clone()
            .unwrap_or_else(|| self.config.kind.as_str().to_string())
    }

    #[instrument(skip(self, request), fields(engine = %self.config.kind))]
    async fn synthesize(&self, request: EngineRequest) -> Result<RawAudio> {
        let ref_audio = match request.reference_audio.as_ref() {
            Some(reference) => Some(BASE64.encode(reference.load().await?)),
            None => None,
        };
        let payload = RemotePayload {
            engine: self.config.kind.as_str(),
            text: &request.text,
            ref_audio,
            ref_text: request.reference_text.as_deref(),
            language: &request.language,
            accent_hint: request.accent_hint.as_deref(),
            exaggeration: request.exaggeration,
            temperature: request.temperature,
            seed: request.seed,
        };
        debug!(
            target = "anchortts::tts_engine",
            endpoint = %self.config.endpoint,
            zero_shot = request.is_zero_shot(),
            text_len = request.text.len(),
            "dispatching synthesis request"
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(TtsEngineError::from)?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let message = format!("status {status}: {}", body.trim());
            return Err(TtsEngineError::Upstream(message).into());
        }
        let body: RemoteResponse = response.json().await.map_err(TtsEngineError::from)?;
        let encoded = body.into_audio()?;
        let wav = BASE64
            .decode(encoded.as_bytes())
            .map_err(|err| TtsEngineError::Decode(err.to_string()))?;
        let audio = decode_wav(&wav).map_err(|err| TtsEngineError::Decode(err.to_string()))?;
        Ok(audio)
    }

    async fn ready(&self) -> bool {
        let Some(url) = self.config.ready_endpoint.as_deref() else {
            return true;
        };
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!(target = "anchortts::tts_engine", %err, "readiness probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::encode_wav, ReferenceAudio};

    fn wav_base64(len: usize) -> String {
        let samples: Vec<f32> = (0..len).map(|i| (i as f32 * 0.1).sin() * 0.3).collect();
        BASE64.encode(encode_wav(&samples, 22_050).unwrap())
    }

    fn engine(server: &httpmock::MockServer) -> RemoteEngine {
        RemoteEngine::new(RemoteEngineConfig {
            kind: EngineKind::Chatterbox,
            endpoint: format!("{}/synthesize", server.base_url()),
            ready_endpoint: Some(format!("{}/ready", server.base_url())),
            timeout_secs: Some(5),
            engine_label: None,
        })
        .unwrap()
    }

    #[test]
    fn serialize_payload_skips_absent_fields() {
        let payload = RemotePayload {
            engine: "xtts",
            text: "hello",
            ref_audio: None,
            ref_text: None,
            language: "en",
            accent_hint: None,
            exaggeration: 0.5,
            temperature: 0.8,
            seed: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("ref_audio").is_none());
        assert_eq!(json["engine"], "xtts");
    }

    #[tokio::test]
    async fn decodes_flat_audio_response() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/synthesize")
                .json_body_partial(r#"{ "engine": "chatterbox", "text": "hello" }"#);
            then.status(200).json_body(serde_json::json!({
                "audio_base64": wav_base64(441),
                "sample_rate": 22050
            }));
        });

        let audio = engine(&server)
            .synthesize(EngineRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.samples.len(), 441);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn decodes_job_envelope_and_sends_reference() {
        let server = httpmock::MockServer::start_async().await;
        let reference = b"RIFFdemo".to_vec();
        let expected_ref = BASE64.encode(&reference);
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/synthesize")
                .body_contains(expected_ref.as_str());
            then.status(200).json_body(serde_json::json!({
                "id": "job-1",
                "status": "COMPLETED",
                "output": { "audio": wav_base64(100), "sample_rate": 22050 }
            }));
        });

        let mut request = EngineRequest::new("hi there");
        request.reference_audio = Some(ReferenceAudio::Bytes(reference));
        let audio = engine(&server).synthesize(request).await.unwrap();
        assert_eq!(audio.samples.len(), 100);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn surfaces_error_bodies_and_statuses() {
        let server = httpmock::MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/synthesize");
            then.status(200)
                .json_body(serde_json::json!({ "error": "CUDA out of memory" }));
        });
        let err = engine(&server)
            .synthesize(EngineRequest::new("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("CUDA out of memory"));

        let failing = httpmock::MockServer::start_async().await;
        failing.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/synthesize");
            then.status(503).body("Model not loaded");
        });
        let err = engine(&failing)
            .synthesize(EngineRequest::new("x"))
            .await
            .unwrap_err();
        let engine_err = err.downcast_ref::<TtsEngineError>().unwrap();
        assert!(matches!(engine_err, TtsEngineError::Upstream(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn rejects_non_wav_audio() {
        let server = httpmock::MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/synthesize");
            then.status(200)
                .json_body(serde_json::json!({ "audio": BASE64.encode(b"nope") }));
        });
        let err = engine(&server)
            .synthesize(EngineRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TtsEngineError>(),
            Some(TtsEngineError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn readiness_follows_probe_status() {
        let server = httpmock::MockServer::start_async().await;
        let ready = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/ready");
            then.status(503);
        });
        assert!(!engine(&server).ready().await);
        ready.assert_async().await;

        let no_probe = RemoteEngine::new(RemoteEngineConfig {
            kind: EngineKind::Xtts,
            endpoint: "http://127.0.0.1:9/synthesize".into(),
            ready_endpoint: None,
            timeout_secs: Some(1),
            engine_label: Some("XTTS v2".into()),
        })
        .unwrap();
        assert!(no_probe.ready().await);
        assert_eq!(no_probe.label(), "XTTS v2");
    }
}
