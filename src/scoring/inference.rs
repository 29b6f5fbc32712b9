//! External-model scoring strategy: posts the feature snapshot to an
//! inference endpoint with a hard timeout. The rule-based result is always
//! computed first and is the answer whenever the call fails or times out;
//! the pipeline never waits past the deadline.

use super::{
    actions_for_confidence, RuleBasedScorer, ScoringError, ScoringStrategy, ThreatAssessment,
    ThreatCategory,
};
use crate::config::ScoringConfig;
use crate::features::FeatureSnapshot;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    threat_detected: bool,
    confidence: f64,
    #[serde(default)]
    evidence: Vec<String>,
}

pub struct InferenceScorer {
    client: Option<reqwest::blocking::Client>,
    endpoint: Option<String>,
    timeout_secs: u64,
    fallback: RuleBasedScorer,
}

impl InferenceScorer {
    /// A missing endpoint or an unbuildable client degrades to rules-only;
    /// the strategy still satisfies the scoring contract.
    pub fn new(config: ScoringConfig, fallback: RuleBasedScorer) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.inference_timeout_secs))
            .connect_timeout(Duration::from_secs(config.inference_timeout_secs.min(5)))
            .build()
            .ok();
        if config.inference_endpoint.is_none() {
            warn!("inference strategy selected without an endpoint; scoring falls back to rules");
        }
        Self {
            client,
            endpoint: config.inference_endpoint,
            timeout_secs: config.inference_timeout_secs,
            fallback,
        }
    }

    fn infer(&self, snapshot: &FeatureSnapshot) -> Result<InferenceResponse, ScoringError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ScoringError::Transport("no endpoint configured".into()))?;
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ScoringError::Transport("client unavailable".into()))?;

        let res = client.post(endpoint).json(snapshot).send().map_err(|e| {
            if e.is_timeout() {
                ScoringError::Timeout(self.timeout_secs)
            } else {
                ScoringError::Transport(e.to_string())
            }
        })?;
        if !res.status().is_success() {
            return Err(ScoringError::Transport(format!("status {}", res.status())));
        }
        res.json::<InferenceResponse>()
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))
    }
}

impl ScoringStrategy for InferenceScorer {
    fn score(&self, snapshot: &FeatureSnapshot) -> ThreatAssessment {
        let rule_result = self.fallback.score(snapshot);

        match self.infer(snapshot) {
            Ok(resp) => {
                let confidence = resp.confidence.clamp(0.0, 1.0).max(rule_result.confidence);
                let mut evidence = resp.evidence;
                evidence.extend(rule_result.evidence);
                ThreatAssessment {
                    threat_detected: resp.threat_detected || rule_result.threat_detected,
                    confidence,
                    category: if resp.threat_detected {
                        ThreatCategory::AiDetected
                    } else {
                        rule_result.category
                    },
                    evidence,
                    recommended_actions: actions_for_confidence(confidence),
                }
            }
            Err(e) => {
                warn!(error = %e, "inference unavailable, using rule-based result");
                rule_result
            }
        }
    }

    fn name(&self) -> &'static str {
        "inference"
    }
}
