//! Lookup verdicts and the per-request state trace

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ArtifactRef, EntryHash};
use crate::domain::DomainError;

/// How a hit was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Semantic,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Semantic => "semantic",
        }
    }
}

/// A reusable artifact found for a request
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub artifact_ref: ArtifactRef,
    /// 1.0 for exact matches
    pub similarity: f32,
    pub kind: MatchKind,
    /// Hash of the request that produced the artifact, when known
    pub source_hash: Option<EntryHash>,
}

impl CacheHit {
    pub fn exact(artifact_ref: ArtifactRef, hash: EntryHash) -> Self {
        Self {
            artifact_ref,
            similarity: 1.0,
            kind: MatchKind::Exact,
            source_hash: Some(hash),
        }
    }

    pub fn semantic(artifact_ref: ArtifactRef, similarity: f32, hash: EntryHash) -> Self {
        Self {
            artifact_ref,
            similarity,
            kind: MatchKind::Semantic,
            source_hash: Some(hash),
        }
    }
}

/// Why a lookup missed
///
/// None of these are errors for the caller; each one means "generate".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissReason {
    /// Caching is switched off
    Disabled,
    /// The request failed validation
    InvalidRequest,
    /// No comparable entries exist in the request's scope
    NoCandidates,
    /// The best candidate scored below the threshold
    BelowThreshold { best: f32 },
    /// The embedding call failed or timed out
    EmbeddingUnavailable,
    /// The vector index failed or timed out
    IndexUnavailable,
    /// The overall lookup budget was exhausted
    Timeout,
    /// The calling request went away
    Cancelled,
}

impl MissReason {
    /// Label for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::InvalidRequest => "invalid_request",
            Self::NoCandidates => "no_candidates",
            Self::BelowThreshold { .. } => "below_threshold",
            Self::EmbeddingUnavailable => "embedding_unavailable",
            Self::IndexUnavailable => "index_unavailable",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict of the decision engine
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Hit(CacheHit),
    Miss(MissReason),
}

impl LookupOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn artifact_ref(&self) -> Option<&ArtifactRef> {
        match self {
            Self::Hit(hit) => Some(&hit.artifact_ref),
            Self::Miss(_) => None,
        }
    }

    pub fn similarity(&self) -> Option<f32> {
        match self {
            Self::Hit(hit) => Some(hit.similarity),
            Self::Miss(_) => None,
        }
    }

    pub fn miss_reason(&self) -> Option<MissReason> {
        match self {
            Self::Hit(_) => None,
            Self::Miss(reason) => Some(*reason),
        }
    }
}

/// Wire-friendly `{ hit, artifact_ref?, similarity? }` view of an outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    pub hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<ArtifactRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl From<&LookupOutcome> for LookupResult {
    fn from(outcome: &LookupOutcome) -> Self {
        Self {
            hit: outcome.is_hit(),
            artifact_ref: outcome.artifact_ref().cloned(),
            similarity: outcome.similarity(),
        }
    }
}

/// States a single lookup moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupState {
    Start,
    NormalizeDone,
    ExactChecked,
    EmbeddingPending,
    VectorChecked,
    Hit,
    Miss,
}

impl LookupState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Hit | Self::Miss)
    }

    /// Forward-only transitions; any live state may abort to `Miss`
    pub fn can_transition_to(&self, next: LookupState) -> bool {
        use LookupState::*;

        if self.is_terminal() {
            return false;
        }

        matches!(
            (self, next),
            (_, Miss)
                | (Start, NormalizeDone)
                | (NormalizeDone, ExactChecked)
                | (ExactChecked, Hit)
                | (ExactChecked, EmbeddingPending)
                | (EmbeddingPending, VectorChecked)
                | (VectorChecked, Hit)
        )
    }
}

/// Path a lookup took through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTrace {
    states: Vec<LookupState>,
}

impl Default for LookupTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupTrace {
    pub fn new() -> Self {
        Self {
            states: vec![LookupState::Start],
        }
    }

    pub fn current(&self) -> LookupState {
        self.states
            .last()
            .copied()
            .unwrap_or(LookupState::Start)
    }

    pub fn states(&self) -> &[LookupState] {
        &self.states
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_terminal()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&mut self, next: LookupState) -> Result<(), DomainError> {
        let current = self.current();

        if !current.can_transition_to(next) {
            return Err(DomainError::internal(format!(
                "Illegal lookup transition {:?} -> {:?}",
                current, next
            )));
        }

        self.states.push(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let hash = EntryHash::compute("a", "1x1", "m");
        let hit = LookupOutcome::Hit(CacheHit::exact("ref".into(), hash));

        assert!(hit.is_hit());
        assert_eq!(hit.similarity(), Some(1.0));
        assert_eq!(hit.artifact_ref().map(|r| r.as_str()), Some("ref"));

        let miss = LookupOutcome::Miss(MissReason::BelowThreshold { best: 0.5 });
        assert!(!miss.is_hit());
        assert!(miss.artifact_ref().is_none());
        assert_eq!(miss.miss_reason().map(|r| r.as_str()), Some("below_threshold"));
    }

    #[test]
    fn test_lookup_result_serialization() {
        let miss = LookupResult::from(&LookupOutcome::Miss(MissReason::NoCandidates));
        let json = serde_json::to_value(&miss).unwrap();
        assert_eq!(json, serde_json::json!({ "hit": false }));

        let hash = EntryHash::compute("a", "1x1", "m");
        let hit = LookupResult::from(&LookupOutcome::Hit(CacheHit::semantic(
            "s3://a".into(),
            0.9,
            hash,
        )));
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["hit"], true);
        assert_eq!(json["artifact_ref"], "s3://a");
    }

    #[test]
    fn test_trace_semantic_hit_path() {
        let mut trace = LookupTrace::new();

        for state in [
            LookupState::NormalizeDone,
            LookupState::ExactChecked,
            LookupState::EmbeddingPending,
            LookupState::VectorChecked,
            LookupState::Hit,
        ] {
            trace.advance(state).unwrap();
        }

        assert!(trace.is_finished());
        assert_eq!(trace.states().len(), 6);
    }

    #[test]
    fn test_trace_rejects_backwards_and_terminal_moves() {
        let mut trace = LookupTrace::new();
        trace.advance(LookupState::NormalizeDone).unwrap();
        trace.advance(LookupState::ExactChecked).unwrap();

        assert!(trace.advance(LookupState::NormalizeDone).is_err());
        assert!(trace.advance(LookupState::VectorChecked).is_err());

        trace.advance(LookupState::Miss).unwrap();
        assert!(trace.advance(LookupState::Hit).is_err());
        assert!(trace.advance(LookupState::Miss).is_err());
    }

    #[test]
    fn test_any_live_state_can_abort_to_miss() {
        let mut trace = LookupTrace::new();
        trace.advance(LookupState::Miss).unwrap();

        assert_eq!(trace.current(), LookupState::Miss);
    }
}
