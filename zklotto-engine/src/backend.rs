//! Proof backends.
//!
//! The engines fold state transitions and hand their public outputs to a
//! [`ProofBackend`], which attests to the output and later checks the
//! attestation. [`TranscriptBackend`] binds outputs into a keyed blake3
//! transcript; [`NoopBackend`] produces empty attestations for tests and
//! local replay, where the fold itself is the check.

use halo2curves_axiom::bn256::Fr;
use zklotto_map::fr_to_bytes;

use crate::distribution::DistributionOutput;
use crate::error::EngineError;
use crate::reduce::ReduceOutput;

/// Attestation seam between the fold engines and whatever proof system
/// backs them.
pub trait ProofBackend {
    fn prove_reduce(&self, output: &ReduceOutput) -> Result<Vec<u8>, EngineError>;
    fn verify_reduce(&self, output: &ReduceOutput, proof: &[u8]) -> Result<(), EngineError>;
    fn prove_distribution(&self, output: &DistributionOutput) -> Result<Vec<u8>, EngineError>;
    fn verify_distribution(
        &self,
        output: &DistributionOutput,
        proof: &[u8],
    ) -> Result<(), EngineError>;
}

const REDUCE_TRANSCRIPT_KEY: &[u8; 32] = b"zklotto.reduce.transcript.v1\0\0\0\0";
const DISTRIBUTION_TRANSCRIPT_KEY: &[u8; 32] = b"zklotto.distribution.transcr.v1\0";

/// Keyed-blake3 transcript over the output commitment. Not a succinct
/// proof; it binds the exact public output to an attestation that cannot be
/// replayed across domains or engine versions.
#[derive(Clone, Copy, Debug, Default)]
pub struct TranscriptBackend;

impl TranscriptBackend {
    fn reduce_transcript(output: &ReduceOutput) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(REDUCE_TRANSCRIPT_KEY);
        hasher.update(&fr_to_bytes(&output.commitment()));
        *hasher.finalize().as_bytes()
    }

    fn distribution_transcript(output: &DistributionOutput) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(DISTRIBUTION_TRANSCRIPT_KEY);
        hasher.update(&fr_to_bytes(&output.commitment()));
        *hasher.finalize().as_bytes()
    }
}

impl ProofBackend for TranscriptBackend {
    fn prove_reduce(&self, output: &ReduceOutput) -> Result<Vec<u8>, EngineError> {
        if output.processed_action_list != Fr::zero() {
            return Err(EngineError::IncompleteBatch);
        }
        Ok(Self::reduce_transcript(output).to_vec())
    }

    fn verify_reduce(&self, output: &ReduceOutput, proof: &[u8]) -> Result<(), EngineError> {
        if output.processed_action_list != Fr::zero() {
            return Err(EngineError::IncompleteBatch);
        }
        let expected = Self::reduce_transcript(output);
        // Attestations are not secrets; a plain comparison is fine.
        if proof != expected {
            return Err(EngineError::Proof(
                "reduce transcript does not match the claimed output".into(),
            ));
        }
        Ok(())
    }

    fn prove_distribution(&self, output: &DistributionOutput) -> Result<Vec<u8>, EngineError> {
        Ok(Self::distribution_transcript(output).to_vec())
    }

    fn verify_distribution(
        &self,
        output: &DistributionOutput,
        proof: &[u8],
    ) -> Result<(), EngineError> {
        let expected = Self::distribution_transcript(output);
        if proof != expected {
            return Err(EngineError::Proof(
                "distribution transcript does not match the claimed output".into(),
            ));
        }
        Ok(())
    }
}

/// Empty attestations. The caller is expected to have replayed the fold
/// itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBackend;

impl ProofBackend for NoopBackend {
    fn prove_reduce(&self, output: &ReduceOutput) -> Result<Vec<u8>, EngineError> {
        if output.processed_action_list != Fr::zero() {
            return Err(EngineError::IncompleteBatch);
        }
        Ok(Vec::new())
    }

    fn verify_reduce(&self, output: &ReduceOutput, proof: &[u8]) -> Result<(), EngineError> {
        if output.processed_action_list != Fr::zero() {
            return Err(EngineError::IncompleteBatch);
        }
        if !proof.is_empty() {
            return Err(EngineError::Proof("unexpected attestation bytes".into()));
        }
        Ok(())
    }

    fn prove_distribution(&self, _output: &DistributionOutput) -> Result<Vec<u8>, EngineError> {
        Ok(Vec::new())
    }

    fn verify_distribution(
        &self,
        _output: &DistributionOutput,
        proof: &[u8],
    ) -> Result<(), EngineError> {
        if !proof.is_empty() {
            return Err(EngineError::Proof("unexpected attestation bytes".into()));
        }
        Ok(())
    }
}
