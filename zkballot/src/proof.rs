use crate::*;
use async_trait::async_trait;
use std::path::Path;

/// Proving key produced by the ZKP setup
pub const PROOF_KEY_FILE: &str = "p_key";

/// Verifying key produced by the ZKP setup
pub const VERIFY_KEY_FILE: &str = "v_key";

/// Proof produced by the toolchain; also the per-voter proof cache
pub const PROOF_FILE: &str = "proof";

/// Files whose joint presence means the ZKP setup already ran in a directory
pub const ZKP_ARTIFACTS: [&str; 5] = [PROOF_KEY_FILE, "pi", PROOF_FILE, VERIFY_KEY_FILE, "viout"];

/// Ballot number the setup is run with. Setup output is generic across ballots.
pub const SETUP_BALLOT_NUMBER: u16 = 1;

/// The zero-knowledge proof toolchain
///
/// Proofs attest knowledge of `x` such that `y = x³ + x` for a registered ballot
/// public key `y`.
#[async_trait]
pub trait ProofProvider: Send + Sync {
    /// Produce the setup artifacts ([`ZKP_ARTIFACTS`]) in `directory`
    async fn setup(&self, directory: &Path) -> Result<(), ProofError>;

    /// Prove knowledge of `ballot`'s secret. Leaves the proof in `directory` as
    /// [`PROOF_FILE`] for later reuse.
    async fn prove(&self, directory: &Path, ballot: BallotNumber) -> Result<Vec<u8>, ProofError>;
}
