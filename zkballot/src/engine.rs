use crate::*;
use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Where a poll is in its lifecycle. Phases only ever advance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PollPhase {
    Unset,
    KeysReady,
    HelperDeployed,
    Ongoing,
    Finished,
}

/// The steps of the create, vote, finish and read flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Validate,
    EnsureKeys,
    HelperAddress,
    DeployHelper,
    HashSecret,
    PollAddress,
    DeployPoll,
    WriteManifest,
    ReadPublicKey,
    EncodeVote,
    ResolveProof,
    SubmitVote,
    ReadSecret,
    SubmitFinish,
    ReadPoll,
    ListPolls,
    ReadManifest,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Step::Validate => "validating request",
            Step::EnsureKeys => "preparing key material",
            Step::HelperAddress => "computing helper address",
            Step::DeployHelper => "deploying helper contract",
            Step::HashSecret => "hashing RSA secret key",
            Step::PollAddress => "computing poll address",
            Step::DeployPoll => "deploying poll contract",
            Step::WriteManifest => "writing poll manifest",
            Step::ReadPublicKey => "reading poll public key",
            Step::EncodeVote => "encrypting vote",
            Step::ResolveProof => "producing ballot proof",
            Step::SubmitVote => "submitting vote",
            Step::ReadSecret => "reading RSA secret key",
            Step::SubmitFinish => "finishing poll",
            Step::ReadPoll => "reading poll",
            Step::ListPolls => "listing polls",
            Step::ReadManifest => "reading poll manifest",
        };
        f.write_str(name)
    }
}

/// A failed flow: the step that failed, the contract address involved if one was
/// known, and the underlying error
#[derive(Debug, Error)]
#[error("zkballot: {step}{} failed: {source}", at_address(.address))]
pub struct StepError {
    pub step: Step,
    pub address: Option<Address>,
    #[source]
    pub source: Error,
}

fn at_address(address: &Option<Address>) -> String {
    match address {
        Some(address) => format!(" at {}", address),
        None => String::new(),
    }
}

trait StepContext<T> {
    fn step(self, step: Step) -> Result<T, StepError>;
    fn step_at(self, step: Step, address: &Address) -> Result<T, StepError>;
}

impl<T, E: Into<Error>> StepContext<T> for Result<T, E> {
    fn step(self, step: Step) -> Result<T, StepError> {
        self.map_err(|e| StepError {
            step,
            address: None,
            source: e.into(),
        })
    }

    fn step_at(self, step: Step, address: &Address) -> Result<T, StepError> {
        self.map_err(|e| StepError {
            step,
            address: Some(address.clone()),
            source: e.into(),
        })
    }
}

/// Request to create a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePoll {
    /// Key-material directory. Created if missing.
    pub directory: PathBuf,

    /// Answers, in display order
    pub answers: Vec<String>,

    /// Registered ballot public keys
    pub voters: Vec<u64>,

    pub ending: DateTime<Utc>,
}

impl CreatePoll {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.answers.is_empty() {
            return Err(ValidationError::NoAnswers);
        }
        for (index, answer) in self.answers.iter().enumerate() {
            if answer.is_empty() {
                return Err(ValidationError::EmptyAnswer(index));
            }
            if answer.as_bytes().contains(&ANSWER_SEPARATOR) {
                return Err(ValidationError::SeparatorInAnswer(index));
            }
        }

        if self.voters.is_empty() {
            return Err(ValidationError::NoVoters);
        }
        if self.voters.len() > MAX_VOTERS {
            return Err(ValidationError::TooManyVoters(self.voters.len()));
        }
        let mut seen = HashSet::new();
        for voter in &self.voters {
            if !is_ballot_public(*voter) {
                return Err(ValidationError::InvalidBallotPublicKey(*voter));
            }
            if !seen.insert(*voter) {
                return Err(ValidationError::DuplicateVoter(*voter));
            }
        }

        if self.ending <= now {
            return Err(ValidationError::EndingInPast(self.ending));
        }
        Ok(())
    }
}

/// A successfully created poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPoll {
    pub helper: Address,
    pub address: Address,
    pub manifest: PollManifest,
}

/// Request to cast a vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastBallot {
    pub address: Address,

    /// The voter's copy of the poll's proving key. Its directory holds the ZKP
    /// artifacts and any cached proof.
    pub key_path: PathBuf,

    pub ballot_number: BallotNumber,

    /// Selected answers, hex
    pub answers: Vec<String>,
}

/// Progress of a poll creation
#[derive(Debug)]
pub enum Creation {
    Unset,
    KeysReady {
        keys: KeyMaterial,
        signer: Signer,
    },
    HelperDeployed {
        keys: KeyMaterial,
        signer: Signer,
        helper: Address,
    },
    PollDeployed(CreatedPoll),
}

impl Creation {
    pub fn phase(&self) -> PollPhase {
        match self {
            Creation::Unset => PollPhase::Unset,
            Creation::KeysReady { .. } => PollPhase::KeysReady,
            Creation::HelperDeployed { .. } => PollPhase::HelperDeployed,
            Creation::PollDeployed(_) => PollPhase::Ongoing,
        }
    }
}

#[derive(Default)]
struct DirLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirLocks {
    async fn lock(&self, directory: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries nobody holds or waits on are only referenced by the map
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(directory.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Drives polls through creation, voting and finishing
///
/// All ledger, proof and filesystem access goes through the injected capabilities.
/// Operations on the same key-material directory are serialized.
pub struct PollLifecycleEngine {
    ledger: Arc<dyn LedgerGateway>,
    prover: Arc<dyn ProofProvider>,
    fs: Arc<dyn FileSystem>,
    keys: Arc<dyn KeyMaterialStore>,
    locks: DirLocks,
}

impl PollLifecycleEngine {
    /// Engine with a [`DirKeyStore`] over the same capabilities
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        prover: Arc<dyn ProofProvider>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let keys = Arc::new(DirKeyStore::new(fs.clone(), prover.clone(), ledger.clone()));
        PollLifecycleEngine::with_key_store(ledger, prover, fs, keys)
    }

    pub fn with_key_store(
        ledger: Arc<dyn LedgerGateway>,
        prover: Arc<dyn ProofProvider>,
        fs: Arc<dyn FileSystem>,
        keys: Arc<dyn KeyMaterialStore>,
    ) -> Self {
        PollLifecycleEngine {
            ledger,
            prover,
            fs,
            keys,
            locks: DirLocks::default(),
        }
    }

    /// Create a poll: key material, helper contract, poll contract, manifest.
    ///
    /// Re-running after a failure reuses every key artifact already on disk and
    /// skips any contract already live at its address. The manifest is only
    /// written once the poll contract is deployed.
    pub async fn create(&self, request: &CreatePoll) -> Result<CreatedPoll, StepError> {
        request.validate(Utc::now()).step(Step::Validate)?;
        let directory = request.directory.as_path();
        let _guard = self.locks.lock(directory).await;

        self.fs
            .create_dir_all(directory)
            .await
            .map_err(|e| Error::io(directory, e))
            .step(Step::EnsureKeys)?;

        let mut state = Creation::Unset;
        loop {
            state = match state {
                Creation::Unset => {
                    let keys = self.keys.ensure(directory).await.step(Step::EnsureKeys)?;
                    let signer = Signer::keys(keys.signer_keys.clone());
                    Creation::KeysReady { keys, signer }
                }
                Creation::KeysReady { keys, signer } => {
                    let helper = self.deploy_helper(&signer).await?;
                    Creation::HelperDeployed {
                        keys,
                        signer,
                        helper,
                    }
                }
                Creation::HelperDeployed {
                    keys,
                    signer,
                    helper,
                } => {
                    let address = self.deploy_poll(request, &keys, signer, &helper).await?;
                    let manifest = PollManifest::new(
                        helper.clone(),
                        address.clone(),
                        request.ending,
                        request.answers.clone(),
                        request.voters.clone(),
                    );
                    Creation::PollDeployed(CreatedPoll {
                        helper,
                        address,
                        manifest,
                    })
                }
                Creation::PollDeployed(created) => {
                    let path = directory.join(MANIFEST_FILE);
                    let manifest = serde_json::to_vec(&created.manifest)
                        .map_err(Error::from)
                        .step_at(Step::WriteManifest, &created.address)?;
                    self.fs
                        .write(&path, &manifest)
                        .await
                        .map_err(|e| Error::io(&path, e))
                        .step_at(Step::WriteManifest, &created.address)?;
                    info!(poll = %created.address, helper = %created.helper, "poll created");
                    return Ok(created);
                }
            };
            debug!(directory = %directory.display(), phase = ?state.phase(), "poll creation advanced");
        }
    }

    // Whether a contract is already live at `address`, left there by an earlier
    // attempt
    async fn deployed(
        &self,
        contract: ContractType,
        address: &Address,
        step: Step,
    ) -> Result<bool, StepError> {
        let account = self
            .ledger
            .account_type(contract, address)
            .await
            .step_at(step, address)?;
        if account.is_deployed() {
            info!(%contract, %address, "contract already deployed, deployment skipped");
        }
        Ok(account.is_deployed())
    }

    async fn deploy_helper(&self, signer: &Signer) -> Result<Address, StepError> {
        let options = AccountOptions::signed_by(signer.clone());
        let expected = self
            .ledger
            .account_address(ContractType::Helper, &options)
            .await
            .step(Step::HelperAddress)?;
        if self
            .deployed(ContractType::Helper, &expected, Step::DeployHelper)
            .await?
        {
            return Ok(expected);
        }

        let helper = self
            .ledger
            .account_deploy(&Deployment::Helper, &options)
            .await
            .step_at(Step::DeployHelper, &expected)?;
        if helper != expected {
            warn!(%expected, deployed = %helper, "helper deployed to an unexpected address");
        }
        info!(helper = %helper, "helper contract deployed");
        Ok(helper)
    }

    async fn deploy_poll(
        &self,
        request: &CreatePoll,
        keys: &KeyMaterial,
        signer: Signer,
        helper: &Address,
    ) -> Result<Address, StepError> {
        let options = AccountOptions::signed_by(signer);
        let expected = self
            .ledger
            .account_address(ContractType::Poll, &options)
            .await
            .step(Step::PollAddress)?;
        if self
            .deployed(ContractType::Poll, &expected, Step::DeployPoll)
            .await?
        {
            return Ok(expected);
        }

        let secret = keys.rsa.secret_der_hex().step(Step::HashSecret)?;
        let call = LocalCall::Sha256Private { private: secret };
        let hash_private = match self
            .ledger
            .run_local(ContractType::Helper, helper, &call)
            .await
            .step_at(Step::HashSecret, helper)?
        {
            LocalOutput::Sha256Private { hash } => hash,
            _ => {
                return Err(LedgerError::UnexpectedOutput {
                    function: call.function_name(),
                })
                .step_at(Step::HashSecret, helper)
            }
        };

        let init = PollInit {
            open: keys.rsa.public.clone(),
            hash_private,
            ballot_numbers: request.voters.clone(),
            time_limit: request.ending.timestamp(),
            verify_key: keys.zkp.verify_key.clone(),
            proof_key: keys.zkp.proof_key.clone(),
            available_choose: request
                .answers
                .iter()
                .map(|answer| Answer::from_text(answer).hex)
                .collect(),
        };
        let address = self
            .ledger
            .account_deploy(&Deployment::Poll(init), &options)
            .await
            .step_at(Step::DeployPoll, &expected)?;
        if address != expected {
            warn!(%expected, deployed = %address, "poll deployed to an unexpected address");
        }
        Ok(address)
    }

    /// Cast a vote. The selection is validated before anything reaches the ledger;
    /// a rejection by the poll contract is reported as
    /// [`LedgerError::VoteRejected`] and never retried.
    pub async fn vote(&self, ballot: &CastBallot) -> Result<MessageResult, StepError> {
        let address = &ballot.address;
        validate_selection(&ballot.answers).step_at(Step::Validate, address)?;

        let directory = key_directory(&ballot.key_path);
        let _guard = self.locks.lock(&directory).await;

        let public = self.poll_public_key(address).await?;
        let mut csprng = rand::rngs::OsRng {};
        let vote =
            encrypt_vote(&mut csprng, &ballot.answers, &public).step_at(Step::EncodeVote, address)?;
        let proof = self
            .resolve_proof(&directory, ballot.ballot_number)
            .await
            .step_at(Step::ResolveProof, address)?;

        let ballot_number = ballot.ballot_number;
        let call = RemoteCall::Vote {
            proof,
            ballot_number,
            vote,
        };
        let result = self
            .ledger
            .run(ContractType::Poll, address, &call)
            .await
            .map_err(|e| match e {
                LedgerError::Call { reason, .. } => LedgerError::VoteRejected {
                    ballot_number: ballot_number.get(),
                    reason,
                },
                other => other,
            })
            .step_at(Step::SubmitVote, address)?;
        info!(poll = %address, ballot = %ballot_number, "vote cast");
        Ok(result)
    }

    async fn poll_public_key(&self, address: &Address) -> Result<RsaPublicKey, StepError> {
        let call = LocalCall::Open {};
        let open = match self
            .ledger
            .run_local(ContractType::Poll, address, &call)
            .await
            .step_at(Step::ReadPublicKey, address)?
        {
            LocalOutput::Open { open } => open,
            _ => {
                return Err(LedgerError::UnexpectedOutput {
                    function: call.function_name(),
                })
                .step_at(Step::ReadPublicKey, address)
            }
        };
        let der = hex::decode(&open)
            .map_err(|e| CryptoError::KeyParse(e.to_string()))
            .step_at(Step::ReadPublicKey, address)?;
        RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::KeyParse(e.to_string()))
            .step_at(Step::ReadPublicKey, address)
    }

    // A proof already next to the proving key is reused as is
    async fn resolve_proof(&self, directory: &Path, ballot: BallotNumber) -> Result<Vec<u8>, Error> {
        let files = self
            .fs
            .list(directory)
            .await
            .map_err(|e| Error::io(directory, e))?;
        if files.iter().any(|f| f == PROOF_FILE) {
            let path = directory.join(PROOF_FILE);
            warn!(path = %path.display(), %ballot, "reusing existing proof");
            return self.fs.read(&path).await.map_err(|e| Error::io(&path, e));
        }
        debug!(directory = %directory.display(), %ballot, "generating proof");
        Ok(self.prover.prove(directory, ballot).await?)
    }

    /// Finish a poll by publishing its RSA secret key. Local state is untouched;
    /// the poll's status is read back from the ledger.
    pub async fn finish(
        &self,
        address: &Address,
        secret_key_path: &Path,
    ) -> Result<MessageResult, StepError> {
        let directory = key_directory(secret_key_path);
        let _guard = self.locks.lock(&directory).await;

        let secret = self
            .keys
            .read_rsa_secret(secret_key_path)
            .await
            .step_at(Step::ReadSecret, address)?;
        let private = secret_der_hex(&secret).step_at(Step::ReadSecret, address)?;

        let result = self
            .ledger
            .run(ContractType::Poll, address, &RemoteCall::FinishVote { private })
            .await
            .step_at(Step::SubmitFinish, address)?;
        info!(poll = %address, "poll finished");
        Ok(result)
    }

    /// Current state of a poll, straight from the ledger
    pub async fn poll(
        &self,
        address: &Address,
        created: DateTime<Utc>,
    ) -> Result<PollRecord, StepError> {
        self.ledger
            .poll_details(address, created)
            .await
            .step_at(Step::ReadPoll, address)
    }

    pub async fn polls(&self) -> Result<Vec<PollRecord>, StepError> {
        self.ledger.poll_list().await.step(Step::ListPolls)
    }

    /// The manifest left in `directory` by a successful [`create`](Self::create)
    pub async fn read_manifest(&self, directory: &Path) -> Result<PollManifest, StepError> {
        let path = directory.join(MANIFEST_FILE);
        let data = self
            .fs
            .read(&path)
            .await
            .map_err(|e| Error::io(&path, e))
            .step(Step::ReadManifest)?;
        serde_json::from_slice(&data).step(Step::ReadManifest)
    }
}

fn key_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
