// In-memory stand-ins for the ledger and the proof toolchain

use crate::*;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const FAKE_PROOF_KEY: &[u8] = b"fake proving key";
pub const FAKE_VERIFY_KEY: &[u8] = b"fake verifying key";

pub fn fakes() -> (Arc<MemFs>, Arc<FakeProver>, Arc<FakeLedger>) {
    let fs = Arc::new(MemFs::new());
    let prover = Arc::new(FakeProver::new(fs.clone()));
    (fs, prover, Arc::new(FakeLedger::default()))
}

pub fn fake_proof(ballot: BallotNumber) -> Vec<u8> {
    format!("proof of {}", ballot).into_bytes()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Proof toolchain writing fixed artifacts into a [`MemFs`]
pub struct FakeProver {
    fs: Arc<MemFs>,
    pub setups: AtomicUsize,
    pub proofs: AtomicUsize,
}

impl FakeProver {
    pub fn new(fs: Arc<MemFs>) -> Self {
        FakeProver {
            fs,
            setups: AtomicUsize::new(0),
            proofs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProofProvider for FakeProver {
    async fn setup(&self, directory: &Path) -> Result<(), ProofError> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        for name in ZKP_ARTIFACTS.iter() {
            let contents: &[u8] = match *name {
                PROOF_KEY_FILE => FAKE_PROOF_KEY,
                VERIFY_KEY_FILE => FAKE_VERIFY_KEY,
                _ => b"artifact",
            };
            self.fs
                .write(&directory.join(name), contents)
                .await
                .map_err(|e| ProofError::Setup {
                    directory: directory.to_path_buf(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    async fn prove(&self, directory: &Path, ballot: BallotNumber) -> Result<Vec<u8>, ProofError> {
        self.proofs.fetch_add(1, Ordering::SeqCst);
        let proof = fake_proof(ballot);
        self.fs
            .write(&directory.join(PROOF_FILE), &proof)
            .await
            .map_err(|e| ProofError::Prove {
                ballot_number: ballot.get(),
                reason: e.to_string(),
            })?;
        Ok(proof)
    }
}

struct FakePoll {
    init: PollInit,
    helper: Address,
    created: DateTime<Utc>,
    detailed: BTreeMap<BallotNumber, VoterStatus>,
    votes: Vec<Vec<u8>>,
    private: Option<String>,
}

impl FakePoll {
    fn is_open(&self) -> bool {
        self.private.is_none()
    }

    fn record(&self, address: &Address) -> PollRecord {
        let secret = self
            .private
            .as_ref()
            .and_then(|private| hex::decode(private).ok())
            .and_then(|der| RsaPrivateKey::from_pkcs1_der(&der).ok());

        PollRecord {
            address: address.clone(),
            helper_address: Some(self.helper.clone()),
            created: self.created,
            ending: Utc.timestamp_opt(self.init.time_limit, 0).single(),
            verifying_key: Some(self.init.verify_key.clone()),
            proof_key: Some(self.init.proof_key.clone()),
            private_key: PublishedPrivateKey {
                hash: self.init.hash_private.clone(),
                hex: self.private.clone(),
            },
            status: self.is_open(),
            voters: Voters {
                total: self.init.ballot_numbers.len() as u32,
                voted: self
                    .detailed
                    .values()
                    .filter(|s| **s == VoterStatus::Voted)
                    .count() as u32,
                detailed: self.detailed.clone(),
            },
            answers: self
                .init
                .available_choose
                .iter()
                .filter_map(|answer| Answer::from_hex(answer).ok())
                .collect(),
            votes: self
                .votes
                .iter()
                .map(|encrypted| CastVote {
                    encrypted: encrypted.clone(),
                    decrypted: secret
                        .as_ref()
                        .and_then(|key| decrypt_vote(key, encrypted).ok())
                        .map(|vote| vote.to_text()),
                })
                .collect(),
        }
    }
}

#[derive(Default)]
struct LedgerState {
    helpers: HashSet<Address>,
    polls: BTreeMap<Address, FakePoll>,
    fail_deploy: Option<ContractType>,
}

/// A ledger simulating the helper and poll contracts
#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
    pub sign_key_requests: AtomicUsize,
    pub deployments: AtomicUsize,
}

impl FakeLedger {
    /// Make the next deployment of `contract` fail
    pub fn fail_next_deploy(&self, contract: ContractType) {
        self.state.lock().unwrap().fail_deploy = Some(contract);
    }
}

fn call_failed(function: &'static str, reason: &str) -> LedgerError {
    LedgerError::Call {
        function,
        reason: reason.to_owned(),
    }
}

#[async_trait]
impl LedgerGateway for FakeLedger {
    async fn account_address(
        &self,
        contract: ContractType,
        options: &AccountOptions,
    ) -> Result<Address, LedgerError> {
        if let Some(address) = &options.address {
            return Ok(address.clone());
        }
        match &options.signer {
            Some(Signer::Keys { keys }) => Ok(Address::new(format!(
                "0:{}",
                sha256_hex(format!("{}:{}", contract, keys.public).as_bytes())
            ))),
            None => Err(call_failed("accountAddress", "no signer")),
        }
    }

    async fn account_type(
        &self,
        contract: ContractType,
        address: &Address,
    ) -> Result<AccountType, LedgerError> {
        let state = self.state.lock().unwrap();
        let deployed = match contract {
            ContractType::Helper => state.helpers.contains(address),
            ContractType::Poll => state.polls.contains_key(address),
        };
        Ok(if deployed {
            AccountType::Active
        } else {
            AccountType::NonExist
        })
    }

    async fn account_deploy(
        &self,
        deployment: &Deployment,
        options: &AccountOptions,
    ) -> Result<Address, LedgerError> {
        let contract = deployment.contract_type();
        let address = self.account_address(contract, options).await?;
        let helper = self.account_address(ContractType::Helper, options).await?;

        let mut state = self.state.lock().unwrap();
        if state.fail_deploy == Some(contract) {
            state.fail_deploy = None;
            return Err(LedgerError::Deploy {
                contract,
                reason: "injected failure".into(),
            });
        }
        if state.helpers.contains(&address) || state.polls.contains_key(&address) {
            return Err(LedgerError::Deploy {
                contract,
                reason: "account already deployed".into(),
            });
        }
        self.deployments.fetch_add(1, Ordering::SeqCst);

        match deployment {
            Deployment::Helper => {
                state.helpers.insert(address.clone());
            }
            Deployment::Poll(init) => {
                if !state.helpers.contains(&helper) {
                    return Err(LedgerError::Deploy {
                        contract,
                        reason: "no helper deployed".into(),
                    });
                }
                let detailed = init
                    .ballot_numbers
                    .iter()
                    .filter_map(|public| secret_for_public(*public))
                    .map(|ballot| (ballot, VoterStatus::NotVoted))
                    .collect();
                state.polls.insert(
                    address.clone(),
                    FakePoll {
                        init: init.clone(),
                        helper,
                        created: Utc::now(),
                        detailed,
                        votes: vec![],
                        private: None,
                    },
                );
            }
        }
        Ok(address)
    }

    async fn run_local(
        &self,
        contract: ContractType,
        address: &Address,
        call: &LocalCall,
    ) -> Result<LocalOutput, LedgerError> {
        let function = call.function_name();
        let state = self.state.lock().unwrap();
        match (contract, call) {
            (ContractType::Helper, LocalCall::Sha256Private { private }) => {
                if !state.helpers.contains(address) {
                    return Err(call_failed(function, "account not found"));
                }
                let der = hex::decode(private).map_err(|e| call_failed(function, &e.to_string()))?;
                Ok(LocalOutput::Sha256Private {
                    hash: sha256_hex(&der),
                })
            }
            (ContractType::Poll, LocalCall::Open {}) => {
                let poll = state
                    .polls
                    .get(address)
                    .ok_or_else(|| call_failed(function, "account not found"))?;
                let der = poll
                    .init
                    .open
                    .to_public_key_der()
                    .map_err(|e| call_failed(function, &e.to_string()))?;
                Ok(LocalOutput::Open {
                    open: hex::encode(der.as_bytes()),
                })
            }
            _ => Err(call_failed(function, "no such function")),
        }
    }

    async fn run(
        &self,
        contract: ContractType,
        address: &Address,
        call: &RemoteCall,
    ) -> Result<MessageResult, LedgerError> {
        let function = call.function_name();
        if contract != ContractType::Poll {
            return Err(call_failed(function, "no such function"));
        }
        let mut state = self.state.lock().unwrap();
        let poll = state
            .polls
            .get_mut(address)
            .ok_or_else(|| call_failed(function, "account not found"))?;

        match call {
            RemoteCall::Vote {
                proof,
                ballot_number,
                vote,
            } => {
                if !poll.is_open() {
                    return Err(call_failed(function, "poll is finished"));
                }
                if *proof != fake_proof(*ballot_number) {
                    return Err(call_failed(function, "proof does not verify"));
                }
                match poll.detailed.get(ballot_number) {
                    Some(VoterStatus::NotVoted) => {}
                    Some(VoterStatus::Voted) => {
                        return Err(call_failed(function, "ballot already used"))
                    }
                    _ => return Err(call_failed(function, "ballot not registered")),
                }
                poll.detailed.insert(*ballot_number, VoterStatus::Voted);
                poll.votes.push(vote.clone());
            }
            RemoteCall::FinishVote { private } => {
                if !poll.is_open() {
                    return Err(call_failed(function, "poll is finished"));
                }
                let der = hex::decode(private).map_err(|e| call_failed(function, &e.to_string()))?;
                if sha256_hex(&der) != poll.init.hash_private {
                    return Err(call_failed(function, "private key does not match"));
                }
                poll.private = Some(private.clone());
            }
        }
        Ok(MessageResult(json!({ "function": function, "aborted": false })))
    }

    async fn generate_random_sign_keys(&self) -> Result<SigningKeypair, LedgerError> {
        self.sign_key_requests.fetch_add(1, Ordering::SeqCst);
        let mut csprng = rand::rngs::OsRng {};
        let mut public = [0u8; 32];
        let mut secret = [0u8; 32];
        csprng.fill_bytes(&mut public);
        csprng.fill_bytes(&mut secret);
        Ok(SigningKeypair {
            public: hex::encode(public),
            secret: hex::encode(secret),
        })
    }

    async fn poll_details(
        &self,
        address: &Address,
        _created: DateTime<Utc>,
    ) -> Result<PollRecord, LedgerError> {
        let state = self.state.lock().unwrap();
        state
            .polls
            .get(address)
            .map(|poll| poll.record(address))
            .ok_or_else(|| LedgerError::PollNotFound(address.to_string()))
    }

    async fn poll_list(&self) -> Result<Vec<PollRecord>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .polls
            .iter()
            .map(|(address, poll)| poll.record(address))
            .collect())
    }
}
