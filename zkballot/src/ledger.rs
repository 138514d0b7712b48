use crate::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rsa::RsaPublicKey;
use std::fmt;

/// The two contracts a poll is made of
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContractType {
    /// Auxiliary contract exposing the hash function the poll contract verifies against
    Helper,

    /// The poll (master) contract holding parameters, keys and ballots
    Poll,
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContractType::Helper => write!(f, "helper"),
            ContractType::Poll => write!(f, "poll"),
        }
    }
}

/// A ledger account address
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Address(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a ledger account
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[serde(try_from = "i8", into = "i8")]
#[repr(i8)]
pub enum AccountType {
    NonExist = -1,
    Uninit = 0,
    Active = 1,
    Frozen = 2,
}

impl AccountType {
    /// Whether a contract is deployed and running at the account
    pub fn is_deployed(self) -> bool {
        self == AccountType::Active
    }
}

/// Keypair the poll's contracts are deployed and addressed with
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SigningKeypair {
    pub public: String,
    pub secret: String,
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("public", &self.public)
            .finish()
    }
}

/// How the ledger should sign deployments and external messages
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Signer {
    Keys { keys: SigningKeypair },
}

impl Signer {
    pub fn keys(keys: SigningKeypair) -> Self {
        Signer::Keys { keys }
    }
}

/// Which account a ledger call targets: either a known address, or the address a
/// signer would deploy to
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Signer>,
}

impl AccountOptions {
    pub fn at(address: Address) -> Self {
        AccountOptions {
            address: Some(address),
            signer: None,
        }
    }

    pub fn signed_by(signer: Signer) -> Self {
        AccountOptions {
            address: None,
            signer: Some(signer),
        }
    }
}

/// Constructor parameters of the poll contract
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PollInit {
    /// RSA public key votes are encrypted under
    #[serde(rename = "_open", with = "crate::serde_hex::rsa_public")]
    pub open: RsaPublicKey,

    /// Hash of the RSA secret key, as computed by the helper contract
    #[serde(rename = "_hash_private")]
    pub hash_private: String,

    /// Registered ballot public keys
    #[serde(rename = "_ballot_numbers")]
    pub ballot_numbers: Vec<u64>,

    /// Voting deadline, unix seconds
    #[serde(rename = "_time_limit")]
    pub time_limit: i64,

    #[serde(rename = "_m_vkey", with = "hex_serde")]
    pub verify_key: Vec<u8>,

    #[serde(rename = "_m_pkey", with = "hex_serde")]
    pub proof_key: Vec<u8>,

    /// Answers, UTF-8 then hex encoded, in display order
    #[serde(rename = "_available_choose")]
    pub available_choose: Vec<String>,
}

/// A contract deployment
#[derive(Debug, Clone, PartialEq)]
pub enum Deployment {
    Helper,
    Poll(PollInit),
}

impl Deployment {
    pub fn contract_type(&self) -> ContractType {
        match self {
            Deployment::Helper => ContractType::Helper,
            Deployment::Poll(_) => ContractType::Poll,
        }
    }
}

/// Read-only contract calls, executed locally against the account state
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "function_name", content = "input")]
#[serde(rename_all = "snake_case")]
pub enum LocalCall {
    /// Poll: the RSA public key votes are encrypted under
    Open {},

    /// Helper: hash of an RSA secret key (PKCS#1 DER, hex)
    Sha256Private {
        #[serde(rename = "_private")]
        private: String,
    },
}

impl LocalCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            LocalCall::Open {} => "open",
            LocalCall::Sha256Private { .. } => "sha256_private",
        }
    }
}

/// Decoded output of a [`LocalCall`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum LocalOutput {
    /// SPKI DER of the poll's RSA public key, hex
    Open { open: String },

    Sha256Private {
        #[serde(rename = "_hash")]
        hash: String,
    },
}

/// State-changing contract calls, sent as external messages
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "function_name", content = "input")]
#[serde(rename_all = "snake_case")]
pub enum RemoteCall {
    Vote {
        #[serde(with = "hex_serde")]
        proof: Vec<u8>,
        ballot_number: BallotNumber,
        #[serde(with = "hex_serde")]
        vote: Vec<u8>,
    },

    /// Publishes the RSA secret key (PKCS#1 DER, hex) and closes the poll
    FinishVote {
        #[serde(rename = "_private")]
        private: String,
    },
}

impl RemoteCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            RemoteCall::Vote { .. } => "vote",
            RemoteCall::FinishVote { .. } => "finish_vote",
        }
    }
}

/// Result of a processed external message, as reported by the ledger
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct MessageResult(pub serde_json::Value);

/// Access to the ledger and the two poll contracts
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Address a contract deployed with `options` will have. Deterministic, so it
    /// can be computed before deployment.
    async fn account_address(
        &self,
        contract: ContractType,
        options: &AccountOptions,
    ) -> Result<Address, LedgerError>;

    /// Current state of the account at `address`
    async fn account_type(
        &self,
        contract: ContractType,
        address: &Address,
    ) -> Result<AccountType, LedgerError>;

    /// Deploy a contract. Fails if the target account is already active.
    async fn account_deploy(
        &self,
        deployment: &Deployment,
        options: &AccountOptions,
    ) -> Result<Address, LedgerError>;

    async fn run_local(
        &self,
        contract: ContractType,
        address: &Address,
        call: &LocalCall,
    ) -> Result<LocalOutput, LedgerError>;

    async fn run(
        &self,
        contract: ContractType,
        address: &Address,
        call: &RemoteCall,
    ) -> Result<MessageResult, LedgerError>;

    async fn generate_random_sign_keys(&self) -> Result<SigningKeypair, LedgerError>;

    /// Assemble a poll from contract state. `created` scopes the lookup of the
    /// poll's messages.
    async fn poll_details(
        &self,
        address: &Address,
        created: DateTime<Utc>,
    ) -> Result<PollRecord, LedgerError>;

    async fn poll_list(&self) -> Result<Vec<PollRecord>, LedgerError>;
}
