use crate::*;
use chrono::{DateTime, Utc};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::collections::BTreeMap;

/// Name of the manifest written to a poll's key-material directory after creation
pub const MANIFEST_FILE: &str = "poll.json";

/// Maximum number of ballot public keys a poll can register
pub const MAX_VOTERS: usize = 100;

/// Per-ballot voting state as stored by the poll contract
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum VoterStatus {
    NotExist = 0,
    NotVoted = 1,
    Voted = 2,
}

/// A poll answer, hex-encoded for the contract alongside its display text
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub hex: String,
    pub utf8: String,
}

impl Answer {
    pub fn from_text(text: &str) -> Self {
        Answer {
            hex: hex::encode(text.as_bytes()),
            utf8: text.to_owned(),
        }
    }

    pub fn from_hex(encoded: &str) -> Result<Self, ValidationError> {
        let bytes = hex::decode(encoded)
            .map_err(|_| ValidationError::InvalidAnswerHex(encoded.to_owned()))?;
        Ok(Answer {
            hex: encoded.to_owned(),
            utf8: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// Hash of the poll's RSA secret key, and the key itself once the poll is finished
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedPrivateKey {
    pub hash: String,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_hex::non_empty"
    )]
    pub hex: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Voters {
    pub total: u32,
    pub voted: u32,

    #[serde(default)]
    pub detailed: BTreeMap<BallotNumber, VoterStatus>,
}

/// A vote as stored on the ledger
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    #[serde(with = "hex_serde")]
    pub encrypted: Vec<u8>,

    /// Selected answers joined by `|`, available once the poll is finished
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_hex::non_empty"
    )]
    pub decrypted: Option<String>,
}

impl CastVote {
    /// The selected answers' display texts, empty until decrypted
    pub fn selections(&self) -> Vec<&str> {
        match &self.decrypted {
            Some(decrypted) => decrypted.split('|').filter(|s| !s.is_empty()).collect(),
            None => vec![],
        }
    }
}

/// A poll as assembled from the ledger
///
/// Never cached: every read goes back to the ledger, so `status`, `voters` and
/// `votes` always reflect live contract state.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PollRecord {
    pub address: Address,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_address: Option<Address>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub ending: Option<DateTime<Utc>>,

    #[serde(default, with = "crate::serde_hex::option")]
    pub verifying_key: Option<Vec<u8>>,

    #[serde(default, with = "crate::serde_hex::option")]
    pub proof_key: Option<Vec<u8>>,

    #[serde(default)]
    pub private_key: PublishedPrivateKey,

    /// True while voting is open
    #[serde(default)]
    pub status: bool,

    #[serde(default)]
    pub voters: Voters,

    #[serde(default)]
    pub answers: Vec<Answer>,

    #[serde(default)]
    pub votes: Vec<CastVote>,
}

impl PollRecord {
    pub fn phase(&self) -> PollPhase {
        if self.status {
            PollPhase::Ongoing
        } else {
            PollPhase::Finished
        }
    }

    pub fn private_key_hash(&self) -> &str {
        &self.private_key.hash
    }

    /// The RSA secret key (PKCS#1 DER, hex), present only after the poll is finished
    pub fn private_key_hex(&self) -> Option<&str> {
        self.private_key.hex.as_deref()
    }

    pub fn voter_status(&self, ballot: BallotNumber) -> VoterStatus {
        self.voters
            .detailed
            .get(&ballot)
            .copied()
            .unwrap_or(VoterStatus::NotExist)
    }
}

/// `ending` as recorded in the manifest
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ManifestEnding {
    pub unixtime: i64,
    pub verbose: String,
}

/// Local cross-reference of a created poll, written only after the poll contract
/// is deployed
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PollManifest {
    pub helper: Address,
    pub address: Address,
    pub ending: ManifestEnding,
    pub answers: Vec<String>,
    pub voters: Vec<u64>,
}

impl PollManifest {
    pub fn new(
        helper: Address,
        address: Address,
        ending: DateTime<Utc>,
        answers: Vec<String>,
        voters: Vec<u64>,
    ) -> Self {
        PollManifest {
            helper,
            address,
            ending: ManifestEnding {
                unixtime: ending.timestamp(),
                verbose: ending.to_rfc3339(),
            },
            answers,
            voters,
        }
    }
}
