use crate::*;
use rand::Rng;
use std::convert::TryFrom;
use std::fmt;

/// Smallest ballot secret a voter may hold
pub const BALLOT_SECRET_MIN: u16 = 1;

/// Largest ballot secret a voter may hold
///
/// The proof circuit works over 32-bit signed integers and `1290³ + 1290` is the
/// largest image of the ballot relation below `2³¹`.
pub const BALLOT_SECRET_MAX: u16 = 1290;

/// Image of the ballot relation: `secret³ + secret`
pub fn ballot_public(secret: u16) -> u64 {
    let x = u64::from(secret);
    x * x * x + x
}

/// Recover the ballot secret behind a ballot public key, if it has one in range
pub fn secret_for_public(public: u64) -> Option<BallotNumber> {
    // The relation is strictly increasing, so a binary search over the range suffices
    let (mut low, mut high) = (BALLOT_SECRET_MIN, BALLOT_SECRET_MAX);
    while low <= high {
        let mid = low + (high - low) / 2;
        let image = ballot_public(mid);
        if image == public {
            return Some(BallotNumber(mid));
        }
        if image < public {
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }
    None
}

/// Returns true if `public` is `x³ + x` for some `x` in the ballot secret range
pub fn is_ballot_public(public: u64) -> bool {
    secret_for_public(public).is_some()
}

/// A voter's per-poll identity on the ledger
///
/// The ballot number is the secret half of a [`BallotKey`]; the ZKP proof submitted
/// alongside a vote attests that the voter knows it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u64", into = "u16")]
pub struct BallotNumber(u16);

impl BallotNumber {
    pub fn new(number: u64) -> Result<Self, ValidationError> {
        if number < u64::from(BALLOT_SECRET_MIN) || number > u64::from(BALLOT_SECRET_MAX) {
            return Err(ValidationError::BallotNumberOutOfRange(number));
        }
        Ok(BallotNumber(number as u16))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u64> for BallotNumber {
    type Error = ValidationError;

    fn try_from(number: u64) -> Result<Self, Self::Error> {
        BallotNumber::new(number)
    }
}

impl From<BallotNumber> for u16 {
    fn from(number: BallotNumber) -> u16 {
        number.0
    }
}

impl fmt::Display for BallotNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A voter's ballot keypair
///
/// The public half is handed to the poll operator to be registered at poll creation,
/// the secret half is kept by the voter and used as the ballot number when voting.
/// The library never persists either half.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BallotKey {
    pub secret: u16,
    pub public: u64,
}

impl BallotKey {
    /// Generate a fresh ballot key from the OS random number generator
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng {};
        BallotKey::generate_with(&mut csprng)
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let secret = rng.gen_range(BALLOT_SECRET_MIN..=BALLOT_SECRET_MAX);
        BallotKey {
            secret,
            public: ballot_public(secret),
        }
    }

    /// Rebuild a ballot key from a known secret
    pub fn from_secret(secret: u64) -> Result<Self, ValidationError> {
        let number = BallotNumber::new(secret)?;
        Ok(BallotKey {
            secret: number.get(),
            public: ballot_public(number.get()),
        })
    }

    pub fn ballot_number(&self) -> BallotNumber {
        BallotNumber(self.secret)
    }

    /// Export as `{"secret": .., "public": ..}` for the voter to save
    pub fn to_json(&self) -> String {
        serde_json::json!({ "secret": self.secret, "public": self.public }).to_string()
    }
}
