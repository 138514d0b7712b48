use crate::*;
use rand::{CryptoRng, RngCore};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// Random bytes placed on each side of the selected answers
pub const PADDING_LEN: usize = 3;

/// Byte separating selected answers in the plaintext
pub const ANSWER_SEPARATOR: u8 = b'|';

// PKCS#1 v1.5 encryption padding takes at least 11 bytes of the modulus
const PKCS1_V15_OVERHEAD: usize = 11;

/// Largest plaintext `key` can encrypt under PKCS#1 v1.5
pub fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(PKCS1_V15_OVERHEAD)
}

/// Check and decode a selection of answers given as hex strings
pub fn validate_selection(answers: &[String]) -> Result<Vec<Vec<u8>>, ValidationError> {
    if answers.is_empty() {
        return Err(ValidationError::NoAnswers);
    }
    answers
        .iter()
        .enumerate()
        .map(|(index, answer)| {
            if answer.is_empty() {
                return Err(ValidationError::EmptyAnswer(index));
            }
            hex::decode(answer).map_err(|_| ValidationError::InvalidAnswerHex(answer.clone()))
        })
        .collect()
}

/// Build the vote plaintext: `prefix ‖ answer₁ ‖ '|' ‖ … ‖ answerₙ ‖ suffix`
///
/// The random prefix and suffix keep identical selections from producing
/// guessable plaintexts.
pub fn vote_plaintext(
    answers: &[String],
    prefix: [u8; PADDING_LEN],
    suffix: [u8; PADDING_LEN],
) -> Result<Vec<u8>, ValidationError> {
    let answers = validate_selection(answers)?;
    let mut plaintext = prefix.to_vec();
    plaintext.extend_from_slice(&answers.join(&ANSWER_SEPARATOR));
    plaintext.extend_from_slice(&suffix);
    Ok(plaintext)
}

/// Encrypt a selection of answers (hex strings) under a poll's RSA public key
///
/// The padding bytes around the selection come from `rng`, not from the ledger's
/// random byte generator.
pub fn encrypt_vote<R: RngCore + CryptoRng>(
    rng: &mut R,
    answers: &[String],
    key: &RsaPublicKey,
) -> Result<Vec<u8>, Error> {
    let mut prefix = [0u8; PADDING_LEN];
    let mut suffix = [0u8; PADDING_LEN];
    rng.fill_bytes(&mut prefix);
    rng.fill_bytes(&mut suffix);

    let plaintext = vote_plaintext(answers, prefix, suffix)?;
    let max = max_plaintext_len(key);
    if plaintext.len() > max {
        return Err(CryptoError::PlaintextTooLarge {
            len: plaintext.len(),
            max,
        }
        .into());
    }

    let encrypted = key
        .encrypt(rng, Pkcs1v15Encrypt, &plaintext)
        .map_err(CryptoError::Encryption)?;
    Ok(encrypted)
}

/// A vote recovered with the poll's RSA secret key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedVote {
    /// The plaintext with the random padding stripped
    pub body: Vec<u8>,
}

impl DecryptedVote {
    /// The selected answers as raw bytes
    pub fn answers(&self) -> Vec<&[u8]> {
        self.body.split(|b| *b == ANSWER_SEPARATOR).collect()
    }

    /// The body as one hex string, answers joined by `7c`
    pub fn to_hex(&self) -> String {
        hex::encode(&self.body)
    }

    /// Selected answers' display text, joined by `|`
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub fn decrypt_vote(key: &RsaPrivateKey, encrypted: &[u8]) -> Result<DecryptedVote, CryptoError> {
    let plaintext = key
        .decrypt(Pkcs1v15Encrypt, encrypted)
        .map_err(CryptoError::Decryption)?;
    if plaintext.len() < 2 * PADDING_LEN {
        return Err(CryptoError::MalformedPlaintext);
    }
    let body = plaintext[PADDING_LEN..plaintext.len() - PADDING_LEN].to_vec();
    Ok(DecryptedVote { body })
}
