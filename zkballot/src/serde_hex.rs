// Encodings for values carried in ledger JSON payloads. The ledger sends an empty
// string where a value is not available yet.
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::RsaPublicKey;
use serde::{de, Deserialize, Deserializer, Serializer};

/// `Option<Vec<u8>>` as an optional hex string
pub mod option {
    use super::*;

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(encoded) if !encoded.is_empty() => {
                hex::decode(&encoded).map(Some).map_err(de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}

/// `Option<String>` where an empty string means absent
pub mod non_empty {
    use super::*;

    pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_some(value),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        Ok(value.filter(|value| !value.is_empty()))
    }
}

/// RSA public key as hex-encoded SPKI DER, the form the poll contract stores
pub mod rsa_public {
    use super::*;

    pub fn serialize<S>(key: &RsaPublicKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let der = key
            .to_public_key_der()
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&hex::encode(der.as_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<RsaPublicKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let der = hex::decode(&encoded).map_err(de::Error::custom)?;
        RsaPublicKey::from_public_key_der(&der).map_err(de::Error::custom)
    }
}
