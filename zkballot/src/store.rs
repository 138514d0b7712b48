use crate::*;
use async_trait::async_trait;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// RSA public key, SPKI PEM
pub const RSA_PUBLIC_FILE: &str = "rsa.public.pem";

/// RSA secret key, PKCS#1 PEM
pub const RSA_SECRET_FILE: &str = "rsa.secret.pem";

/// Ledger signing keypair, JSON
pub const SIGNER_KEYS_FILE: &str = "signer.keys.json";

/// Modulus size of poll RSA keys, fixed by the on-chain decryption logic
pub const RSA_KEY_BITS: usize = 512;

/// Proving and verifying keys from the ZKP setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkpArtifacts {
    pub proof_key: Vec<u8>,
    pub verify_key: Vec<u8>,
}

/// A poll's RSA keypair
#[derive(Debug, Clone)]
pub struct RsaKeypair {
    pub public: RsaPublicKey,
    pub secret: RsaPrivateKey,
}

impl RsaKeypair {
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let mut csprng = rand::rngs::OsRng {};
        let secret = RsaPrivateKey::new(&mut csprng, bits).map_err(CryptoError::KeyGeneration)?;
        Ok(RsaKeypair {
            public: RsaPublicKey::from(&secret),
            secret,
        })
    }

    pub fn from_pem(public: &str, secret: &str) -> Result<Self, CryptoError> {
        let public = RsaPublicKey::from_public_key_pem(public)
            .map_err(|e| CryptoError::KeyParse(e.to_string()))?;
        let secret = secret_from_pem(secret)?;
        if RsaPublicKey::from(&secret) != public {
            return Err(CryptoError::KeyParse(
                "public key does not match secret key".into(),
            ));
        }
        Ok(RsaKeypair { public, secret })
    }

    pub fn public_pem(&self) -> Result<String, CryptoError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyEncode(e.to_string()))
    }

    pub fn secret_pem(&self) -> Result<String, CryptoError> {
        let pem = self
            .secret
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyEncode(e.to_string()))?;
        Ok(pem.as_str().to_owned())
    }

    /// PKCS#1 DER of the secret key, hex
    pub fn secret_der_hex(&self) -> Result<String, CryptoError> {
        secret_der_hex(&self.secret)
    }
}

/// Parse an RSA secret key from PKCS#1 PEM
pub fn secret_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| CryptoError::KeyParse(e.to_string()))
}

/// PKCS#1 DER of an RSA secret key, hex. This is the form the contracts hash and
/// decrypt with.
pub fn secret_der_hex(secret: &RsaPrivateKey) -> Result<String, CryptoError> {
    let der = secret
        .to_pkcs1_der()
        .map_err(|e| CryptoError::KeyEncode(e.to_string()))?;
    Ok(hex::encode(der.as_bytes()))
}

/// Everything secret a poll needs, as held in its key-material directory
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub directory: PathBuf,
    pub zkp: ZkpArtifacts,
    pub rsa: RsaKeypair,
    pub signer_keys: SigningKeypair,
}

/// Idempotent access to a poll's key material
#[async_trait]
pub trait KeyMaterialStore: Send + Sync {
    /// Load the key material in `directory`, generating each missing artifact group.
    /// Artifacts already present are never regenerated.
    async fn ensure(&self, directory: &Path) -> Result<KeyMaterial, Error>;

    /// Load an RSA secret key file (PKCS#1 PEM)
    async fn read_rsa_secret(&self, path: &Path) -> Result<RsaPrivateKey, Error>;
}

/// A [`KeyMaterialStore`] over a directory per poll
pub struct DirKeyStore {
    fs: Arc<dyn FileSystem>,
    prover: Arc<dyn ProofProvider>,
    ledger: Arc<dyn LedgerGateway>,
}

impl DirKeyStore {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        prover: Arc<dyn ProofProvider>,
        ledger: Arc<dyn LedgerGateway>,
    ) -> Self {
        DirKeyStore { fs, prover, ledger }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, Error> {
        self.fs.read(path).await.map_err(|e| Error::io(path, e))
    }

    async fn read_string(&self, path: &Path) -> Result<String, Error> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|_| {
            Error::CorruptState(format!("{} is not valid UTF-8", path.display()))
        })
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<(), Error> {
        self.fs
            .write(path, contents)
            .await
            .map_err(|e| Error::io(path, e))
    }

    async fn ensure_zkp(&self, directory: &Path, files: &[String]) -> Result<ZkpArtifacts, Error> {
        if ZKP_ARTIFACTS.iter().all(|name| contains(files, name)) {
            debug!(directory = %directory.display(), "all ZKP artifacts present, setup skipped");
        } else {
            debug!(directory = %directory.display(), "running ZKP setup");
            self.prover.setup(directory).await?;
        }

        Ok(ZkpArtifacts {
            proof_key: self.read(&directory.join(PROOF_KEY_FILE)).await?,
            verify_key: self.read(&directory.join(VERIFY_KEY_FILE)).await?,
        })
    }

    async fn ensure_rsa(&self, directory: &Path, files: &[String]) -> Result<RsaKeypair, Error> {
        let public_path = directory.join(RSA_PUBLIC_FILE);
        let secret_path = directory.join(RSA_SECRET_FILE);

        match (contains(files, RSA_PUBLIC_FILE), contains(files, RSA_SECRET_FILE)) {
            (true, true) => {
                debug!(directory = %directory.display(), "RSA keys present, generation skipped");
                let public = self.read_string(&public_path).await?;
                let secret = self.read_string(&secret_path).await?;
                Ok(RsaKeypair::from_pem(&public, &secret)?)
            }
            (false, false) => {
                debug!(directory = %directory.display(), bits = RSA_KEY_BITS, "generating RSA keys");
                let keypair = RsaKeypair::generate(RSA_KEY_BITS)?;
                // Secret first: a lone public key file is never written
                self.write(&secret_path, keypair.secret_pem()?.as_bytes())
                    .await?;
                self.write(&public_path, keypair.public_pem()?.as_bytes())
                    .await?;
                Ok(keypair)
            }
            (public, _) => {
                let missing = if public { RSA_SECRET_FILE } else { RSA_PUBLIC_FILE };
                Err(Error::CorruptState(format!(
                    "{} is missing its counterpart {}",
                    directory.display(),
                    missing
                )))
            }
        }
    }

    async fn ensure_signer(
        &self,
        directory: &Path,
        files: &[String],
    ) -> Result<SigningKeypair, Error> {
        let path = directory.join(SIGNER_KEYS_FILE);
        if contains(files, SIGNER_KEYS_FILE) {
            debug!(directory = %directory.display(), "signing keys present, generation skipped");
            let data = self.read(&path).await?;
            return Ok(serde_json::from_slice(&data)?);
        }

        debug!(directory = %directory.display(), "requesting signing keys");
        let keypair = self.ledger.generate_random_sign_keys().await?;
        self.write(&path, serde_json::to_string(&keypair)?.as_bytes())
            .await?;
        Ok(keypair)
    }
}

fn contains(files: &[String], name: &str) -> bool {
    files.iter().any(|f| f == name)
}

#[async_trait]
impl KeyMaterialStore for DirKeyStore {
    async fn ensure(&self, directory: &Path) -> Result<KeyMaterial, Error> {
        let files = self
            .fs
            .list(directory)
            .await
            .map_err(|e| Error::io(directory, e))?;

        let zkp = self.ensure_zkp(directory, &files).await?;
        let rsa = self.ensure_rsa(directory, &files).await?;
        let signer_keys = self.ensure_signer(directory, &files).await?;
        info!(directory = %directory.display(), "key material ready");

        Ok(KeyMaterial {
            directory: directory.to_path_buf(),
            zkp,
            rsa,
            signer_keys,
        })
    }

    async fn read_rsa_secret(&self, path: &Path) -> Result<RsaPrivateKey, Error> {
        let pem = self.read_string(path).await?;
        Ok(secret_from_pem(&pem)?)
    }
}
