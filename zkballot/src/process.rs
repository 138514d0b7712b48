use crate::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, trace};

/// A [`LedgerGateway`] backed by the ledger proxy binary
///
/// Each call runs `<binary> --function <name> --params <json>` from the binary's
/// own directory. On success the proxy prints the path of a JSON response file,
/// which is read and then removed.
#[derive(Debug, Clone)]
pub struct ProcessLedgerGateway {
    binary: PathBuf,
}

impl ProcessLedgerGateway {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        ProcessLedgerGateway {
            binary: binary.into(),
        }
    }

    async fn call(&self, function: &'static str, params: Value) -> Result<Option<Value>, LedgerError> {
        let params = params.to_string();
        debug!(function, "calling ledger proxy");
        trace!(function, %params, "ledger proxy params");

        let mut command = Command::new(&self.binary);
        command.args(&["--function", function, "--params", &params]);
        if let Some(dir) = self.binary.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let output = command.output().await.map_err(LedgerError::Spawn)?;
        let stdout = check_output(&output).map_err(|reason| LedgerError::Call { function, reason })?;

        let response = stdout.trim();
        if response.is_empty() {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(response)
            .await
            .map_err(|e| LedgerError::Response(format!("reading {}: {}", response, e)))?;
        if let Err(e) = tokio::fs::remove_file(response).await {
            debug!(function, file = response, error = %e, "could not remove response file");
        }
        let value = serde_json::from_str(&contents)
            .map_err(|e| LedgerError::Response(format!("{}: {}", function, e)))?;
        Ok(Some(value))
    }

    async fn call_for<T: DeserializeOwned>(
        &self,
        function: &'static str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let value = self
            .call(function, params)
            .await?
            .ok_or(LedgerError::UnexpectedOutput { function })?;
        serde_json::from_value(value).map_err(|_| LedgerError::UnexpectedOutput { function })
    }
}

// Fails on a non-zero exit or anything written to stderr, otherwise yields stdout
fn check_output(output: &Output) -> Result<String, String> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        let reason = stderr.trim();
        return Err(if reason.is_empty() {
            output.status.to_string()
        } else {
            reason.to_owned()
        });
    }
    if !stderr.trim().is_empty() {
        return Err(stderr.trim().to_owned());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Deserialize)]
struct DecodedMessage {
    decoded: Option<DecodedOutput>,
}

#[derive(Deserialize)]
struct DecodedOutput {
    output: Option<Value>,
}

#[async_trait]
impl LedgerGateway for ProcessLedgerGateway {
    async fn account_address(
        &self,
        contract: ContractType,
        options: &AccountOptions,
    ) -> Result<Address, LedgerError> {
        self.call_for(
            "accountAddress",
            json!({ "type": contract, "options": options }),
        )
        .await
    }

    async fn account_type(
        &self,
        contract: ContractType,
        address: &Address,
    ) -> Result<AccountType, LedgerError> {
        self.call_for(
            "accountType",
            json!({ "type": contract, "accountOptions": AccountOptions::at(address.clone()) }),
        )
        .await
    }

    async fn account_deploy(
        &self,
        deployment: &Deployment,
        options: &AccountOptions,
    ) -> Result<Address, LedgerError> {
        let contract = deployment.contract_type();
        let mut params = json!({ "type": contract, "accountOptions": options });
        if let Deployment::Poll(init) = deployment {
            params["deployOptions"] = json!({ "initInput": init });
        }
        self.call_for("accountDeploy", params)
            .await
            .map_err(|e| LedgerError::Deploy {
                contract,
                reason: e.to_string(),
            })
    }

    async fn run_local(
        &self,
        contract: ContractType,
        address: &Address,
        call: &LocalCall,
    ) -> Result<LocalOutput, LedgerError> {
        let function = call.function_name();
        let message: DecodedMessage = self
            .call_for(
                "accountRunLocal",
                json!({
                    "type": contract,
                    "accountOptions": AccountOptions::at(address.clone()),
                    "runOptions": call,
                }),
            )
            .await?;
        let output = message
            .decoded
            .and_then(|d| d.output)
            .ok_or(LedgerError::UnexpectedOutput { function })?;
        serde_json::from_value(output).map_err(|_| LedgerError::UnexpectedOutput { function })
    }

    async fn run(
        &self,
        contract: ContractType,
        address: &Address,
        call: &RemoteCall,
    ) -> Result<MessageResult, LedgerError> {
        let function = call.function_name();
        let result = self
            .call(
                "accountRun",
                json!({
                    "type": contract,
                    "accountOptions": AccountOptions::at(address.clone()),
                    "runOptions": call,
                }),
            )
            .await
            .map_err(|e| match e {
                LedgerError::Call { reason, .. } => LedgerError::Call { function, reason },
                other => other,
            })?;
        Ok(MessageResult(result.unwrap_or(Value::Null)))
    }

    async fn generate_random_sign_keys(&self) -> Result<SigningKeypair, LedgerError> {
        self.call_for("generateRandomSignKeys", json!({})).await
    }

    async fn poll_details(
        &self,
        address: &Address,
        created: DateTime<Utc>,
    ) -> Result<PollRecord, LedgerError> {
        let value = self
            .call(
                "getPollDetails",
                json!({ "address": address, "created": created.timestamp().to_string() }),
            )
            .await?;
        match value {
            None | Some(Value::Null) => Err(LedgerError::PollNotFound(address.to_string())),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| LedgerError::Response(format!("getPollDetails: {}", e))),
        }
    }

    async fn poll_list(&self) -> Result<Vec<PollRecord>, LedgerError> {
        let value = self.call("getPollList", json!({})).await?;
        match value {
            None | Some(Value::Null) => Ok(vec![]),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| LedgerError::Response(format!("getPollList: {}", e))),
        }
    }
}

/// A [`ProofProvider`] backed by the ZKP toolchain binary, run from inside the
/// key-material directory
#[derive(Debug, Clone)]
pub struct ProcessProofProvider {
    binary: PathBuf,
}

impl ProcessProofProvider {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        ProcessProofProvider {
            binary: binary.into(),
        }
    }

    async fn run(&self, directory: &Path, args: &[&str]) -> Result<Result<(), String>, ProofError> {
        debug!(directory = %directory.display(), ?args, "running proof toolchain");
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(directory)
            .output()
            .await
            .map_err(ProofError::Spawn)?;
        Ok(check_output(&output).map(|stdout| {
            trace!(stdout = stdout.trim(), "proof toolchain output");
        }))
    }
}

#[async_trait]
impl ProofProvider for ProcessProofProvider {
    async fn setup(&self, directory: &Path) -> Result<(), ProofError> {
        let ballot = SETUP_BALLOT_NUMBER.to_string();
        self.run(directory, &["--setup", "--ballot_number", &ballot])
            .await?
            .map_err(|reason| ProofError::Setup {
                directory: directory.to_path_buf(),
                reason,
            })
    }

    async fn prove(&self, directory: &Path, ballot: BallotNumber) -> Result<Vec<u8>, ProofError> {
        let ballot_number = ballot.get();
        let arg = ballot_number.to_string();
        self.run(directory, &["--proof", "--ballot_number", &arg])
            .await?
            .map_err(|reason| ProofError::Prove {
                ballot_number,
                reason,
            })?;

        let path = directory.join(PROOF_FILE);
        tokio::fs::read(&path).await.map_err(|e| ProofError::Prove {
            ballot_number,
            reason: format!("reading {}: {}", path.display(), e),
        })
    }
}
