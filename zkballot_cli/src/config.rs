use std::env::var;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Config {
    pub ledger_bin: PathBuf,
    pub zkp_bin: PathBuf,
    pub log: String,
}

impl Config {
    pub fn from_env() -> Self {
        let ledger_bin = match var("ZKBALLOT_LEDGER_BIN") {
            Ok(val) => PathBuf::from(val),
            Err(_e) => default_binary("bin/everscale", "proxy"),
        };

        let zkp_bin = match var("ZKBALLOT_ZKP_BIN") {
            Ok(val) => PathBuf::from(val),
            Err(_e) => default_binary("bin", "zkp"),
        };

        let log = match var("ZKBALLOT_LOG") {
            Ok(val) => val,
            Err(_e) => "info".to_owned(),
        };

        Config {
            ledger_bin,
            zkp_bin,
            log,
        }
    }

    /// Command-line flags take precedence over the environment
    pub fn with_matches(mut self, matches: &clap::ArgMatches) -> Self {
        if let Some(path) = matches.value_of("ledger-bin") {
            self.ledger_bin = PathBuf::from(path);
        }
        if let Some(path) = matches.value_of("zkp-bin") {
            self.zkp_bin = PathBuf::from(path);
        }
        if matches.occurrences_of("v") > 0 {
            self.log = "debug".to_owned();
        }
        self
    }
}

// The external binaries ship one build per platform, named `<name>.<os>.<arch>`
fn default_binary(dir: &str, name: &str) -> PathBuf {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        os => os,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        arch => arch,
    };
    PathBuf::from(".")
        .join(dir)
        .join(format!("{}.{}.{}", name, os, arch))
}
