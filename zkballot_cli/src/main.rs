use clap::{App, AppSettings, Arg, SubCommand};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zkballot::{LocalFs, PollLifecycleEngine, ProcessLedgerGateway, ProcessProofProvider};

mod command_create;
mod command_finish;
mod command_keygen;
mod command_list;
mod command_show;
mod command_vote;
mod config;

use command_create::command_create;
use command_finish::command_finish;
use command_keygen::command_keygen;
use command_list::command_list;
use command_show::command_show;
use command_vote::command_vote;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = App::new("zkballot")
        .version("0.1.0")
        .about("Creates, votes in and finishes ZKP-authenticated ledger polls")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::with_name("ledger-bin")
                .long("ledger-bin")
                .takes_value(true)
                .help("Ledger proxy binary - can also be set with ZKBALLOT_LEDGER_BIN"),
        )
        .arg(
            Arg::with_name("zkp-bin")
                .long("zkp-bin")
                .takes_value(true)
                .help("ZKP toolchain binary - can also be set with ZKBALLOT_ZKP_BIN"),
        )
        .subcommand(
            SubCommand::with_name("keygen")
                .about("Generate a ballot key for a voter")
                .arg(
                    Arg::with_name("OUTPUT")
                        .index(1)
                        .required(false)
                        .help("Also save the key to this file"),
                ),
        )
        .subcommand(
            SubCommand::with_name("create")
                .about("Create a poll")
                .arg(
                    Arg::with_name("DIR")
                        .index(1)
                        .required(true)
                        .help("Key-material directory for the poll"),
                )
                .arg(
                    Arg::with_name("answer")
                        .long("answer")
                        .short("a")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .required(true)
                        .help("An answer, repeat in display order"),
                )
                .arg(
                    Arg::with_name("voter")
                        .long("voter")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .required(true)
                        .help("A registered ballot public key, repeat for each voter"),
                )
                .arg(
                    Arg::with_name("ending")
                        .long("ending")
                        .takes_value(true)
                        .required(true)
                        .help("Voting deadline, RFC 3339 or unix seconds"),
                ),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Cast a vote")
                .arg(Arg::with_name("ADDRESS").index(1).required(true))
                .arg(
                    Arg::with_name("key")
                        .long("key")
                        .takes_value(true)
                        .required(true)
                        .help("Path to the poll's p_key file"),
                )
                .arg(
                    Arg::with_name("ballot")
                        .long("ballot")
                        .takes_value(true)
                        .required(true)
                        .help("Ballot number (the secret of the voter's ballot key)"),
                )
                .arg(
                    Arg::with_name("answer")
                        .long("answer")
                        .short("a")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .required(true)
                        .help("A selected answer, repeat to select several"),
                ),
        )
        .subcommand(
            SubCommand::with_name("finish")
                .about("Finish a poll by publishing its RSA secret key")
                .arg(Arg::with_name("ADDRESS").index(1).required(true))
                .arg(
                    Arg::with_name("secret")
                        .long("secret")
                        .takes_value(true)
                        .required(true)
                        .help("Path to the poll's rsa.secret.pem"),
                ),
        )
        .subcommand(
            SubCommand::with_name("show")
                .about("Show a poll and its results")
                .arg(Arg::with_name("ADDRESS").index(1).required(true))
                .arg(
                    Arg::with_name("created")
                        .long("created")
                        .takes_value(true)
                        .help("Poll creation time, unix seconds"),
                ),
        )
        .subcommand(SubCommand::with_name("list").about("List polls"))
        .get_matches();

    let config = Config::from_env().with_matches(&matches);
    init_logging(&config.log);
    debug!(
        ledger_bin = %config.ledger_bin.display(),
        zkp_bin = %config.zkp_bin.display(),
        "resolved configuration"
    );

    let ledger = Arc::new(ProcessLedgerGateway::new(&config.ledger_bin));
    let prover = Arc::new(ProcessProofProvider::new(&config.zkp_bin));
    let engine = PollLifecycleEngine::new(ledger, prover, Arc::new(LocalFs));

    match matches.subcommand() {
        ("keygen", Some(matches)) => command_keygen(matches).await,
        ("create", Some(matches)) => command_create(matches, &engine).await,
        ("vote", Some(matches)) => command_vote(matches, &engine).await,
        ("finish", Some(matches)) => command_finish(matches, &engine).await,
        ("show", Some(matches)) => command_show(matches, &engine).await,
        ("list", Some(_)) => command_list(&engine).await,
        _ => Ok(()),
    }
}

fn init_logging(directives: &str) {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!("zkballot: invalid ZKBALLOT_LOG {:?}: {}", directives, e);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Value of a required argument. clap has already rejected the command line if it
/// is missing.
pub(crate) fn required<'a>(matches: &'a clap::ArgMatches, name: &str) -> anyhow::Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| anyhow::anyhow!("{} is required", name))
}
