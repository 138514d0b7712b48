use zkballot::BallotKey;

pub async fn command_keygen(matches: &clap::ArgMatches<'_>) -> anyhow::Result<()> {
    let key = BallotKey::generate();
    let json = key.to_json();

    if let Some(output) = matches.value_of("OUTPUT") {
        tokio::fs::write(output, &json)
            .await
            .map_err(|e| anyhow::anyhow!("zkballot keygen: unable to write {}: {}", output, e))?;
        eprintln!("ballot key saved to {}", output);
    }

    println!("{}", json);
    Ok(())
}
