use crate::required;
use chrono::{TimeZone, Utc};
use zkballot::{Address, PollLifecycleEngine, TallyResult};

pub async fn command_show(
    matches: &clap::ArgMatches<'_>,
    engine: &PollLifecycleEngine,
) -> anyhow::Result<()> {
    let address = Address::new(required(matches, "ADDRESS")?);
    let created = matches.value_of("created").unwrap_or("0");
    let created = created
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| anyhow::anyhow!("zkballot show: invalid created time {:?}", created))?;

    let poll = engine.poll(&address, created).await?;
    let phase = poll.phase();
    let tally = TallyResult::tally(&poll);

    let output = serde_json::json!({
        "poll": poll,
        "phase": phase,
        "results": tally,
        "winners": tally.winners(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
