use crate::required;
use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;
use zkballot::{CreatePoll, PollLifecycleEngine};

pub async fn command_create(
    matches: &clap::ArgMatches<'_>,
    engine: &PollLifecycleEngine,
) -> anyhow::Result<()> {
    let directory = PathBuf::from(required(matches, "DIR")?);
    let answers: Vec<String> = matches
        .values_of("answer")
        .map(|values| values.map(String::from).collect())
        .unwrap_or_default();
    let voters = matches
        .values_of("voter")
        .map(|values| values.map(parse_voter).collect::<anyhow::Result<Vec<u64>>>())
        .unwrap_or_else(|| Ok(vec![]))?;
    let ending = parse_ending(required(matches, "ending")?)?;

    let created = engine
        .create(&CreatePoll {
            directory,
            answers,
            voters,
            ending,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&created.manifest)?);
    Ok(())
}

fn parse_voter(value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("zkballot create: invalid voter {:?}: {}", value, e))
}

/// RFC 3339, or unix seconds
fn parse_ending(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ending) = DateTime::parse_from_rfc3339(value) {
        return Ok(ending.with_timezone(&Utc));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| anyhow::anyhow!("zkballot create: invalid ending {:?}", value))
}
