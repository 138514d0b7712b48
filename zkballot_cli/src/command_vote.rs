use crate::required;
use std::path::PathBuf;
use zkballot::{Address, Answer, BallotNumber, CastBallot, PollLifecycleEngine};

pub async fn command_vote(
    matches: &clap::ArgMatches<'_>,
    engine: &PollLifecycleEngine,
) -> anyhow::Result<()> {
    let address = Address::new(required(matches, "ADDRESS")?);
    let key_path = PathBuf::from(required(matches, "key")?);
    let ballot = required(matches, "ballot")?;
    let ballot_number = ballot
        .parse::<u64>()
        .map_err(anyhow::Error::from)
        .and_then(|n| Ok(BallotNumber::new(n)?))
        .map_err(|e| anyhow::anyhow!("zkballot vote: invalid ballot number {:?}: {}", ballot, e))?;

    // Answers are selected by their display text
    let answers = matches
        .values_of("answer")
        .map(|values| values.map(|text| Answer::from_text(text).hex).collect())
        .unwrap_or_default();

    let result = engine
        .vote(&CastBallot {
            address,
            key_path,
            ballot_number,
            answers,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
