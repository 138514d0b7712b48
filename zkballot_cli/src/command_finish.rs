use crate::required;
use std::path::Path;
use zkballot::{Address, PollLifecycleEngine};

pub async fn command_finish(
    matches: &clap::ArgMatches<'_>,
    engine: &PollLifecycleEngine,
) -> anyhow::Result<()> {
    let address = Address::new(required(matches, "ADDRESS")?);
    let secret = Path::new(required(matches, "secret")?);

    let result = engine.finish(&address, secret).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
