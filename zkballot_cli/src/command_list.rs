use zkballot::PollLifecycleEngine;

pub async fn command_list(engine: &PollLifecycleEngine) -> anyhow::Result<()> {
    let polls = engine.polls().await?;
    if polls.is_empty() {
        eprintln!("No polls created yet");
        return Ok(());
    }

    for poll in polls {
        let status = if poll.status { "ongoing" } else { "finished" };
        println!(
            "{}\t{}\t{}\t{}/{} voted",
            poll.address,
            poll.created.to_rfc3339(),
            status,
            poll.voters.voted,
            poll.voters.total
        );
    }
    Ok(())
}
