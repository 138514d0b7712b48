use super::*;
use crate::testing::*;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

struct Harness {
    fs: Arc<MemFs>,
    prover: Arc<FakeProver>,
    ledger: Arc<FakeLedger>,
    engine: PollLifecycleEngine,
}

fn harness() -> Harness {
    let (fs, prover, ledger) = fakes();
    let engine = PollLifecycleEngine::new(ledger.clone(), prover.clone(), fs.clone());
    Harness {
        fs,
        prover,
        ledger,
        engine,
    }
}

fn create_request(directory: &str) -> CreatePoll {
    CreatePoll {
        directory: PathBuf::from(directory),
        answers: vec!["yes".into(), "no".into()],
        voters: vec![
            BallotKey::from_secret(42).unwrap().public,
            BallotKey::from_secret(7).unwrap().public,
            BallotKey::from_secret(1290).unwrap().public,
        ],
        ending: Utc::now() + Duration::hours(1),
    }
}

// Hands the voter a copy of the poll's proving key in a directory of their own
fn voter_key(h: &Harness, poll_dir: &str, voter_dir: &str) -> PathBuf {
    let key = h
        .fs
        .contents(Path::new(poll_dir).join(PROOF_KEY_FILE))
        .unwrap();
    let path = Path::new(voter_dir).join(PROOF_KEY_FILE);
    h.fs.insert(path.clone(), key);
    path
}

fn ballot(address: &Address, key_path: &Path, number: u64, answers: &[&str]) -> CastBallot {
    CastBallot {
        address: address.clone(),
        key_path: key_path.to_path_buf(),
        ballot_number: BallotNumber::new(number).unwrap(),
        answers: answers.iter().map(|a| Answer::from_text(a).hex).collect(),
    }
}

#[tokio::test]
async fn end_to_end_poll() {
    let h = harness();

    // Create a poll with two answers and three registered voters
    let created = h.engine.create(&create_request("/polls/a")).await.unwrap();
    let poll = h
        .engine
        .poll(&created.address, Utc::now())
        .await
        .unwrap();

    let answers: Vec<&str> = poll.answers.iter().map(|a| a.utf8.as_str()).collect();
    assert_eq!(answers, vec!["yes", "no"]);
    assert_eq!(poll.voters.total, 3);
    assert_eq!(poll.voters.voted, 0);
    assert!(poll.status);
    assert_eq!(poll.phase(), PollPhase::Ongoing);
    assert_eq!(poll.private_key_hex(), None);
    assert_eq!(poll.verifying_key.as_deref(), Some(FAKE_VERIFY_KEY));
    assert_eq!(poll.helper_address.as_ref(), Some(&created.helper));

    let manifest = h.engine.read_manifest(Path::new("/polls/a")).await.unwrap();
    assert_eq!(manifest, created.manifest);
    assert_eq!(manifest.voters.len(), 3);

    // Ballot 42 votes "yes"
    let key_path = voter_key(&h, "/polls/a", "/voters/42");
    let vote = ballot(&created.address, &key_path, 42, &["yes"]);
    h.engine.vote(&vote).await.unwrap();
    assert_eq!(h.prover.proofs.load(Ordering::SeqCst), 1);

    let poll = h
        .engine
        .poll(&created.address, Utc::now())
        .await
        .unwrap();
    let forty_two = BallotNumber::new(42).unwrap();
    assert_eq!(poll.voter_status(forty_two), VoterStatus::Voted);
    assert_eq!(poll.voters.voted, 1);
    assert_eq!(poll.votes.len(), 1);
    assert_eq!(poll.votes[0].decrypted, None);

    // Voting again with the same ballot is rejected, and the cached proof is reused
    let err = h.engine.vote(&vote).await.unwrap_err();
    assert_eq!(err.step, Step::SubmitVote);
    assert_eq!(err.address.as_ref(), Some(&created.address));
    match err.source {
        Error::Ledger(LedgerError::VoteRejected { ballot_number, .. }) => {
            assert_eq!(ballot_number, 42)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.prover.proofs.load(Ordering::SeqCst), 1);
    let poll = h
        .engine
        .poll(&created.address, Utc::now())
        .await
        .unwrap();
    assert_eq!(poll.voters.voted, 1);

    // Finish and check the published key and decrypted vote
    h.engine
        .finish(&created.address, &Path::new("/polls/a").join(RSA_SECRET_FILE))
        .await
        .unwrap();
    let poll = h
        .engine
        .poll(&created.address, Utc::now())
        .await
        .unwrap();
    assert!(!poll.status);
    assert_eq!(poll.phase(), PollPhase::Finished);

    let pem = String::from_utf8(
        h.fs.contents(Path::new("/polls/a").join(RSA_SECRET_FILE))
            .unwrap(),
    )
    .unwrap();
    let secret = secret_der_hex(&secret_from_pem(&pem).unwrap()).unwrap();
    assert_eq!(poll.private_key_hex(), Some(secret.as_str()));
    assert_eq!(poll.votes[0].decrypted.as_deref(), Some("yes"));

    let result = TallyResult::tally(&poll);
    assert_eq!(result.totals["yes"], 1);
    assert_eq!(result.totals["no"], 0);
    assert_eq!(result.winners(), vec!["yes"]);
    assert_eq!(result.turnout.voted, 1);
    assert_eq!(result.turnout.not_voted, 2);

    // A finished poll accepts no more votes
    let key_path = voter_key(&h, "/polls/a", "/voters/7");
    let late = ballot(&created.address, &key_path, 7, &["no"]);
    let err = h.engine.vote(&late).await.unwrap_err();
    assert!(matches!(
        err.source,
        Error::Ledger(LedgerError::VoteRejected { .. })
    ));
}

#[tokio::test]
async fn several_answers_in_one_vote() {
    let h = harness();
    let mut request = create_request("/polls/multi");
    request.answers = vec!["red".into(), "green".into(), "blue".into()];
    let created = h.engine.create(&request).await.unwrap();

    let key_path = voter_key(&h, "/polls/multi", "/voters/1290");
    h.engine
        .vote(&ballot(&created.address, &key_path, 1290, &["red", "blue"]))
        .await
        .unwrap();
    h.engine
        .finish(
            &created.address,
            &Path::new("/polls/multi").join(RSA_SECRET_FILE),
        )
        .await
        .unwrap();

    let poll = h
        .engine
        .poll(&created.address, Utc::now())
        .await
        .unwrap();
    assert_eq!(poll.votes[0].selections(), vec!["red", "blue"]);
    let result = TallyResult::tally(&poll);
    let totals: Vec<usize> = result.totals.values().copied().collect();
    assert_eq!(totals, vec![1, 0, 1]);
}

#[tokio::test]
async fn unregistered_ballot_is_rejected() {
    let h = harness();
    let created = h.engine.create(&create_request("/polls/b")).await.unwrap();

    let key_path = voter_key(&h, "/polls/b", "/voters/5");
    let err = h
        .engine
        .vote(&ballot(&created.address, &key_path, 5, &["no"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.source,
        Error::Ledger(LedgerError::VoteRejected { ballot_number: 5, .. })
    ));

    let poll = h
        .engine
        .poll(&created.address, Utc::now())
        .await
        .unwrap();
    assert_eq!(poll.voters.voted, 0);
    assert!(poll.votes.is_empty());
}

#[tokio::test]
async fn empty_selection_never_reaches_ledger() {
    let h = harness();
    let created = h.engine.create(&create_request("/polls/c")).await.unwrap();
    let key_path = voter_key(&h, "/polls/c", "/voters/42");

    let err = h
        .engine
        .vote(&ballot(&created.address, &key_path, 42, &[]))
        .await
        .unwrap_err();
    assert_eq!(err.step, Step::Validate);
    assert!(matches!(
        err.source,
        Error::Validation(ValidationError::NoAnswers)
    ));
    assert_eq!(h.prover.proofs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_create_request_touches_nothing() {
    let h = harness();
    let mut request = create_request("/polls/invalid");
    request.voters.push(3);

    let err = h.engine.create(&request).await.unwrap_err();
    assert_eq!(err.step, Step::Validate);
    assert!(h.fs.list(Path::new("/polls/invalid")).await.is_err());
    assert_eq!(h.ledger.sign_key_requests.load(Ordering::SeqCst), 0);
    assert_eq!(h.prover.setups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_secret_cannot_finish() {
    let h = harness();
    let created = h.engine.create(&create_request("/polls/d")).await.unwrap();
    h.engine.create(&create_request("/polls/e")).await.unwrap();

    let err = h
        .engine
        .finish(&created.address, &Path::new("/polls/e").join(RSA_SECRET_FILE))
        .await
        .unwrap_err();
    assert_eq!(err.step, Step::SubmitFinish);

    let poll = h
        .engine
        .poll(&created.address, Utc::now())
        .await
        .unwrap();
    assert!(poll.status);
    assert_eq!(poll.private_key_hex(), None);
}

#[tokio::test]
async fn failed_deploy_resumes_without_regenerating() {
    let h = harness();
    let request = create_request("/polls/resume");
    let dir = Path::new("/polls/resume");

    h.ledger.fail_next_deploy(ContractType::Poll);
    let err = h.engine.create(&request).await.unwrap_err();
    assert_eq!(err.step, Step::DeployPoll);
    assert!(err.address.is_some());
    assert_eq!(h.fs.contents(dir.join(MANIFEST_FILE)), None);
    assert!(h.engine.read_manifest(dir).await.is_err());

    let secret_pem = h.fs.contents(dir.join(RSA_SECRET_FILE));
    let signer = h.fs.contents(dir.join(SIGNER_KEYS_FILE));
    assert!(secret_pem.is_some());

    let created = h.engine.create(&request).await.unwrap();
    assert_eq!(h.prover.setups.load(Ordering::SeqCst), 1);
    assert_eq!(h.ledger.sign_key_requests.load(Ordering::SeqCst), 1);
    // The helper from the first attempt is reused, not deployed again
    assert_eq!(h.ledger.deployments.load(Ordering::SeqCst), 2);
    assert_eq!(h.fs.contents(dir.join(RSA_SECRET_FILE)), secret_pem);
    assert_eq!(h.fs.contents(dir.join(SIGNER_KEYS_FILE)), signer);

    // The poll lands at the address the failed attempt was heading for
    assert_eq!(err.address, Some(created.address.clone()));
    assert_eq!(h.engine.read_manifest(dir).await.unwrap(), created.manifest);
}

#[tokio::test]
async fn failed_helper_deploy_resumes() {
    let h = harness();
    let request = create_request("/polls/helper");

    h.ledger.fail_next_deploy(ContractType::Helper);
    let err = h.engine.create(&request).await.unwrap_err();
    assert_eq!(err.step, Step::DeployHelper);
    assert_eq!(h.ledger.deployments.load(Ordering::SeqCst), 0);

    let created = h.engine.create(&request).await.unwrap();
    assert_eq!(err.address, Some(created.helper.clone()));
    assert_eq!(h.ledger.deployments.load(Ordering::SeqCst), 2);

    // Both contracts are live now, so a further create only rewrites the manifest
    let again = h.engine.create(&request).await.unwrap();
    assert_eq!(again, created);
    assert_eq!(h.ledger.deployments.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn corrupt_key_material_stops_create() {
    let h = harness();
    let dir = Path::new("/polls/corrupt");
    h.fs.insert(dir.join(RSA_PUBLIC_FILE), b"-----BEGIN PUBLIC KEY-----".to_vec());

    let err = h.engine.create(&create_request("/polls/corrupt")).await.unwrap_err();
    assert_eq!(err.step, Step::EnsureKeys);
    assert!(matches!(err.source, Error::CorruptState(_)));
    assert_eq!(h.ledger.deployments.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn polls_are_listed_from_ledger() {
    let h = harness();
    assert!(h.engine.polls().await.unwrap().is_empty());

    let first = h.engine.create(&create_request("/polls/f")).await.unwrap();
    let second = h.engine.create(&create_request("/polls/g")).await.unwrap();
    assert_ne!(first.address, second.address);

    let mut listed: Vec<Address> = h
        .engine
        .polls()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.address)
        .collect();
    listed.sort();
    let mut expected = vec![first.address, second.address];
    expected.sort();
    assert_eq!(listed, expected);

    let err = h
        .engine
        .poll(&Address::new("0:missing"), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err.source,
        Error::Ledger(LedgerError::PollNotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_creates_share_key_material() {
    let h = Arc::new(harness());
    let request = create_request("/polls/race");

    let (first, second) = tokio::join!(h.engine.create(&request), h.engine.create(&request));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.address, second.address);
    assert_eq!(h.ledger.deployments.load(Ordering::SeqCst), 2);
    assert_eq!(h.prover.setups.load(Ordering::SeqCst), 1);
    assert_eq!(h.ledger.sign_key_requests.load(Ordering::SeqCst), 1);
}
