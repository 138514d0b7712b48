use crate::*;
use indexmap::IndexMap;

/// How many registered voters have and have not voted
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Turnout {
    pub total: u32,
    pub voted: u32,
    pub not_voted: u32,
}

/// Results of a finished poll
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TallyResult {
    /// Number of ballots that could be counted
    pub num_votes: usize,

    /// Votes per answer, in the poll's answer order
    pub totals: IndexMap<String, usize>,

    pub turnout: Turnout,
}

impl TallyResult {
    /// Count the decrypted votes of a poll. Votes that are still encrypted are not
    /// counted, so an ongoing poll tallies to zero.
    pub fn tally(poll: &PollRecord) -> Self {
        let mut totals: IndexMap<String, usize> = poll
            .answers
            .iter()
            .map(|answer| (answer.utf8.clone(), 0))
            .collect();

        let mut num_votes = 0;
        for vote in &poll.votes {
            if vote.decrypted.is_none() {
                continue;
            }
            num_votes += 1;
            for selection in vote.selections() {
                if let Some(total) = totals.get_mut(selection) {
                    *total += 1;
                }
            }
        }

        TallyResult {
            num_votes,
            totals,
            turnout: Turnout::of(&poll.voters),
        }
    }

    /// Answers with the most votes. Empty if nothing was counted.
    pub fn winners(&self) -> Vec<&str> {
        let max = match self.totals.values().copied().max() {
            Some(max) if max > 0 => max,
            _ => return vec![],
        };
        self.totals
            .iter()
            .filter(|(_, total)| **total == max)
            .map(|(answer, _)| answer.as_str())
            .collect()
    }
}

impl Turnout {
    pub fn of(voters: &Voters) -> Self {
        let voted = voters
            .detailed
            .values()
            .filter(|status| **status == VoterStatus::Voted)
            .count() as u32;
        Turnout {
            total: voters.total,
            voted,
            not_voted: voters.total.saturating_sub(voted),
        }
    }
}
