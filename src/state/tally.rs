//! Vote counting.
//!
//! Results are computed once, on the server, when a session closes.

use std::collections::HashMap;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::models::{
    BallotRecord, CandidateTally, PersonResults, ResultsData, RoleEntity, TransparencyLevel,
    VoteChoice, VoteEntity, VoteFormat, VoteSessionEntity, YesNoChoice, YesNoResults,
};

const UNKNOWN_ROLE: &str = "Unknown";

/// Compute the result of `session` from its ballots.
pub fn tally(
    session: &VoteSessionEntity,
    votes: &[&VoteEntity],
    roles: &IndexMap<Uuid, RoleEntity>,
) -> ResultsData {
    let ballots = if session.transparency_level == TransparencyLevel::Open {
        ballot_records(votes, roles)
    } else {
        Vec::new()
    };

    match session.vote_format {
        VoteFormat::ChoosePerson => {
            ResultsData::ChoosePerson(count_people(votes, roles, session.threshold, ballots))
        }
        VoteFormat::YesNo => ResultsData::YesNo(count_yes_no(votes, ballots)),
    }
}

/// Share of `count` in `total` as a percentage with one decimal.
pub fn percentage(count: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(count) / f64::from(total) * 1000.0).round() / 10.0
}

fn role_name(roles: &IndexMap<Uuid, RoleEntity>, role_id: Uuid) -> String {
    roles
        .get(&role_id)
        .map(|role| role.name.clone())
        .unwrap_or_else(|| UNKNOWN_ROLE.to_string())
}

fn ballot_records(votes: &[&VoteEntity], roles: &IndexMap<Uuid, RoleEntity>) -> Vec<BallotRecord> {
    votes
        .iter()
        .map(|vote| BallotRecord {
            voter_role_id: vote.voter_role_id,
            voter_name: role_name(roles, vote.voter_role_id),
            choice: vote.choice,
        })
        .collect()
}

fn count_people(
    votes: &[&VoteEntity],
    roles: &IndexMap<Uuid, RoleEntity>,
    threshold: Option<u32>,
    ballots: Vec<BallotRecord>,
) -> PersonResults {
    let mut counts: HashMap<Uuid, u32> = HashMap::new();
    for vote in votes {
        if let VoteChoice::Person { role_id } = vote.choice {
            *counts.entry(role_id).or_default() += 1;
        }
    }

    let total_votes = votes.len() as u32;
    let mut all_candidates = counts
        .into_iter()
        .map(|(role_id, vote_count)| CandidateTally {
            role_id,
            name: role_name(roles, role_id),
            vote_count,
            percentage: percentage(vote_count, total_votes),
        })
        .collect::<Vec<_>>();
    all_candidates.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.role_id.cmp(&b.role_id))
    });

    let top_tied = all_candidates.len() > 1
        && all_candidates[0].vote_count == all_candidates[1].vote_count;

    let Some(threshold) = threshold else {
        let winner = if top_tied {
            None
        } else {
            all_candidates.first().cloned()
        };
        return PersonResults {
            winner,
            all_candidates,
            runoff_candidates: Vec::new(),
            total_votes,
            tie: top_tied,
            threshold_required: None,
            threshold_met: None,
            ballots,
        };
    };

    let threshold_met = !top_tied
        && all_candidates
            .first()
            .is_some_and(|top| top.vote_count >= threshold);

    let runoff_candidates = if !threshold_met && all_candidates.len() > 1 {
        runoff(&all_candidates)
    } else {
        Vec::new()
    };

    PersonResults {
        winner: threshold_met
            .then(|| all_candidates.first().cloned())
            .flatten(),
        tie: runoff_candidates.len() > 2,
        all_candidates,
        runoff_candidates,
        total_votes,
        threshold_required: Some(threshold),
        threshold_met: Some(threshold_met),
        ballots,
    }
}

/// Everyone tied at the top; a lone leader is joined by everyone tied second.
fn runoff(sorted: &[CandidateTally]) -> Vec<CandidateTally> {
    let top = sorted[0].vote_count;
    let mut runoff = sorted
        .iter()
        .take_while(|candidate| candidate.vote_count == top)
        .cloned()
        .collect::<Vec<_>>();

    if runoff.len() == 1 {
        let second = sorted[1].vote_count;
        runoff.extend(
            sorted
                .iter()
                .skip(1)
                .take_while(|candidate| candidate.vote_count == second)
                .cloned(),
        );
    }

    runoff
}

fn count_yes_no(votes: &[&VoteEntity], ballots: Vec<BallotRecord>) -> YesNoResults {
    let (mut yes, mut no, mut abstain) = (0u32, 0u32, 0u32);
    for vote in votes {
        if let VoteChoice::YesNo { choice } = vote.choice {
            match choice {
                YesNoChoice::Yes => yes += 1,
                YesNoChoice::No => no += 1,
                YesNoChoice::Abstain => abstain += 1,
            }
        }
    }

    let total = yes + no + abstain;
    YesNoResults {
        yes,
        no,
        abstain,
        total,
        yes_percentage: percentage(yes, total),
        no_percentage: percentage(no, total),
        abstain_percentage: percentage(abstain, total),
        passed: yes > no,
        ballots,
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{
        AnimationSpeed, ParticipantType, RevealTiming, RoleStatus, VoteScope, VoteStatus,
        VoteType,
    };

    struct Fixture {
        roles: IndexMap<Uuid, RoleEntity>,
        clan_id: Uuid,
    }

    impl Fixture {
        fn new(names: &[&str]) -> (Self, Vec<Uuid>) {
            let clan_id = Uuid::new_v4();
            let mut roles = IndexMap::new();
            let mut ids = Vec::new();
            for name in names {
                let id = Uuid::new_v4();
                roles.insert(
                    id,
                    RoleEntity {
                        id,
                        clan_id,
                        name: (*name).to_string(),
                        position: None,
                        background: None,
                        participant_type: ParticipantType::Human,
                        assigned_participant: None,
                        access_code: format!("CODE{}", ids.len()),
                        avatar_url: None,
                        status: RoleStatus::Active,
                    },
                );
                ids.push(id);
            }
            (Self { roles, clan_id }, ids)
        }

        fn ballot(&self, session: &VoteSessionEntity, voter: Uuid, choice: VoteChoice) -> VoteEntity {
            VoteEntity {
                id: Uuid::new_v4(),
                session_id: session.id,
                voter_role_id: voter,
                voter_clan_id: self.clan_id,
                choice,
                cast_at: SystemTime::now(),
                on_behalf: None,
            }
        }
    }

    fn session(format: VoteFormat, threshold: Option<u32>) -> VoteSessionEntity {
        VoteSessionEntity {
            id: Uuid::new_v4(),
            phase_id: None,
            template_id: "custom".into(),
            vote_type: VoteType::ElectionRound,
            vote_format: format,
            scope: VoteScope::All,
            scope_clan_id: None,
            eligible_candidates: Vec::new(),
            proposal_title: None,
            proposal_description: None,
            transparency_level: TransparencyLevel::Anonymous,
            reveal_timing: RevealTiming::FacilitatorManual,
            animation_speed: AnimationSpeed::Normal,
            allow_skip_animation: false,
            threshold,
            time_limit_minutes: 5,
            status: VoteStatus::Closed,
            created_at: SystemTime::now(),
            closed_at: None,
            announced_at: None,
        }
    }

    fn person_votes(
        fixture: &Fixture,
        session: &VoteSessionEntity,
        voters: &[Uuid],
        picks: &[Uuid],
    ) -> Vec<VoteEntity> {
        voters
            .iter()
            .zip(picks)
            .map(|(voter, pick)| fixture.ballot(session, *voter, VoteChoice::Person { role_id: *pick }))
            .collect()
    }

    fn person(result: ResultsData) -> PersonResults {
        match result {
            ResultsData::ChoosePerson(person) => person,
            other => panic!("expected person results, got {other:?}"),
        }
    }

    #[test]
    fn plurality_winner_without_threshold() {
        let (fixture, ids) = Fixture::new(&["Aria", "Bran", "Cato", "Dax"]);
        let session = session(VoteFormat::ChoosePerson, None);
        let votes = person_votes(&fixture, &session, &ids, &[ids[0], ids[0], ids[1], ids[0]]);
        let refs = votes.iter().collect::<Vec<_>>();

        let result = person(tally(&session, &refs, &fixture.roles));
        let winner = result.winner.unwrap();
        assert_eq!(winner.role_id, ids[0]);
        assert_eq!(winner.vote_count, 3);
        assert_eq!(winner.percentage, 75.0);
        assert!(!result.tie);
        assert_eq!(result.total_votes, 4);
        assert_eq!(result.all_candidates.len(), 2);
        assert!(result.ballots.is_empty());
    }

    #[test]
    fn tie_has_no_winner_and_sorts_by_name() {
        let (fixture, ids) = Fixture::new(&["Zed", "Abe"]);
        let session = session(VoteFormat::ChoosePerson, None);
        let votes = person_votes(&fixture, &session, &ids, &[ids[0], ids[1]]);
        let refs = votes.iter().collect::<Vec<_>>();

        let result = person(tally(&session, &refs, &fixture.roles));
        assert!(result.tie);
        assert!(result.winner.is_none());
        assert_eq!(result.all_candidates[0].name, "Abe");
    }

    #[test]
    fn threshold_met_declares_winner() {
        let (fixture, ids) = Fixture::new(&["Aria", "Bran", "Cato"]);
        let session = session(VoteFormat::ChoosePerson, Some(2));
        let votes = person_votes(&fixture, &session, &ids, &[ids[1], ids[1], ids[0]]);
        let refs = votes.iter().collect::<Vec<_>>();

        let result = person(tally(&session, &refs, &fixture.roles));
        assert_eq!(result.threshold_met, Some(true));
        assert_eq!(result.threshold_required, Some(2));
        assert_eq!(result.winner.unwrap().role_id, ids[1]);
        assert!(result.runoff_candidates.is_empty());
    }

    #[test]
    fn lone_leader_below_threshold_meets_second_place_in_runoff() {
        let (fixture, ids) = Fixture::new(&["Aria", "Bran", "Cato", "Dax", "Eda", "Fay"]);
        let session = session(VoteFormat::ChoosePerson, Some(4));
        let picks = [ids[0], ids[0], ids[0], ids[1], ids[2], ids[3]];
        let votes = person_votes(&fixture, &session, &ids, &picks);
        let refs = votes.iter().collect::<Vec<_>>();

        let result = person(tally(&session, &refs, &fixture.roles));
        assert_eq!(result.threshold_met, Some(false));
        assert!(result.winner.is_none());
        let runoff = result
            .runoff_candidates
            .iter()
            .map(|candidate| candidate.role_id)
            .collect::<Vec<_>>();
        assert_eq!(runoff, vec![ids[0], ids[1], ids[2], ids[3]]);
        assert!(result.tie);
    }

    #[test]
    fn top_tie_below_threshold_keeps_only_leaders() {
        let (fixture, ids) = Fixture::new(&["Aria", "Bran", "Cato", "Dax", "Eda"]);
        let session = session(VoteFormat::ChoosePerson, Some(3));
        let picks = [ids[0], ids[0], ids[1], ids[1], ids[2]];
        let votes = person_votes(&fixture, &session, &ids, &picks);
        let refs = votes.iter().collect::<Vec<_>>();

        let result = person(tally(&session, &refs, &fixture.roles));
        assert_eq!(result.runoff_candidates.len(), 2);
        assert!(!result.tie);
        assert!(result.winner.is_none());
    }

    #[test]
    fn yes_no_passes_on_strict_majority() {
        let (fixture, ids) = Fixture::new(&["Aria", "Bran", "Cato"]);
        let mut session = session(VoteFormat::YesNo, None);
        session.transparency_level = TransparencyLevel::Open;
        let votes = vec![
            fixture.ballot(&session, ids[0], VoteChoice::YesNo { choice: YesNoChoice::Yes }),
            fixture.ballot(&session, ids[1], VoteChoice::YesNo { choice: YesNoChoice::No }),
            fixture.ballot(&session, ids[2], VoteChoice::YesNo { choice: YesNoChoice::Abstain }),
        ];
        let refs = votes.iter().collect::<Vec<_>>();

        let ResultsData::YesNo(result) = tally(&session, &refs, &fixture.roles) else {
            panic!("expected yes/no results");
        };
        assert_eq!((result.yes, result.no, result.abstain, result.total), (1, 1, 1, 3));
        assert_eq!(result.yes_percentage, 33.3);
        assert!(!result.passed);
        assert_eq!(result.ballots.len(), 3);
        assert_eq!(result.ballots[0].voter_name, "Aria");
    }

    #[test]
    fn empty_tally_is_zeroed() {
        let (fixture, _) = Fixture::new(&[]);
        let session = session(VoteFormat::ChoosePerson, None);
        let result = person(tally(&session, &[], &fixture.roles));
        assert!(result.winner.is_none());
        assert_eq!(result.total_votes, 0);
        assert!(!result.tie);
        assert_eq!(percentage(0, 0), 0.0);
    }
}
