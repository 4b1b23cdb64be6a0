//! The elected King and the decisions they hand in once crowned.

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::{
        Alliance, Appointments, BudgetPriorities, InternationalAffairs, KingDecisionEntity,
        TaxPolicy, VoteStatus, WarTarget,
    },
    state::simulation::{SimulationError, SimulationResult, SimulationSession},
};

/// Template id of the final election round; its announced winner is the King.
pub const FINAL_ROUND_TEMPLATE: &str = "election_round_2";

/// Decisions as submitted, before identity and timestamps are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KingDecisionDraft {
    pub taxes: TaxPolicy,
    pub budget_priorities: BudgetPriorities,
    pub appointments: Appointments,
    pub international_affairs: InternationalAffairs,
    pub other_decisions: Option<String>,
    pub final_speech_transcript: Option<String>,
}

impl SimulationSession {
    /// Winner of the latest announced final round, after any override.
    pub fn current_king(&self) -> Option<Uuid> {
        self.vote_sessions
            .values()
            .rev()
            .filter(|session| {
                session.template_id == FINAL_ROUND_TEMPLATE
                    && session.status == VoteStatus::Announced
            })
            .find_map(|session| self.results.get(&session.id))
            .and_then(|result| result.winner_role_id())
    }

    /// Store or replace the King's decisions; locked once revealed.
    pub fn submit_king_decision(
        &mut self,
        role_id: Uuid,
        draft: KingDecisionDraft,
        now: SystemTime,
    ) -> SimulationResult<&KingDecisionEntity> {
        let king = self.current_king().ok_or(SimulationError::NoKing)?;
        if king != role_id {
            return Err(SimulationError::NotKing(role_id));
        }
        if self
            .king_decision
            .as_ref()
            .is_some_and(|decision| decision.revealed_at.is_some())
        {
            return Err(SimulationError::DecisionRevealed);
        }
        self.check_draft(king, &draft)?;

        let mut war_declarations = Vec::new();
        for target in draft.international_affairs.war_declarations {
            if !war_declarations.contains(&target) {
                war_declarations.push(target);
            }
        }
        let (id, submitted_at) = match &self.king_decision {
            Some(existing) if existing.king_role_id == king => (existing.id, existing.submitted_at),
            _ => (Uuid::new_v4(), now),
        };

        self.touch(now);
        Ok(&*self.king_decision.insert(KingDecisionEntity {
            id,
            king_role_id: king,
            taxes: draft.taxes,
            budget_priorities: draft.budget_priorities,
            appointments: draft.appointments,
            international_affairs: InternationalAffairs {
                alliance: draft.international_affairs.alliance,
                war_declarations,
            },
            other_decisions: draft.other_decisions,
            final_speech_transcript: draft.final_speech_transcript,
            submitted_at,
            updated_at: now,
            revealed_at: None,
        }))
    }

    /// Show the King's decisions to the room.
    pub fn reveal_king_decision(&mut self, now: SystemTime) -> SimulationResult<&KingDecisionEntity> {
        let decision = self
            .king_decision
            .as_mut()
            .ok_or(SimulationError::NoKingDecision)?;
        if decision.revealed_at.is_some() {
            return Err(SimulationError::DecisionRevealed);
        }
        decision.revealed_at = Some(now);
        decision.updated_at = now;
        self.touch(now);
        self.king_decision
            .as_ref()
            .ok_or(SimulationError::NoKingDecision)
    }

    fn check_draft(&self, king: Uuid, draft: &KingDecisionDraft) -> SimulationResult<()> {
        let areas = draft.budget_priorities.areas();
        if areas[0] == areas[1] || areas[0] == areas[2] || areas[1] == areas[2] {
            return Err(SimulationError::InvalidDecision(
                "budget priorities must be three different areas".into(),
            ));
        }

        let Appointments {
            economic_advisor,
            senior_judge,
        } = draft.appointments;
        for appointee in [economic_advisor, senior_judge].into_iter().flatten() {
            self.role(appointee)?;
            if appointee == king {
                return Err(SimulationError::InvalidDecision(
                    "the King cannot appoint themselves".into(),
                ));
            }
        }

        let affairs = &draft.international_affairs;
        let allied = match affairs.alliance {
            Alliance::NoAlliance => None,
            Alliance::Salamis => Some(WarTarget::Salamis),
            Alliance::Kition => Some(WarTarget::Kition),
        };
        if let Some(ally) = allied {
            if affairs.war_declarations.contains(&ally) {
                return Err(SimulationError::InvalidDecision(
                    "cannot declare war on an ally".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::{BudgetArea, TaxChange, VoteChoice, VoteScope},
        state::simulation::tests::{person_vote, role_ids, sample_simulation},
    };

    fn crown(sim: &mut SimulationSession, king: Uuid) {
        let mut session = person_vote(sim, VoteScope::All);
        session.template_id = FINAL_ROUND_TEMPLATE.into();
        let session_id = session.id;
        sim.open_vote(session).unwrap();
        let voter = role_ids(sim)
            .into_iter()
            .find(|role| *role != king)
            .unwrap();
        sim.cast_vote(
            session_id,
            voter,
            VoteChoice::Person { role_id: king },
            None,
            SystemTime::now(),
        )
        .unwrap();
        sim.close_vote(session_id, SystemTime::now()).unwrap();
        sim.announce_vote(session_id, SystemTime::now()).unwrap();
    }

    fn draft() -> KingDecisionDraft {
        KingDecisionDraft {
            taxes: TaxPolicy {
                trade: TaxChange::Lower,
                ..TaxPolicy::default()
            },
            budget_priorities: BudgetPriorities {
                priority_1: BudgetArea::Defense,
                priority_2: BudgetArea::Infrastructure,
                priority_3: BudgetArea::PublicWelfare,
            },
            appointments: Appointments::default(),
            international_affairs: InternationalAffairs::default(),
            other_decisions: None,
            final_speech_transcript: None,
        }
    }

    #[test]
    fn only_the_crowned_king_may_decide() {
        let mut sim = sample_simulation();
        let roles = role_ids(&sim);
        assert_eq!(
            sim.submit_king_decision(roles[0], draft(), SystemTime::now()),
            Err(SimulationError::NoKing)
        );

        crown(&mut sim, roles[0]);
        assert_eq!(sim.current_king(), Some(roles[0]));
        assert_eq!(
            sim.submit_king_decision(roles[1], draft(), SystemTime::now()),
            Err(SimulationError::NotKing(roles[1]))
        );
        let decision = sim
            .submit_king_decision(roles[0], draft(), SystemTime::now())
            .unwrap();
        assert_eq!(decision.king_role_id, roles[0]);
        assert_eq!(decision.taxes.trade, TaxChange::Lower);
    }

    #[test]
    fn resubmission_keeps_identity_until_revealed() {
        let mut sim = sample_simulation();
        let roles = role_ids(&sim);
        crown(&mut sim, roles[0]);
        let first = sim
            .submit_king_decision(roles[0], draft(), SystemTime::now())
            .unwrap()
            .clone();

        let mut second = draft();
        second.appointments.senior_judge = Some(roles[2]);
        second.international_affairs = InternationalAffairs {
            alliance: Alliance::Salamis,
            war_declarations: vec![WarTarget::Persia, WarTarget::Persia],
        };
        let updated = sim
            .submit_king_decision(roles[0], second, SystemTime::now())
            .unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.submitted_at, first.submitted_at);
        assert_eq!(updated.international_affairs.war_declarations, vec![WarTarget::Persia]);

        sim.reveal_king_decision(SystemTime::now()).unwrap();
        assert_eq!(
            sim.submit_king_decision(roles[0], draft(), SystemTime::now()),
            Err(SimulationError::DecisionRevealed)
        );
        assert_eq!(
            sim.reveal_king_decision(SystemTime::now()).map(|_| ()),
            Err(SimulationError::DecisionRevealed)
        );
    }

    #[test]
    fn inconsistent_decisions_are_rejected() {
        let mut sim = sample_simulation();
        let roles = role_ids(&sim);
        crown(&mut sim, roles[0]);

        let mut repeated = draft();
        repeated.budget_priorities.priority_3 = BudgetArea::Defense;
        let mut self_appointed = draft();
        self_appointed.appointments.economic_advisor = Some(roles[0]);
        let mut betrayal = draft();
        betrayal.international_affairs = InternationalAffairs {
            alliance: Alliance::Kition,
            war_declarations: vec![WarTarget::Kition],
        };
        for rejected in [repeated, self_appointed, betrayal] {
            assert!(matches!(
                sim.submit_king_decision(roles[0], rejected, SystemTime::now()),
                Err(SimulationError::InvalidDecision(_))
            ));
        }

        let mut stranger = draft();
        stranger.appointments.senior_judge = Some(Uuid::new_v4());
        assert!(matches!(
            sim.submit_king_decision(roles[0], stranger, SystemTime::now()),
            Err(SimulationError::RoleNotFound(_))
        ));
        assert_eq!(
            sim.reveal_king_decision(SystemTime::now()).map(|_| ()),
            Err(SimulationError::NoKingDecision)
        );
    }
}
