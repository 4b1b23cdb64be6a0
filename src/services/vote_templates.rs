//! Vote presets the facilitator opens sessions from.

use crate::{
    dao::models::{AnimationSpeed, RevealTiming, TransparencyLevel, VoteFormat, VoteScope, VoteType},
    dto::vote::VoteTemplateDto,
    state::king::FINAL_ROUND_TEMPLATE,
};

pub const FIELD_SCOPE: &str = "scope";
pub const FIELD_SCOPE_CLAN: &str = "scope_clan_id";
pub const FIELD_CANDIDATES: &str = "eligible_candidates";
pub const FIELD_TITLE: &str = "proposal_title";
pub const FIELD_DESCRIPTION: &str = "proposal_description";
pub const FIELD_TRANSPARENCY: &str = "transparency_level";
pub const FIELD_REVEAL: &str = "reveal_timing";
pub const FIELD_ANIMATION: &str = "animation_speed";

/// Defaults of one preset.
#[derive(Debug, Clone, Copy)]
pub struct VoteTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub vote_type: VoteType,
    pub vote_format: VoteFormat,
    pub scope: VoteScope,
    pub transparency_level: TransparencyLevel,
    pub reveal_timing: RevealTiming,
    pub animation_speed: AnimationSpeed,
    pub allow_skip_animation: bool,
    pub proposal_title: Option<&'static str>,
    pub proposal_description: Option<&'static str>,
    pub customizable: &'static [&'static str],
    /// Which run threshold an election round falls back to.
    pub election_round: Option<u8>,
}

impl VoteTemplate {
    pub fn allows(&self, field: &str) -> bool {
        self.customizable.contains(&field)
    }
}

const TEMPLATES: [VoteTemplate; 7] = [
    VoteTemplate {
        id: "clan_nomination",
        name: "Clan Nomination",
        description: "Each clan selects their candidate for King",
        vote_type: VoteType::ClanNomination,
        vote_format: VoteFormat::ChoosePerson,
        scope: VoteScope::ClanOnly,
        transparency_level: TransparencyLevel::Open,
        reveal_timing: RevealTiming::AfterAllVotes,
        animation_speed: AnimationSpeed::Normal,
        allow_skip_animation: true,
        proposal_title: None,
        proposal_description: None,
        customizable: &[
            FIELD_SCOPE_CLAN,
            FIELD_CANDIDATES,
            FIELD_TRANSPARENCY,
            FIELD_REVEAL,
            FIELD_ANIMATION,
        ],
        election_round: None,
    },
    VoteTemplate {
        id: "election_round_1",
        name: "General Election - Round 1",
        description: "All participants vote for King from nominated candidates",
        vote_type: VoteType::ElectionRound,
        vote_format: VoteFormat::ChoosePerson,
        scope: VoteScope::All,
        transparency_level: TransparencyLevel::Anonymous,
        reveal_timing: RevealTiming::AfterAllVotes,
        animation_speed: AnimationSpeed::Normal,
        allow_skip_animation: false,
        proposal_title: Some("Vote for King - Round 1"),
        proposal_description: Some(
            "Select one candidate to become King. A 2/3 majority is required to win.",
        ),
        customizable: &[
            FIELD_CANDIDATES,
            FIELD_TRANSPARENCY,
            FIELD_REVEAL,
            FIELD_ANIMATION,
            FIELD_DESCRIPTION,
        ],
        election_round: Some(1),
    },
    VoteTemplate {
        id: FINAL_ROUND_TEMPLATE,
        name: "General Election - Round 2 (Final)",
        description: "Final vote for King between the top candidates of round 1",
        vote_type: VoteType::ElectionRound,
        vote_format: VoteFormat::ChoosePerson,
        scope: VoteScope::All,
        transparency_level: TransparencyLevel::Anonymous,
        reveal_timing: RevealTiming::AfterAllVotes,
        animation_speed: AnimationSpeed::Slow,
        allow_skip_animation: false,
        proposal_title: Some("Final Vote for King - Round 2"),
        proposal_description: Some("This is the final round. Select one candidate to become King."),
        customizable: &[
            FIELD_CANDIDATES,
            FIELD_TRANSPARENCY,
            FIELD_REVEAL,
            FIELD_ANIMATION,
            FIELD_DESCRIPTION,
        ],
        election_round: Some(2),
    },
    VoteTemplate {
        id: "clan_oath",
        name: "Clan Oath of Allegiance",
        description: "Does the clan swear oath to the new King?",
        vote_type: VoteType::ClanOath,
        vote_format: VoteFormat::YesNo,
        scope: VoteScope::ClanOnly,
        transparency_level: TransparencyLevel::Anonymous,
        reveal_timing: RevealTiming::AfterAllVotes,
        animation_speed: AnimationSpeed::Normal,
        allow_skip_animation: true,
        proposal_title: None,
        proposal_description: None,
        customizable: &[
            FIELD_SCOPE_CLAN,
            FIELD_TITLE,
            FIELD_DESCRIPTION,
            FIELD_TRANSPARENCY,
            FIELD_REVEAL,
        ],
        election_round: None,
    },
    VoteTemplate {
        id: "clan_action",
        name: "Clan Action Against King",
        description: "Does the clan act on its \"if things go wrong\" scenario?",
        vote_type: VoteType::ClanAction,
        vote_format: VoteFormat::YesNo,
        scope: VoteScope::ClanOnly,
        transparency_level: TransparencyLevel::Anonymous,
        reveal_timing: RevealTiming::AfterAllVotes,
        animation_speed: AnimationSpeed::Normal,
        allow_skip_animation: true,
        proposal_title: None,
        proposal_description: None,
        customizable: &[
            FIELD_SCOPE_CLAN,
            FIELD_TITLE,
            FIELD_DESCRIPTION,
            FIELD_TRANSPARENCY,
            FIELD_REVEAL,
        ],
        election_round: None,
    },
    VoteTemplate {
        id: "custom_election",
        name: "Custom Election",
        description: "Choose-person vote for any purpose",
        vote_type: VoteType::FacilitatorProposal,
        vote_format: VoteFormat::ChoosePerson,
        scope: VoteScope::All,
        transparency_level: TransparencyLevel::Anonymous,
        reveal_timing: RevealTiming::AfterAllVotes,
        animation_speed: AnimationSpeed::Normal,
        allow_skip_animation: true,
        proposal_title: None,
        proposal_description: None,
        customizable: &[
            FIELD_SCOPE,
            FIELD_SCOPE_CLAN,
            FIELD_CANDIDATES,
            FIELD_TITLE,
            FIELD_DESCRIPTION,
            FIELD_TRANSPARENCY,
            FIELD_REVEAL,
            FIELD_ANIMATION,
        ],
        election_round: None,
    },
    VoteTemplate {
        id: "custom_proposal",
        name: "Custom Proposal",
        description: "Yes/no/abstain vote for any purpose",
        vote_type: VoteType::FacilitatorProposal,
        vote_format: VoteFormat::YesNo,
        scope: VoteScope::All,
        transparency_level: TransparencyLevel::Open,
        reveal_timing: RevealTiming::AfterAllVotes,
        animation_speed: AnimationSpeed::Normal,
        allow_skip_animation: true,
        proposal_title: None,
        proposal_description: None,
        customizable: &[
            FIELD_SCOPE,
            FIELD_SCOPE_CLAN,
            FIELD_TITLE,
            FIELD_DESCRIPTION,
            FIELD_TRANSPARENCY,
            FIELD_REVEAL,
            FIELD_ANIMATION,
        ],
        election_round: None,
    },
];

/// Every preset in menu order.
pub fn all() -> &'static [VoteTemplate] {
    &TEMPLATES
}

pub fn find(id: &str) -> Option<&'static VoteTemplate> {
    TEMPLATES.iter().find(|template| template.id == id)
}

impl From<&VoteTemplate> for VoteTemplateDto {
    fn from(value: &VoteTemplate) -> Self {
        Self {
            id: value.id.to_string(),
            name: value.name.to_string(),
            description: value.description.to_string(),
            vote_type: value.vote_type,
            vote_format: value.vote_format,
            scope: value.scope,
            transparency_level: value.transparency_level,
            reveal_timing: value.reveal_timing,
            animation_speed: value.animation_speed,
            allow_skip_animation: value.allow_skip_animation,
            proposal_title: value.proposal_title.map(str::to_string),
            customizable: value.customizable.iter().map(|f| f.to_string()).collect(),
        }
    }
}
