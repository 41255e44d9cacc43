use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use tracing::warn;

use crate::{catalog::ProfileCatalog, gender::normalize_gender, profile::VoiceProfile};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Archetype and gender both matched.
    Exact,
    /// Only the archetype matched; the voice may be the wrong gender.
    ArchetypeOnly,
}

impl MatchTier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::ArchetypeOnly => "archetype_only",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AnchorMatch<'a> {
    pub profile: &'a VoiceProfile,
    pub tier: MatchTier,
}

impl<'a> AnchorMatch<'a> {
    pub fn profile_id(&self) -> &'a str {
        &self.profile.profile_id
    }

    pub fn is_degraded(&self) -> bool {
        self.tier == MatchTier::ArchetypeOnly
    }
}

/// Picks a voice anchor for `archetype`/`gender` using the thread-local RNG.
///
/// Returns `None` when no profile carries the archetype at all; callers are
/// expected to fall back to zero-shot synthesis.
pub fn resolve_anchor<'a>(
    catalog: &'a ProfileCatalog,
    archetype: &str,
    gender: &str,
) -> Option<AnchorMatch<'a>> {
    resolve_anchor_with(catalog, archetype, gender, &mut rand::thread_rng())
}

pub fn resolve_anchor_with<'a, R>(
    catalog: &'a ProfileCatalog,
    archetype: &str,
    gender: &str,
    rng: &mut R,
) -> Option<AnchorMatch<'a>>
where
    R: Rng + ?Sized,
{
    let target_gender = normalize_gender(gender);

    let exact = catalog.exact_candidates(archetype, &target_gender);
    if let Some(profile) = exact.choose(rng).copied() {
        return Some(AnchorMatch {
            profile,
            tier: MatchTier::Exact,
        });
    }

    let fallback = catalog.archetype_candidates(archetype);
    if fallback.is_empty() {
        return None;
    }
    warn!(
        target = "anchortts::resolver",
        archetype,
        gender = %target_gender,
        candidates = fallback.len(),
        "no gender-matched anchor; falling back to any voice of the archetype"
    );
    fallback.choose(rng).copied().map(|profile| AnchorMatch {
        profile,
        tier: MatchTier::ArchetypeOnly,
    })
}
