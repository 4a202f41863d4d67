//! Relevance matching seam.
//!
//! The registry decides which skills *may* be activated; deciding which of
//! those fit a user query belongs to a separate matcher. Hosts plug their own
//! implementation in through [`RelevanceMatcher`]. [`KeywordMatcher`] is a
//! plain keyword implementation used by the CLI.

use skillgate_types::skill::SkillPayload;

/// An active skill offered to the matcher.
#[derive(Debug, Clone, Copy)]
pub struct ActivationCandidate<'a> {
    pub skill_id: &'a str,
    pub payload: &'a SkillPayload,
}

/// Ranks candidate skills against a query.
pub trait RelevanceMatcher: Send + Sync {
    /// Return the ids of matching candidates, best match first.
    fn rank(&self, query: &str, candidates: &[ActivationCandidate<'_>]) -> Vec<String>;
}

/// Case-insensitive keyword matcher.
///
/// A candidate scores one point per activation keyword contained in the
/// query, plus one if the query mentions its skill id. Zero-score candidates
/// are dropped; ties are broken by skill id.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatcher;

impl RelevanceMatcher for KeywordMatcher {
    fn rank(&self, query: &str, candidates: &[ActivationCandidate<'_>]) -> Vec<String> {
        let query = query.to_lowercase();

        let mut scored: Vec<(usize, &str)> = candidates
            .iter()
            .map(|c| {
                let keyword_hits = c
                    .payload
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty() && query.contains(k.as_str()))
                    .count();
                let id_hit = usize::from(query.contains(c.skill_id));
                (keyword_hits + id_hit, c.skill_id)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.into_iter().map(|(_, id)| id.to_owned()).collect()
    }
}
