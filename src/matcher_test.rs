use std::collections::HashSet;

use super::*;
use crate::collab::{Pack, PackEntry, WorldEntity};
use crate::consts::AUTO_SELECT_MIN_SCORE;
use crate::error::EntityError;

fn world(id: &str, name: &str) -> MatchCandidate {
    MatchCandidate::world(id, name, None)
}

fn pack(pack_id: &str, entry_id: &str, name: &str) -> MatchCandidate {
    MatchCandidate::compendium(pack_id, "Monster Manual", entry_id, name)
}

fn labels(ranked: &[RankedCandidate]) -> Vec<(&str, CandidateKind)> {
    ranked.iter().map(|r| (r.candidate.label.as_str(), r.candidate.kind)).collect()
}

// =============================================================================
// tokenize
// =============================================================================

#[test]
fn tokenize_strips_extension_and_splits_words() {
    assert_eq!(tokenize("Goblin_Archer.webp"), vec!["goblin", "archer"]);
    assert_eq!(tokenize("goblin-archer-02.png"), vec!["goblin", "archer"]);
}

#[test]
fn tokenize_splits_camel_case_and_digits() {
    assert_eq!(tokenize("GoblinArcher02"), vec!["goblin", "archer"]);
    assert_eq!(tokenize("wolf3Pack"), vec!["wolf", "pack"]);
}

#[test]
fn tokenize_drops_stop_words_short_tokens_and_duplicates() {
    assert_eq!(tokenize("The Red Dragon Token (topdown)"), vec!["red", "dragon"]);
    assert_eq!(tokenize("x bat bat"), vec!["bat"]);
}

#[test]
fn tokenize_keeps_dotted_names_that_are_not_extensions() {
    assert_eq!(tokenize("Mr. Whiskers"), vec!["mr", "whiskers"]);
}

#[test]
fn query_from_entry_prefers_filename() {
    let entry = crate::entry::normalize(&crate::entry::RawEntry {
        filename: Some("SkeletonWarrior.webp".into()),
        display_name: Some("Bones".into()),
        ..Default::default()
    });
    let query = Query::from_entry(&entry);
    assert_eq!(query.tokens, vec!["skeleton", "warrior"]);
    assert_eq!(query.normalized, "skeletonwarrior");
}

// =============================================================================
// score / rank
// =============================================================================

#[test]
fn exact_match_scores_highest() {
    let query = Query::from_text("Goblin_Archer.webp");
    let exact = world("a", "Goblin Archer");
    // 50 exact + 2x12 tokens + 8 all-tokens + 2 world
    assert!((score(&exact, &query) - 84.0).abs() < f64::EPSILON);
}

#[test]
fn containment_precedence() {
    let query = Query::from_text("goblin archer");
    // query starts with candidate: 12 + 12 (goblin) - 1.5 + 2
    assert!((score(&world("g", "Goblin"), &query) - 24.5).abs() < f64::EPSILON);
    // unrelated second token: 12 (goblin) + 2
    assert!((score(&world("b", "Goblin Boss"), &query) - 14.0).abs() < f64::EPSILON);
}

#[test]
fn unrelated_world_entity_keeps_flat_bonus() {
    let query = Query::from_text("goblin");
    assert!((score(&world("o", "Orc"), &query) - SCORE_WORLD_BONUS).abs() < f64::EPSILON);
    let ranked = rank(&[world("o", "Orc")], &query, false);
    assert_eq!(ranked.len(), 1);
    assert!((ranked[0].score - 2.0).abs() < f64::EPSILON);
}

#[test]
fn unrelated_compendium_entry_scores_zero() {
    let query = Query::from_text("goblin archer");
    assert!(score(&pack("mm", "1", "Orc"), &query).abs() < f64::EPSILON);
    assert!(rank(&[pack("mm", "1", "Orc")], &query, false).is_empty());
}

#[test]
fn source_label_bonus_is_additive() {
    let query = Query::from_text("goblin");
    let in_folder = MatchCandidate::world("x", "Goblin Scout", Some("Monsters/Goblin"));
    let plain = MatchCandidate::world("y", "Goblin Scout", None);
    assert!((score(&in_folder, &query) - score(&plain, &query) - SCORE_SOURCE_LABEL).abs() < f64::EPSILON);

    // no name overlap: world 2 + source label 4
    let unrelated = MatchCandidate::world("z", "Orc", Some("Monsters/Goblin"));
    assert!((score(&unrelated, &query) - 6.0).abs() < f64::EPSILON);
}

#[test]
fn rank_orders_by_score_then_kind_then_label() {
    let candidates = vec![
        pack("mm", "1", "Goblin Archer"),
        world("a", "Goblin Archer"),
        world("b", "Goblin Boss"),
        world("o", "Orc"),
        world("g", "Goblin"),
    ];
    let ranked = rank(&candidates, &Query::from_text("Goblin_Archer.webp"), false);
    assert_eq!(
        labels(&ranked),
        vec![
            ("Goblin Archer", CandidateKind::World),
            ("Goblin Archer", CandidateKind::Compendium),
            ("Goblin", CandidateKind::World),
            ("Goblin Boss", CandidateKind::World),
            ("Orc", CandidateKind::World),
        ]
    );
}

#[test]
fn zero_fill_keeps_everything_in_kind_then_label_order() {
    let candidates = vec![pack("mm", "1", "Bat"), world("z", "Zombie"), world("a", "Ankheg")];
    let ranked = rank(&candidates, &Query::default(), true);
    assert_eq!(
        labels(&ranked),
        vec![
            ("Ankheg", CandidateKind::World),
            ("Zombie", CandidateKind::World),
            ("Bat", CandidateKind::Compendium),
        ]
    );
}

#[test]
fn adding_a_query_token_never_lowers_the_score() {
    let queries = ["goblin archer", "red dragon wyrmling", "wolf", "skeleton warrior captain"];
    let names = ["Goblin", "Dragon", "Wolf Pack", "Orc", "Skeleton", "Red Goblin Archer Chief"];
    for text in queries {
        let query = Query::from_text(text);
        for name in names {
            for kind_world in [true, false] {
                let base = if kind_world { world("w", name) } else { pack("p", "e", name) };
                for token in &query.tokens {
                    if base.match_tokens.contains(token) {
                        continue;
                    }
                    let mut grown = base.clone();
                    grown.match_tokens.push(token.clone());
                    assert!(
                        score(&grown, &query) >= score(&base, &query),
                        "adding {token} to {name} lowered score for {text}"
                    );
                }
            }
        }
    }
}

// =============================================================================
// auto_select / search
// =============================================================================

#[test]
fn auto_select_requires_threshold() {
    let candidates = vec![world("a", "Goblin Archer"), world("g", "Goblin")];
    let strong = rank(&candidates, &Query::from_text("goblin archer"), false);
    let pick = auto_select(&strong, AUTO_SELECT_MIN_SCORE, false).map(|r| r.candidate.id.as_str());
    assert_eq!(pick, Some("world.a"));

    let weak = rank(&candidates[1..], &Query::from_text("goblin archer"), false);
    assert!(auto_select(&weak, AUTO_SELECT_MIN_SCORE, false).is_none());
}

#[test]
fn auto_select_respects_manual_override() {
    let candidates = vec![world("a", "Goblin Archer")];
    let ranked = rank(&candidates, &Query::from_text("goblin archer"), false);
    assert!(auto_select(&ranked, AUTO_SELECT_MIN_SCORE, true).is_none());
}

#[test]
fn search_with_blank_text_lists_everything() {
    let candidates = vec![world("a", "Ankheg"), world("b", "Bat"), world("c", "Cat")];
    assert_eq!(search(&candidates, "  ", 2).len(), 2);
    let hits = search(&candidates, "bat", 10);
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].candidate.id, "world.b");
    assert!(hits[1..].iter().all(|h| (h.score - SCORE_WORLD_BONUS).abs() < f64::EPSILON));
}

// =============================================================================
// build_candidates
// =============================================================================

struct FixedStore;

#[async_trait::async_trait]
impl EntityStore for FixedStore {
    fn world_entities(&self) -> Vec<WorldEntity> {
        let entity = |id: &str, name: &str| WorldEntity {
            id: id.into(),
            name: name.into(),
            folder_path: Some("Monsters".into()),
            img: None,
            hp: None,
        };
        vec![entity("w1", "Goblin"), entity("w1", "Goblin Copy"), entity("w2", "Wolf")]
    }

    fn packs(&self) -> Vec<Pack> {
        let entry = |id: &str, name: &str| PackEntry { id: id.into(), name: name.into(), img: None };
        vec![
            Pack { id: "mm".into(), label: "Monster Manual".into(), entries: vec![entry("e1", "Goblin")] },
            Pack { id: "hidden".into(), label: "Hidden".into(), entries: vec![entry("e2", "Goblin")] },
        ]
    }

    fn excluded_packs(&self) -> HashSet<String> {
        HashSet::from(["hidden".to_string()])
    }

    fn world_entity(&self, _id: &str) -> Option<WorldEntity> {
        None
    }

    async fn import_from_pack(&self, _pack_id: &str, entry_id: &str) -> Result<WorldEntity, EntityError> {
        Err(EntityError::NotFound(entry_id.into()))
    }
}

#[test]
fn build_candidates_skips_excluded_packs_and_duplicate_ids() {
    let candidates = build_candidates(&FixedStore);
    let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["world.w1", "world.w2", "pack.mm.e1"]);
    assert_eq!(candidates[0].label, "Goblin");
    assert_eq!(candidates[2].source_label, "Monster Manual");
    assert_eq!(candidates[2].pack_tokens.as_deref(), Some(&["monster".to_string(), "manual".to_string()][..]));
}
