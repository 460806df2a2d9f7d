//! Property tests for extraction, perturbation, and memory.

use parley::agent::{AgentId, Opinion};
use parley::extract::{ExtractionFailure, OpinionExtractor, Tier};
use parley::memory::{MemoryEntry, MemoryStore};
use parley::perturb::Perturbation;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Prose that contains no digits and never mentions the label word.
fn plain_prose() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{1,8}", 0..20).prop_map(|w| w.join(" "))
}

proptest! {
    #[test]
    fn test_tier1_returns_clamped_number(value in -5.0f64..5.0, prefix in plain_prose()) {
        let text = format!("{prefix}\nOPINION: {value:.3}");
        let parsed: f64 = format!("{value:.3}").parse().unwrap();
        let found = OpinionExtractor::new().extract(&text).unwrap();
        prop_assert_eq!(found.tier, Tier::ExactLabel);
        prop_assert_eq!(found.opinion.value(), parsed.clamp(-1.0, 1.0));
    }

    #[test]
    fn test_tier1_wins_over_other_numbers(
        value in -1.0f64..1.0,
        noise in -1.0f64..1.0,
        prose in plain_prose(),
    ) {
        let text = format!(
            "In my opinion {noise:.2} is wrong.\nOpinion: maybe {noise:.2}\n{prose}\nOPINION: {value:.2}"
        );
        let found = OpinionExtractor::new().extract(&text).unwrap();
        prop_assert_eq!(found.tier, Tier::ExactLabel);
        let expected: f64 = format!("{value:.2}").parse().unwrap();
        prop_assert!((found.opinion.value() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_emphasis_does_not_change_result(value in -1.0f64..1.0) {
        let plain = format!("Reply.\nOPINION: {value:.2}");
        let bold = format!("Reply.\n**OPINION:** {value:.2}");
        let extractor = OpinionExtractor::new();
        prop_assert_eq!(extractor.extract(&plain), extractor.extract(&bold));
    }

    #[test]
    fn test_no_number_always_fails(prose in plain_prose()) {
        let text = prose.replace("opinion", "view");
        prop_assert_eq!(OpinionExtractor::new().extract(&text), Err(ExtractionFailure));
    }

    #[test]
    fn test_extracted_value_in_range(text in "\\PC{0,200}") {
        if let Ok(found) = OpinionExtractor::new().extract(&text) {
            prop_assert!((-1.0..=1.0).contains(&found.opinion.value()));
        }
    }

    #[test]
    fn test_perturbation_bounded(prior in -1.0f64..=1.0, seed in any::<u64>()) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let prior = Opinion::new(prior);
        let next = Perturbation::default().apply(prior, &mut rng);
        prop_assert!(next.distance(prior) <= 0.1 + 1e-12);
        prop_assert!((-1.0..=1.0).contains(&next.value()));
    }

    #[test]
    fn test_memory_recent_is_bounded_and_ordered(
        ticks in proptest::collection::btree_set(1u64..1000, 0..12),
        k in 0usize..8,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::create(dir.path()).unwrap();
        let agent = AgentId(0);
        store.init_agent(agent).unwrap();
        store.append(agent, &MemoryEntry::initial("Neutral / undecided on x", 0.0, None)).unwrap();

        for (i, tick) in ticks.iter().enumerate() {
            let before = store.len(agent).unwrap();
            let entry = MemoryEntry::conversation(*tick, AgentId(1), "A: hi\nB: hello", 0.1, None);
            store.append(agent, &entry).unwrap();
            prop_assert_eq!(store.len(agent).unwrap(), before + 1);
            prop_assert_eq!(store.len(agent).unwrap(), i + 2);
        }

        let recent = store.recent(agent, k).unwrap();
        prop_assert!(recent.len() <= k);
        prop_assert_eq!(recent.len(), k.min(ticks.len() + 1));
        let recent_ticks: Vec<_> = recent.iter().filter_map(|e| e.tick).collect();
        prop_assert!(recent_ticks.windows(2).all(|w| w[0] < w[1]));
        if let (Some(last), Some(max)) = (recent_ticks.last(), ticks.iter().max()) {
            prop_assert_eq!(last, max);
        }
    }
}
