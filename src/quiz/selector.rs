use std::collections::HashSet;

use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;

use super::questions::Question;

/// Draws `total` questions balanced across `unit_count` topics.
///
/// Each topic's quota is `total / unit_count`; topics `1..=remainder` take
/// one extra. Topics short on questions leave a shortfall that is refilled
/// from the rest of the pool regardless of topic. Under-fill is allowed when
/// the whole pool runs dry; the result is fully shuffled so topic blocks are
/// never contiguous.
pub fn select_distributed(pool: &[Question], total: usize, unit_count: usize) -> Vec<Question> {
    select_distributed_with(pool, total, unit_count, &mut rand::thread_rng())
}

pub fn select_distributed_with<R: Rng + ?Sized>(
    pool: &[Question],
    total: usize,
    unit_count: usize,
    rng: &mut R,
) -> Vec<Question> {
    if total == 0 || unit_count == 0 || pool.is_empty() {
        return Vec::new();
    }

    let base = total / unit_count;
    let remainder = total % unit_count;

    let mut chosen: Vec<Question> = Vec::with_capacity(total.min(pool.len()));
    let mut chosen_ids: HashSet<String> = HashSet::new();
    let mut shortfall = 0usize;

    for unit in 1..=unit_count {
        let required = base + usize::from(unit <= remainder);
        let topic = unit as u8;
        let subset: Vec<&Question> = pool.iter().filter(|q| q.topic == topic).collect();
        let take = required.min(subset.len());
        if take < required {
            debug!(
                "Unit {} short {} questions ({} available)",
                unit,
                required - take,
                subset.len()
            );
        }
        shortfall += required - take;
        for q in subset.choose_multiple(rng, take) {
            chosen_ids.insert(q.id.clone());
            chosen.push((*q).clone());
        }
    }

    if shortfall > 0 {
        let remaining: Vec<&Question> = pool
            .iter()
            .filter(|q| !chosen_ids.contains(&q.id))
            .collect();
        let take = shortfall.min(remaining.len());
        for q in remaining.choose_multiple(rng, take) {
            chosen.push((*q).clone());
        }
    }

    chosen.shuffle(rng);
    chosen
}

/// Uniform draw without replacement from the (optionally topic-filtered)
/// pool. Asking for more than the pool holds clamps with a warning; it is
/// never an error.
pub fn select_uniform(pool: &[Question], count: usize, topic_filter: Option<u8>) -> Vec<Question> {
    select_uniform_with(pool, count, topic_filter, &mut rand::thread_rng())
}

pub fn select_uniform_with<R: Rng + ?Sized>(
    pool: &[Question],
    count: usize,
    topic_filter: Option<u8>,
    rng: &mut R,
) -> Vec<Question> {
    let filtered: Vec<&Question> = match topic_filter {
        Some(topic) => pool.iter().filter(|q| q.topic == topic).collect(),
        None => pool.iter().collect(),
    };

    if count > filtered.len() {
        warn!(
            "Requested {} questions but only {} available, clamping",
            count,
            filtered.len()
        );
    }

    let take = count.min(filtered.len());
    let mut picked: Vec<Question> = filtered
        .choose_multiple(rng, take)
        .map(|q| (*q).clone())
        .collect();
    picked.shuffle(rng);
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn pool(per_topic: usize, topics: u8) -> Vec<Question> {
        let mut questions = Vec::new();
        for topic in 1..=topics {
            for n in 0..per_topic {
                questions.push(Question {
                    id: format!("t{topic}-q{n}"),
                    topic,
                    prompt: format!("Question {n} for unit {topic}"),
                    options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                    correct_index: 0,
                    explanation: None,
                });
            }
        }
        questions
    }

    fn topic_counts(questions: &[Question]) -> HashMap<u8, usize> {
        let mut counts = HashMap::new();
        for q in questions {
            *counts.entry(q.topic).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_distributed_balances_evenly_when_remainder_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = pool(11, 5);
        let picked = select_distributed_with(&pool, 55, 5, &mut rng);
        assert_eq!(picked.len(), 55);
        let counts = topic_counts(&picked);
        for topic in 1..=5 {
            assert_eq!(counts[&topic], 11, "unit {topic} should hold exactly 11");
        }
    }

    #[test]
    fn test_distributed_gives_extra_to_low_numbered_topics() {
        let mut rng = StdRng::seed_from_u64(3);
        let pool = pool(10, 5);
        // 7 = 1 each + remainder 2 -> units 1 and 2 get a second question.
        let picked = select_distributed_with(&pool, 7, 5, &mut rng);
        assert_eq!(picked.len(), 7);
        let counts = topic_counts(&picked);
        assert_eq!(counts[&1], 2);
        assert_eq!(counts[&2], 2);
        assert_eq!(counts[&3], 1);
        assert_eq!(counts[&4], 1);
        assert_eq!(counts[&5], 1);
    }

    #[test]
    fn test_distributed_refills_shortfall_from_other_topics() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut pool = pool(20, 5);
        // Strip unit 3 down to a single question.
        pool.retain(|q| q.topic != 3 || q.id == "t3-q0");
        let picked = select_distributed_with(&pool, 25, 5, &mut rng);
        assert_eq!(picked.len(), 25);
        let counts = topic_counts(&picked);
        assert_eq!(counts[&3], 1);
        let refilled: usize = counts
            .iter()
            .filter(|(t, _)| **t != 3)
            .map(|(_, c)| *c)
            .sum();
        assert_eq!(refilled, 24);
    }

    #[test]
    fn test_distributed_never_duplicates() {
        let mut rng = StdRng::seed_from_u64(19);
        let mut pool = pool(20, 5);
        pool.retain(|q| q.topic != 5);
        let picked = select_distributed_with(&pool, 40, 5, &mut rng);
        assert_eq!(picked.len(), 40);
        let ids: std::collections::HashSet<&str> =
            picked.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids.len(), 40);
    }

    #[test]
    fn test_distributed_underfills_exhausted_pool() {
        let mut rng = StdRng::seed_from_u64(23);
        let pool = pool(3, 5);
        let picked = select_distributed_with(&pool, 55, 5, &mut rng);
        assert_eq!(picked.len(), 15);
    }

    #[test]
    fn test_distributed_zero_total_and_empty_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_distributed_with(&pool(5, 5), 0, 5, &mut rng).is_empty());
        assert!(select_distributed_with(&[], 10, 5, &mut rng).is_empty());
    }

    #[test]
    fn test_uniform_clamps_to_pool_size() {
        let mut rng = StdRng::seed_from_u64(5);
        let pool = pool(4, 2);
        let picked = select_uniform_with(&pool, 100, None, &mut rng);
        assert_eq!(picked.len(), 8);
    }

    #[test]
    fn test_uniform_topic_filter() {
        let mut rng = StdRng::seed_from_u64(5);
        let pool = pool(6, 3);
        let picked = select_uniform_with(&pool, 4, Some(2), &mut rng);
        assert_eq!(picked.len(), 4);
        assert!(picked.iter().all(|q| q.topic == 2));
    }

    #[test]
    fn test_uniform_empty_slice_yields_empty() {
        let mut rng = StdRng::seed_from_u64(5);
        let pool = pool(6, 3);
        assert!(select_uniform_with(&pool, 4, Some(9), &mut rng).is_empty());
    }
}
