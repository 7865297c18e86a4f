//! # Genetic engine over targeting chromosomes
//!
//! ## Responsibility
//! The four primitive operations of the optimizer: `genesis` (project a tree
//! into grouped active leaves), `mutate` (binary per-leaf flips), `fitness`
//! (quality-proportional normalization over a population), and `selection`
//! (roulette-wheel sampling without replacement, renormalizing after each
//! pick).
//!
//! ## Guarantees
//! - Deterministic given a scripted sampler and a fixed quality oracle
//! - Non-panicking: every fallible operation returns `Result`; a pathological
//!   sampler degrades to removing the last element, never to an index panic
//! - `mutate` visits every leaf exactly once with one independent draw each
//! - `selection` renormalizes the remaining pool after every pick, so each
//!   draw samples a distribution that sums to one
//!
//! ## NOT Responsible For
//! - Producing quality values (injected via [`QualityOracle`])
//! - Building chromosomes from remote ad-sets (see `platform::template`)
//! - Population lifecycle across generations (the orchestrator owns that)

pub mod chromosome;
pub mod sampler;

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use chromosome::{Chromosome, Gene, TargetingKind};
pub use sampler::{OsSampler, SequenceSampler, UniformSampler};

/// Error type quality oracles may surface; the engine wraps it without
/// inspecting it.
pub type QualityError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The injected quality oracle failed for a chromosome.
    #[error("quality evaluation failed: {0}")]
    Quality(#[source] QualityError),

    /// The population cannot supply the requested selection.
    #[error("population of {have} cannot supply a selection of {need}")]
    InsufficientPopulation {
        /// Chromosomes available.
        have: usize,
        /// Chromosomes requested.
        need: usize,
    },

    /// The pool to sample from carries no quality mass at all.
    #[error("population quality mass is zero; roulette selection is undefined")]
    DegeneratePopulation,
}

/// Produces the quality scalar for a chromosome, typically by querying the
/// ad platform for the backing ad-set's performance.
#[async_trait]
pub trait QualityOracle: Send + Sync {
    /// Compute the quality of `chromosome`. Must be `>= 0`.
    async fn quality(&self, chromosome: &Chromosome) -> Result<f64, QualityError>;
}

/// The genetic algorithm over targeting chromosomes.
///
/// Holds the two injected seams: the quality oracle consulted by `fitness`
/// and the uniform sampler driving `mutate` and `selection`.
pub struct GeneticEngine {
    oracle: Arc<dyn QualityOracle>,
    sampler: Arc<dyn UniformSampler>,
}

impl GeneticEngine {
    /// Create an engine with the given oracle and sampler.
    pub fn new(oracle: Arc<dyn QualityOracle>, sampler: Arc<dyn UniformSampler>) -> Self {
        Self { oracle, sampler }
    }

    /// Project a chromosome into its expressed targeting: every active leaf,
    /// grouped by targeting kind.
    ///
    /// Traversal is breadth-first from the root, so within each kind the
    /// group preserves BFS discovery order. Interior nodes and inactive
    /// leaves are omitted. The tree is not modified.
    pub fn genesis<'a>(&self, chromosome: &'a Chromosome) -> HashMap<TargetingKind, Vec<&'a Gene>> {
        let mut groups: HashMap<TargetingKind, Vec<&Gene>> = HashMap::new();
        let mut queue = VecDeque::from([&chromosome.root]);

        while let Some(gene) = queue.pop_front() {
            if gene.is_leaf() && gene.is_active() {
                if let Some(kind) = gene.kind {
                    groups.entry(kind).or_default().push(gene);
                }
            }
            queue.extend(gene.children.iter());
        }

        groups
    }

    /// Flip each leaf independently with probability `rate`.
    ///
    /// One draw per leaf; interior nodes are untouched. A rate of `0` is the
    /// identity and `1` flips every leaf. The operation is in place.
    pub fn mutate(&self, chromosome: &mut Chromosome, rate: f64) {
        if rate <= 0.0 {
            return;
        }
        binary_mutation(&mut chromosome.root, self.sampler.as_ref(), rate);
    }

    /// Materialize quality for every chromosome via the oracle and normalize
    /// it into fitness over the population sum.
    ///
    /// A population with zero total quality normalizes to all-zero fitness
    /// (0/0 is defined as 0 here); [`GeneticEngine::selection`] is where such
    /// a population is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Quality`] on the first oracle failure.
    pub async fn fitness(&self, population: &mut [Chromosome]) -> Result<(), EngineError> {
        let mut total = 0.0;
        for chromosome in population.iter_mut() {
            let quality = self
                .oracle
                .quality(chromosome)
                .await
                .map_err(EngineError::Quality)?;
            chromosome.quality = quality;
            total += quality;
        }

        normalize(population, total);
        Ok(())
    }

    /// Pick `size` chromosomes without replacement by fitness-proportional
    /// roulette wheel, renormalizing the remaining pool after each pick.
    ///
    /// The returned list is sorted by quality, descending, stably. When the
    /// population is exactly `size` it is returned whole (sorted); a smaller
    /// population is an error.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InsufficientPopulation`] when `population.len() < size`
    /// - [`EngineError::DegeneratePopulation`] when a pick is requested from
    ///   a pool whose quality sum is zero
    pub fn selection(
        &self,
        mut population: Vec<Chromosome>,
        size: usize,
    ) -> Result<Vec<Chromosome>, EngineError> {
        if population.len() < size {
            return Err(EngineError::InsufficientPopulation {
                have: population.len(),
                need: size,
            });
        }
        if population.len() == size {
            sort_by_quality(&mut population);
            return Ok(population);
        }

        let mut selected = Vec::with_capacity(size);
        for _ in 0..size {
            if quality_sum(&population) == 0.0 {
                return Err(EngineError::DegeneratePopulation);
            }

            let distribution = cumulative(&population);
            let draw = self.sampler.sample();
            // Smallest index whose cumulative mass covers the draw. A
            // pathological draw >= 1.0 would run past the end; fall back to
            // the last element rather than fail the pick.
            let index = distribution
                .partition_point(|&mass| mass < draw)
                .min(population.len() - 1);
            selected.push(population.remove(index));

            let remaining = quality_sum(&population);
            normalize(&mut population, remaining);
        }

        sort_by_quality(&mut selected);
        Ok(selected)
    }
}

fn binary_mutation(gene: &mut Gene, sampler: &dyn UniformSampler, rate: f64) {
    // Only leaves carry an id, so the activation flip applies there alone;
    // the recursion still walks interior nodes to reach every leaf.
    if gene.is_leaf() && sampler.sample() <= rate {
        gene.flip();
    }
    for child in &mut gene.children {
        binary_mutation(child, sampler, rate);
    }
}

fn normalize(population: &mut [Chromosome], total: f64) {
    for chromosome in population {
        chromosome.fitness = if total > 0.0 {
            chromosome.quality / total
        } else {
            0.0
        };
    }
}

fn quality_sum(population: &[Chromosome]) -> f64 {
    population.iter().map(|c| c.quality).sum()
}

fn sort_by_quality(population: &mut [Chromosome]) {
    population.sort_by(|a, b| {
        b.quality
            .partial_cmp(&a.quality)
            .unwrap_or(Ordering::Equal)
    });
}

/// Cumulative fitness distribution over `population`.
///
/// The final entry is pinned to exactly `1.0`: accumulated floating point
/// error must never leave the top of the wheel uncovered for a draw close
/// to one.
pub(crate) fn cumulative(population: &[Chromosome]) -> Vec<f64> {
    let mut distribution = vec![0.0; population.len()];
    let mut accumulated = 0.0;
    for i in 0..population.len().saturating_sub(1) {
        accumulated += population[i].fitness;
        distribution[i] = accumulated;
    }
    if let Some(last) = distribution.last_mut() {
        *last = 1.0;
    }

    distribution
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOracle;

    #[async_trait]
    impl QualityOracle for FixedOracle {
        async fn quality(&self, chromosome: &Chromosome) -> Result<f64, QualityError> {
            // Echo back the quality already on the chromosome so tests can
            // stage arbitrary distributions.
            Ok(chromosome.quality)
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl QualityOracle for FailingOracle {
        async fn quality(&self, _: &Chromosome) -> Result<f64, QualityError> {
            Err("insights unavailable".into())
        }
    }

    fn engine_with_draws(draws: Vec<f64>) -> GeneticEngine {
        GeneticEngine::new(Arc::new(FixedOracle), Arc::new(SequenceSampler::new(draws)))
    }

    fn leaf(id: &str, kind: TargetingKind, value: u8) -> Gene {
        Gene {
            id: id.into(),
            name: id.into(),
            kind: Some(kind),
            value,
            ..Gene::default()
        }
    }

    fn staged(id: &str, quality: f64) -> Chromosome {
        Chromosome {
            id: id.into(),
            quality,
            ..Chromosome::default()
        }
    }

    fn two_leaf_chromosome() -> Chromosome {
        // root ── leaf A (interests, active)
        //      └─ c1 ── leaf B (behaviors, inactive)
        Chromosome {
            root: Gene {
                name: "root".into(),
                children: vec![
                    leaf("A", TargetingKind::Interests, 1),
                    Gene {
                        name: "c1".into(),
                        children: vec![leaf("B", TargetingKind::Behaviors, 0)],
                        ..Gene::default()
                    },
                ],
                ..Gene::default()
            },
            ..Chromosome::default()
        }
    }

    // ── Genesis ──────────────────────────────────────────────────────────────

    #[test]
    fn test_genesis_groups_active_leaves_by_kind() {
        let engine = engine_with_draws(vec![]);
        let chromosome = two_leaf_chromosome();
        let groups = engine.genesis(&chromosome);

        assert_eq!(groups.len(), 1);
        let interests = &groups[&TargetingKind::Interests];
        assert_eq!(interests.len(), 1);
        assert_eq!(interests[0].id, "A");
        assert!(!groups.contains_key(&TargetingKind::Behaviors));
    }

    #[test]
    fn test_genesis_preserves_breadth_first_order_within_kind() {
        let engine = engine_with_draws(vec![]);
        let chromosome = Chromosome {
            root: Gene {
                name: "root".into(),
                children: vec![
                    Gene {
                        name: "deep".into(),
                        children: vec![leaf("late", TargetingKind::Interests, 1)],
                        ..Gene::default()
                    },
                    leaf("early", TargetingKind::Interests, 1),
                ],
                ..Gene::default()
            },
            ..Chromosome::default()
        };

        let groups = engine.genesis(&chromosome);
        let ids: Vec<&str> = groups[&TargetingKind::Interests]
            .iter()
            .map(|g| g.id.as_str())
            .collect();
        // "early" sits one level above "late", so BFS discovers it first.
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_genesis_empty_tree_yields_no_groups() {
        let engine = engine_with_draws(vec![]);
        let chromosome = Chromosome {
            root: Gene {
                name: "root".into(),
                ..Gene::default()
            },
            ..Chromosome::default()
        };
        assert!(engine.genesis(&chromosome).is_empty());
    }

    // ── Mutate ───────────────────────────────────────────────────────────────

    #[test]
    fn test_mutate_rate_zero_is_identity() {
        // Even a sampler that always draws 0.0 must not flip at rate 0.
        let engine = engine_with_draws(vec![0.0]);
        let mut chromosome = two_leaf_chromosome();
        engine.mutate(&mut chromosome, 0.0);

        assert_eq!(chromosome.root.children[0].value, 1);
        assert_eq!(chromosome.root.children[1].children[0].value, 0);
    }

    #[test]
    fn test_mutate_rate_one_flips_every_leaf_once() {
        let engine = engine_with_draws(vec![0.99]);
        let mut chromosome = two_leaf_chromosome();
        engine.mutate(&mut chromosome, 1.0);

        assert_eq!(chromosome.root.children[0].value, 0);
        assert_eq!(chromosome.root.children[1].children[0].value, 1);
    }

    #[test]
    fn test_mutate_draws_once_per_leaf() {
        // Draw script: first leaf flips (0.05 <= 0.1), second does not.
        let engine = engine_with_draws(vec![0.05, 0.95]);
        let mut chromosome = two_leaf_chromosome();
        engine.mutate(&mut chromosome, 0.1);

        assert_eq!(chromosome.root.children[0].value, 0);
        assert_eq!(chromosome.root.children[1].children[0].value, 0);
    }

    #[test]
    fn test_mutate_leaves_interior_nodes_alone() {
        let engine = engine_with_draws(vec![0.0]);
        let mut chromosome = two_leaf_chromosome();
        engine.mutate(&mut chromosome, 1.0);
        assert_eq!(chromosome.root.value, 0);
        assert_eq!(chromosome.root.children[1].value, 0);
    }

    // ── Fitness ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fitness_normalizes_quality_over_population_sum() {
        let engine = engine_with_draws(vec![]);
        let mut population = vec![staged("a", 1.0), staged("b", 3.0), staged("c", 6.0)];
        engine.fitness(&mut population).await.unwrap();

        let fitness: Vec<f64> = population.iter().map(|c| c.fitness).collect();
        assert_eq!(fitness, vec![0.1, 0.3, 0.6]);
        let sum: f64 = fitness.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_fitness_zero_mass_population_normalizes_to_zero() {
        let engine = engine_with_draws(vec![]);
        let mut population = vec![staged("a", 0.0), staged("b", 0.0)];
        engine.fitness(&mut population).await.unwrap();
        assert!(population.iter().all(|c| c.fitness == 0.0));
    }

    #[tokio::test]
    async fn test_fitness_surfaces_oracle_failure() {
        let engine = GeneticEngine::new(
            Arc::new(FailingOracle),
            Arc::new(SequenceSampler::new(vec![])),
        );
        let mut population = vec![staged("a", 1.0)];
        let err = engine.fitness(&mut population).await.unwrap_err();
        assert!(matches!(err, EngineError::Quality(_)));
    }

    // ── Selection ────────────────────────────────────────────────────────────

    async fn fit(engine: &GeneticEngine, mut population: Vec<Chromosome>) -> Vec<Chromosome> {
        engine.fitness(&mut population).await.unwrap();
        population
    }

    #[tokio::test]
    async fn test_selection_smaller_population_than_size_fails() {
        let engine = engine_with_draws(vec![0.5]);
        let population = fit(&engine, vec![staged("a", 1.0)]).await;
        let err = engine.selection(population, 5).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientPopulation { have: 1, need: 5 }
        ));
    }

    #[tokio::test]
    async fn test_selection_empty_population_fails() {
        let engine = engine_with_draws(vec![0.5]);
        let err = engine.selection(Vec::new(), 5).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientPopulation { have: 0, need: 5 }
        ));
    }

    #[tokio::test]
    async fn test_selection_exact_size_returns_all_sorted_by_quality() {
        let engine = engine_with_draws(vec![0.5]);
        let population = fit(
            &engine,
            vec![staged("low", 1.0), staged("high", 5.0), staged("mid", 3.0)],
        )
        .await;

        let selected = engine.selection(population, 3).unwrap();
        let ids: Vec<&str> = selected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_selection_draw_zero_picks_first_wheel_slot() {
        // Scenario: one chromosome holds almost all mass at index 0; a draw
        // of 0.0 must land on it through the cumulative distribution.
        let engine = engine_with_draws(vec![0.0]);
        let population = fit(
            &engine,
            vec![
                staged("heavy", 10.0),
                staged("a", 0.1),
                staged("b", 0.1),
                staged("c", 0.1),
                staged("d", 0.1),
            ],
        )
        .await;

        let selected = engine.selection(population, 1).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "heavy");
    }

    #[tokio::test]
    async fn test_selection_returns_requested_count_without_duplicates() {
        let engine = engine_with_draws(vec![0.3, 0.9, 0.1, 0.5]);
        let population = fit(
            &engine,
            (0..8)
                .map(|i| staged(&format!("c{i}"), (i + 1) as f64))
                .collect(),
        )
        .await;

        let selected = engine.selection(population, 4).unwrap();
        assert_eq!(selected.len(), 4);
        let mut ids: Vec<&str> = selected.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4, "selection must not repeat a chromosome");
    }

    #[tokio::test]
    async fn test_selection_result_sorted_by_quality_descending() {
        let engine = engine_with_draws(vec![0.9, 0.1, 0.6]);
        let population = fit(
            &engine,
            vec![
                staged("q2", 2.0),
                staged("q5", 5.0),
                staged("q1", 1.0),
                staged("q4", 4.0),
                staged("q3", 3.0),
            ],
        )
        .await;

        let selected = engine.selection(population, 3).unwrap();
        let qualities: Vec<f64> = selected.iter().map(|c| c.quality).collect();
        let mut sorted = qualities.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(qualities, sorted);
    }

    #[tokio::test]
    async fn test_selection_zero_mass_pool_is_degenerate() {
        let engine = engine_with_draws(vec![0.5]);
        let population = fit(&engine, vec![staged("a", 0.0), staged("b", 0.0)]).await;
        let err = engine.selection(population, 1).unwrap_err();
        assert!(matches!(err, EngineError::DegeneratePopulation));
    }

    #[tokio::test]
    async fn test_selection_pathological_draw_falls_back_to_last_element() {
        // A draw of exactly 1.0 cannot happen with a uniform [0, 1) source,
        // but a broken sampler must degrade to the last slot, not panic.
        let engine = engine_with_draws(vec![1.0]);
        let population = fit(&engine, vec![staged("a", 1.0), staged("b", 2.0)]).await;
        let selected = engine.selection(population, 1).unwrap();
        assert_eq!(selected.len(), 1);
    }

    // ── Cumulative distribution ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_cumulative_last_entry_pinned_to_one() {
        let engine = engine_with_draws(vec![]);
        // Qualities chosen so the prefix sums accumulate float error.
        let population = fit(
            &engine,
            vec![
                staged("a", 0.1),
                staged("b", 0.2),
                staged("c", 0.3),
                staged("d", 0.4),
            ],
        )
        .await;

        let distribution = cumulative(&population);
        assert_eq!(distribution.len(), 4);
        assert_eq!(*distribution.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_cumulative_prefix_sums_are_monotonic() {
        let engine = engine_with_draws(vec![]);
        let population = fit(
            &engine,
            vec![staged("a", 1.0), staged("b", 2.0), staged("c", 3.0)],
        )
        .await;

        let distribution = cumulative(&population);
        for pair in distribution.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }
}
