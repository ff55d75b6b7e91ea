use std::collections::{BTreeSet, HashMap};

use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

use crate::action::Action;

/// Allowed deviation of a distribution's total probability from 1
pub const PROBABILITY_TOLERANCE: f64 = 1e-5;

/// A discrete distribution over executed actions
#[derive(Debug, Clone)]
pub struct ActionDistribution {
    outcomes: Vec<(Action, f64)>,
    index: WeightedIndex<f64>,
}

impl ActionDistribution {
    /// Build a distribution from `(action, probability)` pairs
    ///
    /// Fails with the total probability if the pairs do not sum to 1 within
    /// [`PROBABILITY_TOLERANCE`], or if any probability is negative or not finite.
    pub fn new(outcomes: Vec<(Action, f64)>) -> Result<Self, f64> {
        let sum: f64 = outcomes.iter().map(|&(_, p)| p).sum();
        let valid = outcomes.iter().all(|&(_, p)| p.is_finite() && p >= 0.0);
        if !valid || (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(sum);
        }
        let index = WeightedIndex::new(outcomes.iter().map(|&(_, p)| p)).map_err(|_| sum)?;
        Ok(Self { outcomes, index })
    }

    pub fn outcomes(&self) -> &[(Action, f64)] {
        &self.outcomes
    }

    /// Draw an executed action
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Action {
        self.outcomes[self.index.sample(rng)].0
    }
}

impl PartialEq for ActionDistribution {
    fn eq(&self, other: &Self) -> bool {
        self.outcomes == other.outcomes
    }
}

/// Stochastic behaviour attached to a set of cells
///
/// Each overridden intended action maps to a distribution over the actions that
/// actually get executed. Actions without an override pass through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct StochasticRule {
    id: char,
    behaviour: HashMap<Action, ActionDistribution>,
}

impl StochasticRule {
    pub fn new(id: char) -> Self {
        Self {
            id,
            behaviour: HashMap::new(),
        }
    }

    pub fn id(&self) -> char {
        self.id
    }

    /// Register (or replace) the distribution used when `intended` is requested
    pub fn add_override(&mut self, intended: Action, distribution: ActionDistribution) {
        self.behaviour.insert(intended, distribution);
    }

    pub fn distribution(&self, intended: Action) -> Option<&ActionDistribution> {
        self.behaviour.get(&intended)
    }

    /// Pick the action that is actually executed when `intended` is requested
    pub fn resolve<R: Rng + ?Sized>(&self, intended: Action, rng: &mut R) -> Action {
        match self.behaviour.get(&intended) {
            Some(dist) => dist.sample(rng),
            None => intended,
        }
    }

    /// Every action some override of this rule can execute
    pub fn all_actions(&self) -> BTreeSet<Action> {
        self.behaviour
            .values()
            .flat_map(|d| d.outcomes().iter().map(|&(a, _)| a))
            .collect()
    }
}

/// All stochastic rules of a world, keyed by rule id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTable {
    rules: HashMap<char, StochasticRule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one override into the table, creating the rule on first use
    pub fn insert(&mut self, id: char, intended: Action, distribution: ActionDistribution) {
        self.rules
            .entry(id)
            .or_insert_with(|| StochasticRule::new(id))
            .add_override(intended, distribution);
    }

    pub fn get(&self, id: char) -> Option<&StochasticRule> {
        self.rules.get(&id)
    }

    pub fn contains(&self, id: char) -> bool {
        self.rules.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Executed action for `intended` under rule `id`; unknown rules never perturb
    pub fn resolve<R: Rng + ?Sized>(&self, id: char, intended: Action, rng: &mut R) -> Action {
        match self.rules.get(&id) {
            Some(rule) => rule.resolve(intended, rng),
            None => intended,
        }
    }
}
