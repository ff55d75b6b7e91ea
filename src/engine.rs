use std::{collections::HashSet, path::Path, sync::Arc};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use strum::VariantArray;

use crate::{
    action::Action,
    env::{DiscreteActionSpace, Environment, Report},
    error::Error,
    observation::{CodecOptions, Observation, ObservationCodec},
    wdl,
    world::{Location, Move, WorldModel},
};

/// Configuration for the [`Engine`]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Ignore every stochastic rule
    pub force_determinism: bool,
    /// Qualify observations with the slip that just happened (partially observable mode only)
    pub indicate_slip: bool,
    /// Qualify observations with a wall marker when a move is blocked
    pub indicate_wall: bool,
    /// Observe abstraction names instead of coordinates, if the world has an abstraction layer
    pub partially_observable: bool,
    /// Number of steps after which an episode is truncated
    pub episode_horizon: usize,
    /// Reward for reaching a goal; terminal tiles pay its negation
    pub goal_reward: f32,
    /// Pay each reward tile at most once per episode
    pub one_time_rewards: bool,
    /// Reward for a step on which nothing else pays; only its magnitude is used, as a penalty
    pub step_penalty: f32,
    /// Name the executed action in slip observations, rather than a bare slip marker
    pub slip_names_action: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            force_determinism: false,
            indicate_slip: false,
            indicate_wall: false,
            partially_observable: true,
            episode_horizon: 100,
            goal_reward: 100.0,
            one_time_rewards: true,
            step_penalty: 0.0,
            slip_names_action: true,
        }
    }
}

/// Auxiliary details of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInfo {
    /// The action actually executed
    pub executed: Action,
    /// Whether a stochastic rule replaced the requested action
    pub slipped: bool,
    /// Whether the move was blocked by a wall
    pub hit_wall: bool,
    /// Whether the episode ended by reaching the horizon
    pub truncated: bool,
}

/// Result of [`Engine::step`]
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: usize,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// A partially observable gridworld loaded from a WDL document
///
/// The world and observation codec are shared read-only, so [`fork`](Engine::fork)
/// can hand out independent engines for other threads. Each engine owns its
/// episode state and its random source.
///
/// ### Generics
/// - `R` - The random source used to resolve stochastic rules; seed it to make
///   trajectories reproducible
pub struct Engine<R = StdRng> {
    world: Arc<WorldModel>,
    codec: Arc<ObservationCodec>,
    config: EngineConfig,
    partially_observable: bool,
    rng: R,
    location: Location,
    collected_rewards: HashSet<Location>,
    stochastic_enabled: bool,
    step_count: usize,
    last_slip: Option<Action>,
    pub report: Report,
}

impl Engine<StdRng> {
    /// Load a WDL file and build an engine seeded from system entropy
    pub fn configure(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, Error> {
        let world = wdl::load(path)?;
        Ok(Self::new(world, config))
    }

    pub fn new(world: WorldModel, config: EngineConfig) -> Self {
        Self::with_rng(Arc::new(world), config, StdRng::from_entropy())
    }

    pub fn seeded(world: WorldModel, config: EngineConfig, seed: u64) -> Self {
        Self::with_rng(Arc::new(world), config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Engine<R> {
    /// Build an engine over `world`, drawing slips from `rng`
    ///
    /// The step penalty is stored as a non-positive value, and partial
    /// observability is switched off when the world has no abstraction layer.
    ///
    /// **Panics** if `config.episode_horizon` is zero
    pub fn with_rng(world: Arc<WorldModel>, mut config: EngineConfig, rng: R) -> Self {
        assert!(
            config.episode_horizon > 0,
            "Episode horizon must be at least one step."
        );
        config.step_penalty = -config.step_penalty.abs();

        let partially_observable = config.partially_observable && world.abstraction().is_some();
        let codec = ObservationCodec::new(
            &world,
            CodecOptions {
                abstracted: partially_observable,
                walls: config.indicate_wall,
                slip_names_action: config.slip_names_action,
            },
        );
        log::debug!(
            "engine configured with {} observations (partially observable: {partially_observable})",
            codec.len()
        );

        Self {
            location: world.start(),
            world,
            codec: Arc::new(codec),
            config,
            partially_observable,
            rng,
            collected_rewards: HashSet::new(),
            stochastic_enabled: true,
            step_count: 0,
            last_slip: None,
            report: Report::new(vec!["reward", "steps", "slips"]),
        }
    }

    /// A fresh engine over the same world and codec, with its own random source
    pub fn fork<S: Rng>(&self, rng: S) -> Engine<S> {
        Engine {
            world: Arc::clone(&self.world),
            codec: Arc::clone(&self.codec),
            config: self.config.clone(),
            partially_observable: self.partially_observable,
            rng,
            location: self.world.start(),
            collected_rewards: HashSet::new(),
            stochastic_enabled: true,
            step_count: 0,
            last_slip: None,
            report: Report::new(self.report.keys()),
        }
    }

    pub fn action_count(&self) -> usize {
        Action::COUNT
    }

    pub fn observation_count(&self) -> usize {
        self.codec.len()
    }

    pub fn world(&self) -> &WorldModel {
        &self.world
    }

    pub fn codec(&self) -> &ObservationCodec {
        &self.codec
    }

    /// The effective configuration, after normalization
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_partially_observable(&self) -> bool {
        self.partially_observable
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn stochastic_enabled(&self) -> bool {
        self.stochastic_enabled
    }

    /// The executed action of the last step, if it differed from the requested one
    pub fn last_slip_action(&self) -> Option<Action> {
        self.last_slip
    }

    pub fn collected_rewards(&self) -> &HashSet<Location> {
        &self.collected_rewards
    }

    /// Start a new episode at the start location
    ///
    /// **Returns** the encoded initial observation
    pub fn reset(&mut self) -> Result<usize, Error> {
        self.step_count = 0;
        self.last_slip = None;
        self.stochastic_enabled = true;
        self.location = self.world.start();
        self.collected_rewards.clear();
        self.report.take();
        self.codec.encode(&self.observation())
    }

    /// Take the action with code `action`
    pub fn step(&mut self, action: usize) -> Result<Transition, Error> {
        let action = Action::from_repr(action).ok_or(Error::InvalidAction(action))?;
        self.step_action(action)
    }

    pub fn step_action(&mut self, action: Action) -> Result<Transition, Error> {
        self.step_count += 1;
        self.last_slip = None;
        self.report.entry("steps").and_modify(|x| *x += 1.0);

        let executed = match self.world.rule_at(self.location) {
            Some(id) if self.stochastic_enabled && !self.config.force_determinism => {
                self.world.rules().resolve(id, action, &mut self.rng)
            }
            _ => action,
        };
        let slipped = executed != action;
        if slipped {
            log::trace!("slipped at {}: {action} became {executed}", self.location);
            self.last_slip = Some(executed);
            self.report.entry("slips").and_modify(|x| *x += 1.0);
        }

        let truncated = self.step_count >= self.config.episode_horizon;
        let mut info = StepInfo {
            executed,
            slipped,
            hit_wall: false,
            truncated,
        };

        let next = match self.world.resolve_move(self.location, executed) {
            Move::To(next) => next,
            Move::Blocked => {
                let mut observation = self.observation();
                if self.config.indicate_wall {
                    observation = observation.walled();
                }
                info.hit_wall = true;
                let reward = self.config.step_penalty;
                self.report.entry("reward").and_modify(|x| *x += reward as f64);
                if truncated {
                    log::trace!("episode truncated after {} steps", self.step_count);
                }
                return Ok(Transition {
                    observation: self.codec.encode(&observation)?,
                    reward,
                    done: truncated,
                    info,
                });
            }
        };
        self.location = next;

        if self.world.toggles().contains(&next) {
            self.stochastic_enabled = !self.stochastic_enabled;
            let state = if self.stochastic_enabled { "on" } else { "off" };
            log::trace!("stochastic rules toggled {state} at {next}");
        }

        let mut reward = 0.0;
        if let Some(value) = self.world.reward_at(next) {
            if !self.config.one_time_rewards || !self.collected_rewards.contains(&next) {
                reward = value as f32;
            }
            self.collected_rewards.insert(next);
        }

        let mut done = false;
        if self.world.goals().contains(&next) {
            reward = self.config.goal_reward;
            done = true;
        }
        if self.world.terminals().contains(&next) {
            reward = -self.config.goal_reward;
            done = true;
        }
        // A zero payout, whatever its source, counts as nothing paid
        if reward == 0.0 && self.config.step_penalty != 0.0 {
            reward = self.config.step_penalty;
        }
        if done {
            log::trace!("episode ended at {next} after {} steps", self.step_count);
        } else if truncated {
            log::trace!("episode truncated after {} steps", self.step_count);
        }
        done |= truncated;

        self.report.entry("reward").and_modify(|x| *x += reward as f64);
        Ok(Transition {
            observation: self.codec.encode(&self.observation())?,
            reward,
            done,
            info,
        })
    }

    /// What the agent currently observes, before encoding
    pub fn observation(&self) -> Observation {
        let base = self.world.observe(self.location, self.partially_observable);
        match self.last_slip {
            Some(action) if self.partially_observable && self.config.indicate_slip => {
                base.slip(self.config.slip_names_action.then_some(action))
            }
            _ => base,
        }
    }

    pub fn decode(&self, code: usize) -> Result<&Observation, Error> {
        self.codec.decode(code)
    }

    /// Layout rows with the agent drawn as `E`
    pub fn render(&self) -> Vec<String> {
        self.world
            .layout()
            .iter()
            .enumerate()
            .map(|(row, tiles)| {
                tiles
                    .iter()
                    .enumerate()
                    .map(|(col, &tile)| {
                        if Location::new(row, col) == self.location {
                            'E'
                        } else {
                            char::from(tile)
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

impl<R: Rng> Environment for Engine<R> {
    type State = usize;
    type Action = Action;

    fn step(&mut self, action: Self::Action) -> (Option<Self::State>, f32) {
        let transition = self
            .step_action(action)
            .expect("codec covers every observation of its world");
        let next_state = (!transition.done).then_some(transition.observation);
        (next_state, transition.reward)
    }

    fn reset(&mut self) -> Self::State {
        Engine::reset(self).expect("codec covers the start observation")
    }

    fn random_action(&self) -> Self::Action {
        *Action::VARIANTS
            .choose(&mut rand::thread_rng())
            .expect("action set is not empty")
    }
}

impl<R: Rng> DiscreteActionSpace for Engine<R> {
    fn actions(&self) -> Vec<Self::Action> {
        Action::VARIANTS.to_vec()
    }
}
