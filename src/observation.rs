use std::{collections::HashMap, fmt};

use strum::VariantArray;

use crate::{action::Action, error::Error, world::WorldModel};

/// What the agent perceives after a step
///
/// Qualifiers nest: a wall bumped right after a slip is `Walled(Slip(..))`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Observation {
    /// The exact cell the agent occupies
    Coordinate(crate::world::Location),
    /// The name of the abstraction symbol covering the agent's cell
    Abstracted(String),
    /// The executed action differed from the requested one; the action is
    /// omitted when slips are reported without naming it
    Slip(Box<Observation>, Option<Action>),
    /// The move was blocked by a wall
    Walled(Box<Observation>),
}

impl Observation {
    pub fn slip(self, action: Option<Action>) -> Self {
        Observation::Slip(Box::new(self), action)
    }

    pub fn walled(self) -> Self {
        Observation::Walled(Box::new(self))
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Coordinate(location) => write!(f, "{location}"),
            Observation::Abstracted(name) => f.write_str(name),
            Observation::Slip(inner, Some(action)) => write!(f, "{inner}_slip_{action}"),
            Observation::Slip(inner, None) => write!(f, "{inner}_slip"),
            Observation::Walled(inner) => write!(f, "{inner}_wall"),
        }
    }
}

/// Which observation variants a codec has to cover
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecOptions {
    /// Observe abstraction names instead of coordinates where available
    pub abstracted: bool,
    /// Allocate wall-qualified codes
    pub walls: bool,
    /// Name the executed action in slip-qualified codes
    pub slip_names_action: bool,
}

/// Bijection between observations and the integers `0..len()`
///
/// Built once per world and feature set; read-only afterwards.
#[derive(Debug, Clone)]
pub struct ObservationCodec {
    codes: HashMap<Observation, usize>,
    observations: Vec<Observation>,
}

impl ObservationCodec {
    /// Enumerate every observation `world` can produce under `options`
    ///
    /// Base observations come first, in row-major order of the free cells, with
    /// repeated abstraction names sharing the code of their first occurrence.
    /// Slip codes follow when the world has stochastic rules, then a wall code
    /// for every code allocated so far.
    pub fn new(world: &WorldModel, options: CodecOptions) -> Self {
        let mut codec = Self {
            codes: HashMap::new(),
            observations: Vec::new(),
        };

        for location in world.free_cells() {
            codec.push(world.observe(location, options.abstracted));
        }

        if !world.rules().is_empty() {
            let base = codec.observations.clone();
            for observation in base {
                if options.slip_names_action {
                    for &action in Action::VARIANTS {
                        codec.push(observation.clone().slip(Some(action)));
                    }
                } else {
                    codec.push(observation.slip(None));
                }
            }
        }

        if options.walls {
            let all = codec.observations.clone();
            for observation in all {
                codec.push(observation.walled());
            }
        }

        codec
    }

    fn push(&mut self, observation: Observation) {
        if !self.codes.contains_key(&observation) {
            self.codes.insert(observation.clone(), self.observations.len());
            self.observations.push(observation);
        }
    }

    /// Number of distinct observations
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn encode(&self, observation: &Observation) -> Result<usize, Error> {
        self.codes
            .get(observation)
            .copied()
            .ok_or_else(|| Error::UnknownObservation(observation.clone()))
    }

    pub fn decode(&self, code: usize) -> Result<&Observation, Error> {
        self.observations.get(code).ok_or(Error::UnknownCode(code))
    }

    /// All observations, indexed by code
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }
}
