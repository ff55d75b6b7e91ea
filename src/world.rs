use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use crate::{action::Action, observation::Observation, rule::RuleTable};

/// A grid cell, addressed by row and column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub row: usize,
    pub col: usize,
}

impl Location {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// The neighbouring cell in the direction of `action`, or `None` past the top or left edge
    pub fn shift(self, action: Action) -> Option<Self> {
        let (dr, dc) = action.delta();
        Some(Self {
            row: self.row.checked_add_signed(dr)?,
            col: self.col.checked_add_signed(dc)?,
        })
    }
}

impl From<(usize, usize)> for Location {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One cell of the layout grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tile {
    Empty,
    Wall,
    Door,
    Start,
    Goal,
    Terminal,
    Toggle,
    /// Any other character, free to be used by the abstraction or reward layers
    Symbol(char),
}

impl Tile {
    /// Characters with a fixed meaning in the layout
    pub const RESERVED: [char; 7] = [' ', '#', 'D', 'E', 'G', 'T', '@'];

    /// Whether the agent can never rest on this tile
    pub fn is_blocking(self) -> bool {
        matches!(self, Tile::Wall | Tile::Door)
    }
}

impl From<char> for Tile {
    fn from(c: char) -> Self {
        match c {
            ' ' => Tile::Empty,
            '#' => Tile::Wall,
            'D' => Tile::Door,
            'E' => Tile::Start,
            'G' => Tile::Goal,
            'T' => Tile::Terminal,
            '@' => Tile::Toggle,
            other => Tile::Symbol(other),
        }
    }
}

impl From<Tile> for char {
    fn from(tile: Tile) -> Self {
        match tile {
            Tile::Empty => ' ',
            Tile::Wall => '#',
            Tile::Door => 'D',
            Tile::Start => 'E',
            Tile::Goal => 'G',
            Tile::Terminal => 'T',
            Tile::Toggle => '@',
            Tile::Symbol(c) => c,
        }
    }
}

/// The symbolic layer laid over the layout
///
/// Cells holding a blank or one of `# D G E` are transparent: the agent standing
/// there observes its exact location.
#[derive(Debug, Clone, PartialEq)]
pub struct Abstraction {
    grid: Vec<Vec<char>>,
    names: HashMap<char, String>,
}

impl Abstraction {
    const TRANSPARENT: [char; 5] = [' ', '#', 'D', 'G', 'E'];

    /// Build the layer, naming every unnamed symbol after itself
    pub fn new(grid: Vec<Vec<char>>, mut names: HashMap<char, String>) -> Self {
        for &c in grid.iter().flatten() {
            if Self::is_symbol(c) {
                names.entry(c).or_insert_with(|| c.to_string());
            }
        }
        Self { grid, names }
    }

    pub fn is_symbol(c: char) -> bool {
        !Self::TRANSPARENT.contains(&c)
    }

    pub fn symbol_at(&self, location: Location) -> Option<char> {
        self.grid
            .get(location.row)
            .and_then(|row| row.get(location.col))
            .copied()
            .filter(|&c| Self::is_symbol(c))
    }

    pub fn name(&self, symbol: char) -> Option<&str> {
        self.names.get(&symbol).map(String::as_str)
    }

    /// Human-readable name of the symbol at `location`, if it carries one
    pub fn name_at(&self, location: Location) -> Option<&str> {
        self.symbol_at(location).and_then(|s| self.name(s))
    }

    pub fn names(&self) -> &HashMap<char, String> {
        &self.names
    }
}

/// Outcome of moving in a straight line from a cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Move {
    /// A wall (or the grid edge) stops the move; the agent stays put
    Blocked,
    /// The agent comes to rest here, after passing through any doors
    To(Location),
}

/// The immutable result of parsing a WDL document
#[derive(Debug, Clone, PartialEq)]
pub struct WorldModel {
    pub(crate) layout: Vec<Vec<Tile>>,
    pub(crate) abstraction: Option<Abstraction>,
    pub(crate) rewards: HashMap<Location, i64>,
    pub(crate) rules: RuleTable,
    pub(crate) rule_placement: HashMap<Location, char>,
    pub(crate) start: Location,
    pub(crate) goals: HashSet<Location>,
    pub(crate) terminals: HashSet<Location>,
    pub(crate) toggles: HashSet<Location>,
}

impl WorldModel {
    pub fn height(&self) -> usize {
        self.layout.len()
    }

    pub fn width(&self) -> usize {
        self.layout.first().map_or(0, Vec::len)
    }

    /// Layout rows; the start cell is stored as [`Tile::Empty`]
    pub fn layout(&self) -> &[Vec<Tile>] {
        &self.layout
    }

    pub fn tile(&self, location: Location) -> Option<Tile> {
        self.layout
            .get(location.row)
            .and_then(|row| row.get(location.col))
            .copied()
    }

    pub fn abstraction(&self) -> Option<&Abstraction> {
        self.abstraction.as_ref()
    }

    pub fn rewards(&self) -> &HashMap<Location, i64> {
        &self.rewards
    }

    pub fn reward_at(&self, location: Location) -> Option<i64> {
        self.rewards.get(&location).copied()
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn rule_placement(&self) -> &HashMap<Location, char> {
        &self.rule_placement
    }

    pub fn rule_at(&self, location: Location) -> Option<char> {
        self.rule_placement.get(&location).copied()
    }

    pub fn start(&self) -> Location {
        self.start
    }

    pub fn goals(&self) -> &HashSet<Location> {
        &self.goals
    }

    pub fn terminals(&self) -> &HashSet<Location> {
        &self.terminals
    }

    pub fn toggles(&self) -> &HashSet<Location> {
        &self.toggles
    }

    /// Number of cells the agent could occupy
    pub fn state_space(&self) -> usize {
        self.layout
            .iter()
            .flatten()
            .filter(|t| !t.is_blocking())
            .count()
    }

    /// Every cell the agent could occupy, in row-major order
    pub fn free_cells(&self) -> impl Iterator<Item = Location> + '_ {
        self.layout.iter().enumerate().flat_map(|(row, tiles)| {
            tiles
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.is_blocking())
                .map(move |(col, _)| Location::new(row, col))
        })
    }

    /// Follow `action` from `from`, passing through doors, until the agent rests or hits a wall
    ///
    /// A door backed by a wall blocks the whole move, so the agent never rests on a door.
    pub fn resolve_move(&self, from: Location, action: Action) -> Move {
        let mut candidate = from;
        loop {
            candidate = match candidate.shift(action) {
                Some(next) => next,
                None => return Move::Blocked,
            };
            match self.tile(candidate) {
                None | Some(Tile::Wall) => return Move::Blocked,
                Some(Tile::Door) => continue,
                Some(_) => return Move::To(candidate),
            }
        }
    }

    /// What the agent observes at `location` before slip and wall qualifiers
    pub fn observe(&self, location: Location, abstracted: bool) -> Observation {
        let name = if abstracted {
            self.abstraction.as_ref().and_then(|a| a.name_at(location))
        } else {
            None
        };
        match name {
            Some(name) => Observation::Abstracted(name.to_owned()),
            None => Observation::Coordinate(location),
        }
    }

    /// Transition model of a single step with stochastic rules active
    ///
    /// **Returns** `(executed_action, next_location, probability)` for each possible outcome
    pub fn successors(&self, location: Location, intended: Action) -> Vec<(Action, Location, f64)> {
        let land = |action| match self.resolve_move(location, action) {
            Move::Blocked => location,
            Move::To(next) => next,
        };

        let distribution = self
            .rule_at(location)
            .and_then(|id| self.rules.get(id))
            .and_then(|rule| rule.distribution(intended));

        match distribution {
            Some(dist) => dist
                .outcomes()
                .iter()
                .map(|&(action, p)| (action, land(action), p))
                .collect(),
            None => vec![(intended, land(intended), 1.0)],
        }
    }
}
