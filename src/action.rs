use strum::{Display, EnumIter, EnumString, FromRepr, VariantArray};

/// One of the four moves available to the agent
///
/// The discriminant is the action's code in the discrete action space, and the
/// lowercase name is how the action is spelled in WDL behaviour rules.
#[derive(
    EnumIter,
    VariantArray,
    FromRepr,
    EnumString,
    Display,
    Clone,
    Copy,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Action {
    /// Number of actions in the action space
    pub const COUNT: usize = 4;

    /// The action's code in `0..Action::COUNT`
    pub fn code(self) -> usize {
        self as usize
    }

    /// Row and column offset of a single move
    pub fn delta(self) -> (isize, isize) {
        match self {
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }
}
