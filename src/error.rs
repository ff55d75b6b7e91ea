use thiserror::Error;

use crate::{observation::Observation, wdl::ParseError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse world: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid action code {0}, expected one of 0..4")]
    InvalidAction(usize),

    #[error("observation `{0}` is not covered by the codec")]
    UnknownObservation(Observation),

    #[error("observation code {0} is out of range")]
    UnknownCode(usize),
}
