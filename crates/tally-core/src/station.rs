//! Station labels for the four measurement slots of an event.
//!
//! Labels are for display only; the store and sync layers accept any
//! dimension value.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Station {
  Run,
  Row,
  Bike,
  Ski,
}

impl Station {
  pub const ALL: [Station; 4] = [Station::Run, Station::Row, Station::Bike, Station::Ski];

  pub fn from_dimension(dimension: u8) -> Result<Self> {
    match dimension {
      1 => Ok(Station::Run),
      2 => Ok(Station::Row),
      3 => Ok(Station::Bike),
      4 => Ok(Station::Ski),
      other => Err(Error::UnknownStation(other)),
    }
  }

  pub fn dimension(self) -> u8 {
    match self {
      Station::Run => 1,
      Station::Row => 2,
      Station::Bike => 3,
      Station::Ski => 4,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Station::Run => "Run",
      Station::Row => "Row",
      Station::Bike => "Bike",
      Station::Ski => "Ski",
    }
  }
}

impl fmt::Display for Station {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.label()) }
}

/// Accepts a dimension number (`"3"`) or a label in any case (`"bike"`).
impl FromStr for Station {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    if let Ok(dimension) = s.parse::<u8>() {
      return Station::from_dimension(dimension);
    }
    Station::ALL
      .into_iter()
      .find(|station| station.label().eq_ignore_ascii_case(s))
      .ok_or_else(|| Error::InvalidStation(s.to_owned()))
  }
}
