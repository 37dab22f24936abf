use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The eight offsets around a tile.
pub const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Rest,
    Move,
    Eat,
}

impl ActionKind {
    pub const fn label(self) -> &'static str {
        match self {
            ActionKind::Rest => "rest",
            ActionKind::Move => "move",
            ActionKind::Eat => "eat",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Rest,
    Move { dx: i32, dy: i32 },
    Eat { dx: i32, dy: i32 },
}

impl Action {
    pub const fn kind(&self) -> ActionKind {
        match self {
            Action::Rest => ActionKind::Rest,
            Action::Move { .. } => ActionKind::Move,
            Action::Eat { .. } => ActionKind::Eat,
        }
    }

    pub const fn offset(&self) -> (i32, i32) {
        match *self {
            Action::Rest => (0, 0),
            Action::Move { dx, dy } | Action::Eat { dx, dy } => (dx, dy),
        }
    }

    /// Arrow pointing along the action's displacement (y up).
    pub fn icon(&self) -> char {
        match self.offset() {
            (0, 0) => '·',
            (dx, dy) => match (dx.signum(), dy.signum()) {
                (0, 1) => '↑',
                (1, 1) => '↗',
                (1, 0) => '→',
                (1, -1) => '↘',
                (0, -1) => '↓',
                (-1, -1) => '↙',
                (-1, 0) => '←',
                _ => '↖',
            },
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::Rest
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Rest => write!(f, "rest"),
            Action::Move { dx, dy } => write!(f, "move({},{})", dx, dy),
            Action::Eat { dx, dy } => write!(f, "eat({},{})", dx, dy),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (verb, rest) = match trimmed.split_once(':') {
            Some((verb, rest)) => (verb.trim().to_lowercase(), Some(rest)),
            None => (trimmed.to_lowercase(), None),
        };

        let offset = |rest: Option<&str>| -> Result<(i32, i32), String> {
            let coords = rest.ok_or_else(|| format!("{} requires dx,dy e.g. {}:1,0", verb, verb))?;
            let parts: Vec<_> = coords.split(',').collect();
            if parts.len() != 2 {
                return Err(format!("{} requires exactly two coordinates", verb));
            }
            let dx = parts[0]
                .trim()
                .parse::<i32>()
                .map_err(|_| "dx must be an integer")?;
            let dy = parts[1]
                .trim()
                .parse::<i32>()
                .map_err(|_| "dy must be an integer")?;
            Ok((dx, dy))
        };

        match verb.as_str() {
            "rest" | "none" | "idle" => Ok(Action::Rest),
            "move" => {
                let (dx, dy) = offset(rest)?;
                Ok(Action::Move { dx, dy })
            }
            "eat" | "feed" | "bite" => {
                let (dx, dy) = offset(rest)?;
                Ok(Action::Eat { dx, dy })
            }
            _ => Err(format!(
                "Unknown action '{}'. Use rest | move:<dx>,<dy> | eat:<dx>,<dy>",
                verb
            )),
        }
    }
}

/// Energy ratio per action kind, applied as a multiplier on an agent's
/// `move_cost`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCosts {
    ratios: BTreeMap<ActionKind, f64>,
}

impl ActionCosts {
    pub fn empty() -> Self {
        Self {
            ratios: BTreeMap::new(),
        }
    }

    pub fn with(mut self, kind: ActionKind, ratio: f64) -> Self {
        self.ratios.insert(kind, ratio);
        self
    }

    pub fn ratio(&self, kind: ActionKind) -> Option<f64> {
        self.ratios.get(&kind).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, f64)> + '_ {
        self.ratios.iter().map(|(k, v)| (*k, *v))
    }
}

impl Default for ActionCosts {
    fn default() -> Self {
        Self::empty()
            .with(ActionKind::Rest, 0.0)
            .with(ActionKind::Move, 1.0)
            .with(ActionKind::Eat, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_strings() {
        assert_eq!("rest".parse::<Action>().unwrap(), Action::Rest);
        assert_eq!(
            " move:1,-1 ".parse::<Action>().unwrap(),
            Action::Move { dx: 1, dy: -1 }
        );
        assert_eq!(
            "EAT: 0, 1".parse::<Action>().unwrap(),
            Action::Eat { dx: 0, dy: 1 }
        );
        assert!("move".parse::<Action>().is_err());
        assert!("move:1".parse::<Action>().is_err());
        assert!("jump:1,1".parse::<Action>().is_err());
    }

    #[test]
    fn icons_follow_the_displacement() {
        assert_eq!(Action::Rest.icon(), '·');
        assert_eq!(Action::Move { dx: 0, dy: 1 }.icon(), '↑');
        assert_eq!(Action::Move { dx: 1, dy: 0 }.icon(), '→');
        assert_eq!(Action::Eat { dx: -1, dy: -1 }.icon(), '↙');
        assert_eq!(Action::Move { dx: -3, dy: 2 }.icon(), '↖');
    }

    #[test]
    fn cost_table_is_sparse() {
        let costs = ActionCosts::empty().with(ActionKind::Move, 1.5);
        assert_eq!(costs.ratio(ActionKind::Move), Some(1.5));
        assert_eq!(costs.ratio(ActionKind::Eat), None);
    }
}
