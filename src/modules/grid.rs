use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::modules::entity::{Appearance, Occupant, Tile};

/// A tile coordinate. `x` grows to the right, `y` grows upward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn origin() -> Self {
        Self { x: 0, y: 0 }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Chebyshev distance; adjacent tiles (diagonals included) are at 1.
    pub fn distance(self, other: Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Where an entity should be put by [`Grid::place`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Random,
    At(Position),
}

impl From<Option<Position>> for Placement {
    fn from(position: Option<Position>) -> Self {
        match position {
            Some(p) => Placement::At(p),
            None => Placement::Random,
        }
    }
}

/// Dense spatial index of the world. Occupants are stored as arena handles,
/// never as the entities themselves.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    occupants: Vec<Option<Occupant>>,
    energy: Vec<f64>,
    background: Vec<Tile>,
}

impl Grid {
    pub fn new(width: usize, height: usize, tile: &Appearance) -> Self {
        let cells = width * height;
        let mut background = Vec::with_capacity(cells);
        for y in 0..height {
            for x in 0..width {
                background.push(Tile {
                    appearance: tile.clone(),
                    position: Position::new(x as i32, y as i32),
                });
            }
        }

        Self {
            width,
            height,
            occupants: vec![None; cells],
            energy: vec![0.0; cells],
            background,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, position: Position) -> bool {
        self.index(position).is_some()
    }

    fn index(&self, position: Position) -> Option<usize> {
        if position.x < 0 || position.y < 0 {
            return None;
        }
        let (x, y) = (position.x as usize, position.y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y * self.width + x)
    }

    /// False when out of bounds or occupied.
    pub fn is_empty(&self, position: Position) -> bool {
        self.index(position)
            .map(|idx| self.occupants[idx].is_none())
            .unwrap_or(false)
    }

    pub fn occupant_at(&self, position: Position) -> Option<Occupant> {
        self.index(position).and_then(|idx| self.occupants[idx])
    }

    pub fn energy_at(&self, position: Position) -> f64 {
        self.index(position).map(|idx| self.energy[idx]).unwrap_or(0.0)
    }

    pub fn tile_at(&self, position: Position) -> Option<&Tile> {
        self.index(position).map(|idx| &self.background[idx])
    }

    /// Refresh the energy mirror of an agent-occupied tile.
    pub(crate) fn set_energy(&mut self, position: Position, energy: f64) {
        if let Some(idx) = self.index(position) {
            if matches!(self.occupants[idx], Some(Occupant::Agent(_))) {
                self.energy[idx] = energy;
            }
        }
    }

    pub fn total_energy(&self) -> f64 {
        self.energy.iter().sum()
    }

    pub fn occupied_count(&self) -> usize {
        self.occupants.iter().filter(|o| o.is_some()).count()
    }

    /// All positions in row-major order, bottom row first.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| Position::new(x as i32, y as i32))
        })
    }

    /// Random start tile, then a row-major scan with wraparound. Fails after
    /// one full lap, so a full grid never loops forever.
    pub fn find_free_tile(&self, rng: &mut dyn RngCore) -> Option<Position> {
        if self.width == 0 || self.height == 0 {
            return None;
        }

        let mut x = rng.gen_range(0..self.width);
        let mut y = rng.gen_range(0..self.height);
        let start = (x, y);

        loop {
            let candidate = Position::new(x as i32, y as i32);
            if self.is_empty(candidate) {
                return Some(candidate);
            }

            x = (x + 1) % self.width;
            if x == 0 {
                y = (y + 1) % self.height;
            }
            if (x, y) == start {
                return None;
            }
        }
    }

    /// Put `occupant` (currently at `current`, if placed at all) on the grid.
    ///
    /// Returns the occupant's position after a successful call, `None` when
    /// nothing could be done. A random placement that finds no free tile is
    /// still a success for an occupant that is already on the grid: it stays
    /// where it is.
    pub fn place(
        &mut self,
        occupant: Occupant,
        current: Option<Position>,
        target: Placement,
        allow_relocate: bool,
        energy: f64,
        rng: &mut dyn RngCore,
    ) -> Option<Position> {
        let destination = match target {
            Placement::Random => match self.find_free_tile(rng) {
                Some(p) => p,
                None => return current,
            },
            Placement::At(p) if Some(p) == current => return current,
            Placement::At(p) if self.is_empty(p) => p,
            Placement::At(_) if allow_relocate => self.find_free_tile(rng)?,
            Placement::At(_) => return None,
        };

        if let Some(previous) = current.and_then(|p| self.index(p)) {
            self.occupants[previous] = None;
            self.energy[previous] = 0.0;
        }

        let idx = self.index(destination)?;
        self.occupants[idx] = Some(occupant);
        self.energy[idx] = match occupant {
            Occupant::Agent(_) => energy,
            Occupant::Block(_) => 0.0,
        };
        Some(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::entity::{Color, Intensity};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn grid(width: usize, height: usize) -> Grid {
        Grid::new(
            width,
            height,
            &Appearance::new("·", Color::Black, Intensity::Bright),
        )
    }

    #[test]
    fn out_of_bounds_is_never_empty() {
        let g = grid(3, 2);
        assert!(g.is_empty(Position::new(2, 1)));
        assert!(!g.is_empty(Position::new(3, 0)));
        assert!(!g.is_empty(Position::new(0, 2)));
        assert!(!g.is_empty(Position::new(-1, 0)));
    }

    #[test]
    fn full_grid_has_no_free_tile() {
        let mut g = grid(2, 2);
        let mut rng = StdRng::seed_from_u64(3);
        for (id, p) in g.positions().collect::<Vec<_>>().into_iter().enumerate() {
            let placed = g.place(Occupant::Block(id), None, Placement::At(p), false, 0.0, &mut rng);
            assert_eq!(placed, Some(p));
        }

        assert_eq!(g.find_free_tile(&mut rng), None);
        assert_eq!(
            g.place(Occupant::Block(9), None, Placement::Random, true, 0.0, &mut rng),
            None
        );
    }

    #[test]
    fn scan_wraps_to_the_only_free_tile() {
        let mut g = grid(3, 3);
        let mut rng = StdRng::seed_from_u64(11);
        let free = Position::new(0, 0);
        for (id, p) in g.positions().collect::<Vec<_>>().into_iter().enumerate() {
            if p != free {
                g.place(Occupant::Block(id), None, Placement::At(p), false, 0.0, &mut rng);
            }
        }

        for _ in 0..20 {
            assert_eq!(g.find_free_tile(&mut rng), Some(free));
        }
    }

    #[test]
    fn occupied_target_without_relocation_changes_nothing() {
        let mut g = grid(3, 3);
        let mut rng = StdRng::seed_from_u64(1);
        let a = Position::new(0, 0);
        let b = Position::new(1, 0);
        g.place(Occupant::Agent(0), None, Placement::At(a), false, 4.0, &mut rng);
        g.place(Occupant::Agent(1), None, Placement::At(b), false, 6.0, &mut rng);

        let moved = g.place(Occupant::Agent(0), Some(a), Placement::At(b), false, 4.0, &mut rng);

        assert_eq!(moved, None);
        assert_eq!(g.occupant_at(a), Some(Occupant::Agent(0)));
        assert_eq!(g.occupant_at(b), Some(Occupant::Agent(1)));
        assert_eq!(g.energy_at(a), 4.0);
        assert_eq!(g.energy_at(b), 6.0);
    }

    #[test]
    fn occupied_target_with_relocation_finds_another_tile() {
        let mut g = grid(3, 3);
        let mut rng = StdRng::seed_from_u64(5);
        let taken = Position::new(1, 1);
        g.place(Occupant::Block(0), None, Placement::At(taken), false, 0.0, &mut rng);

        let placed = g
            .place(Occupant::Agent(0), None, Placement::At(taken), true, 2.5, &mut rng)
            .unwrap();

        assert_ne!(placed, taken);
        assert_eq!(g.occupant_at(placed), Some(Occupant::Agent(0)));
        assert_eq!(g.energy_at(placed), 2.5);
        assert_eq!(g.occupied_count(), 2);
    }

    #[test]
    fn moving_clears_the_previous_tile() {
        let mut g = grid(3, 3);
        let mut rng = StdRng::seed_from_u64(2);
        let from = Position::new(1, 1);
        let to = Position::new(2, 1);
        g.place(Occupant::Agent(0), None, Placement::At(from), false, 7.0, &mut rng);

        let placed = g.place(Occupant::Agent(0), Some(from), Placement::At(to), false, 7.0, &mut rng);

        assert_eq!(placed, Some(to));
        assert!(g.is_empty(from));
        assert_eq!(g.energy_at(from), 0.0);
        assert_eq!(g.energy_at(to), 7.0);
        assert_eq!(g.total_energy(), 7.0);
    }

    #[test]
    fn placing_on_own_tile_is_a_no_op_success() {
        let mut g = grid(2, 2);
        let mut rng = StdRng::seed_from_u64(2);
        let p = Position::new(1, 0);
        g.place(Occupant::Agent(0), None, Placement::At(p), false, 1.0, &mut rng);

        assert_eq!(
            g.place(Occupant::Agent(0), Some(p), Placement::At(p), false, 1.0, &mut rng),
            Some(p)
        );
        assert_eq!(g.occupied_count(), 1);
    }

    #[test]
    fn random_placement_on_full_grid_keeps_placed_occupant() {
        let mut g = grid(1, 2);
        let mut rng = StdRng::seed_from_u64(8);
        let p = Position::new(0, 0);
        g.place(Occupant::Agent(0), None, Placement::At(p), false, 3.0, &mut rng);
        g.place(Occupant::Block(0), None, Placement::At(Position::new(0, 1)), false, 0.0, &mut rng);

        assert_eq!(
            g.place(Occupant::Agent(0), Some(p), Placement::Random, false, 3.0, &mut rng),
            Some(p)
        );
        assert_eq!(g.energy_at(p), 3.0);
    }

    #[test]
    fn blocks_never_mirror_energy() {
        let mut g = grid(2, 1);
        let mut rng = StdRng::seed_from_u64(4);
        let p = Position::new(0, 0);
        g.place(Occupant::Block(0), None, Placement::At(p), false, 99.0, &mut rng);
        g.set_energy(p, 12.0);

        assert_eq!(g.energy_at(p), 0.0);
    }
}
