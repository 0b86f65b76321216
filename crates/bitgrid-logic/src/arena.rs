//! Pure arena logic: the lightcycle duel that gates each sector.
//!
//! Two agents move half a cell per step over the sector grid, leaving a
//! permanent trail. Running into a trail, a building, or the arena edge is
//! fatal. The player wins by reaching the grid-hall after the opponent has
//! gone down.
//!
//! Coordinates are integers on the half-cell lattice: one unit is half a
//! cell, so cell `(row, col)` covers x in `2*col..=2*col+1` and y in
//! `2*row..=2*row+1`.
//!
//! Phases: `NotStarted → Running → Won | Lost`, with `reset` back to
//! `NotStarted` from any phase. [`Arena::step`] does nothing outside
//! `Running`; the caller drives it at a fixed cadence.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{BuildingKind, Catalog};
use crate::constants::{row_col, GRID_CELLS, GRID_SIDE};
use crate::grid::Grid;

/// Lattice points along one side.
const LATTICE_SIDE: i32 = (GRID_SIDE * 2) as i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Quarter turn counter-clockwise (screen coordinates, y down).
    pub fn turn_left(self) -> Self {
        match self {
            Direction::Up => Direction::Left,
            Direction::Left => Direction::Down,
            Direction::Down => Direction::Right,
            Direction::Right => Direction::Up,
        }
    }

    pub fn turn_right(self) -> Self {
        self.turn_left().reverse()
    }

    fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// A point on the half-cell lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HalfPoint {
    pub x: i32,
    pub y: i32,
}

impl HalfPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Top-left lattice point of a grid cell.
    pub fn at_cell(index: usize) -> Self {
        let (row, col) = row_col(index);
        Self::new(col as i32 * 2, row as i32 * 2)
    }

    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.delta();
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn in_bounds(self) -> bool {
        (0..LATTICE_SIDE).contains(&self.x) && (0..LATTICE_SIDE).contains(&self.y)
    }

    /// Grid cell containing this point; `None` off the arena.
    pub fn cell(self) -> Option<usize> {
        if !self.in_bounds() {
            return None;
        }
        let col = (self.x / 2) as usize;
        let row = (self.y / 2) as usize;
        Some(row * GRID_SIDE + col)
    }

    /// Position in cell units, for the view layer.
    pub fn to_cell_units(self) -> (f32, f32) {
        (self.x as f32 / 2.0, self.y as f32 / 2.0)
    }
}

/// What occupies a cell, as far as the arena cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Open,
    /// The grid-hall: passable, and the player's goal.
    Hub,
    /// Any other building.
    Blocked,
}

/// Obstacle map derived from a sector grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaMap {
    cells: Vec<CellKind>,
}

impl ArenaMap {
    pub fn from_grid(grid: &Grid, catalog: &Catalog) -> Self {
        let cells = grid
            .codes()
            .iter()
            .map(|&code| match catalog.kind_of(code) {
                None => CellKind::Open,
                Some(BuildingKind::Hub) => CellKind::Hub,
                Some(_) => CellKind::Blocked,
            })
            .collect();
        Self { cells }
    }

    /// `None` off the arena.
    pub fn kind_at(&self, point: HalfPoint) -> Option<CellKind> {
        point.cell().and_then(|i| self.cells.get(i).copied())
    }

    pub fn kind_of_cell(&self, index: usize) -> Option<CellKind> {
        self.cells.get(index).copied()
    }

    /// Open cells (no building at all) in grid order.
    pub fn open_cells(&self) -> Vec<usize> {
        (0..GRID_CELLS)
            .filter(|&i| self.cells.get(i) == Some(&CellKind::Open))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub position: HalfPoint,
    pub facing: Direction,
    /// Direction of the last move made; the spawn facing before any.
    pub heading: Direction,
    /// Every point occupied this session, current position last.
    pub trail: Vec<HalfPoint>,
    pub alive: bool,
}

impl Agent {
    fn spawn(cell: usize, facing: Direction) -> Self {
        let position = HalfPoint::at_cell(cell);
        Self {
            position,
            facing,
            heading: facing,
            trail: vec![position],
            alive: true,
        }
    }

    fn advance_to(&mut self, point: HalfPoint) {
        self.position = point;
        self.heading = self.facing;
        self.trail.push(point);
    }

    /// Out of play: trail wiped, no further moves.
    fn eliminate(&mut self) {
        self.alive = false;
        self.trail.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossReason {
    OutOfBounds,
    HitBuilding,
    HitTrail,
    /// Both agents moved onto the same point in the same step.
    HeadOn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArenaPhase {
    NotStarted,
    Running,
    Won,
    Lost(LossReason),
}

impl ArenaPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ArenaPhase::Won | ArenaPhase::Lost(_))
    }
}

/// What a single step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not running; nothing moved.
    Idle,
    Continued,
    /// The opponent went down this step; the session goes on.
    OpponentDown,
    /// Reported once per session.
    Won,
    Lost(LossReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("arena needs two open cells to start")]
    NoRoom,
    #[error("cell {0} is not an open start cell")]
    BadStart(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SteerDenied {
    #[error("cannot reverse into your own trail")]
    Reversal,
    #[error("session is over")]
    Finished,
}

/// One arena session.
#[derive(Debug, Clone)]
pub struct Arena {
    map: ArenaMap,
    player: Agent,
    opponent: Agent,
    phase: ArenaPhase,
    win_recorded: bool,
}

impl Arena {
    /// New session with random starts: player on the left half, opponent on
    /// the right, falling back to any open cell.
    pub fn new(map: ArenaMap, rng: &mut impl Rng) -> Result<Self, ArenaError> {
        let (player_cell, opponent_cell) = pick_starts(&map, rng)?;
        Self::with_starts(map, player_cell, opponent_cell)
    }

    /// New session with fixed start cells.
    pub fn with_starts(
        map: ArenaMap,
        player_cell: usize,
        opponent_cell: usize,
    ) -> Result<Self, ArenaError> {
        for cell in [player_cell, opponent_cell] {
            if map.kind_of_cell(cell) != Some(CellKind::Open) {
                return Err(ArenaError::BadStart(cell));
            }
        }
        if player_cell == opponent_cell {
            return Err(ArenaError::BadStart(opponent_cell));
        }
        Ok(Self {
            map,
            player: Agent::spawn(player_cell, Direction::Right),
            opponent: Agent::spawn(opponent_cell, Direction::Left),
            phase: ArenaPhase::NotStarted,
            win_recorded: false,
        })
    }

    /// Back to `NotStarted` with fresh starts and empty trails.
    pub fn reset(&mut self, rng: &mut impl Rng) -> Result<(), ArenaError> {
        let (player_cell, opponent_cell) = pick_starts(&self.map, rng)?;
        self.player = Agent::spawn(player_cell, Direction::Right);
        self.opponent = Agent::spawn(opponent_cell, Direction::Left);
        self.phase = ArenaPhase::NotStarted;
        self.win_recorded = false;
        Ok(())
    }

    /// `NotStarted → Running`. Returns false from any other phase.
    pub fn start(&mut self) -> bool {
        if self.phase != ArenaPhase::NotStarted {
            return false;
        }
        self.phase = ArenaPhase::Running;
        true
    }

    /// Change the player's facing. A 180° turn against the last move is
    /// refused, however many turns are queued before the next step.
    pub fn steer(&mut self, dir: Direction) -> Result<(), SteerDenied> {
        if self.phase.is_terminal() {
            return Err(SteerDenied::Finished);
        }
        if dir == self.player.heading.reverse() {
            return Err(SteerDenied::Reversal);
        }
        self.player.facing = dir;
        Ok(())
    }

    /// Advance both agents half a cell.
    ///
    /// Both agents are judged against the trails as they stood when the
    /// step began. The opponent moves first in bookkeeping order, but the
    /// player's win needs the opponent to have been down before this step.
    pub fn step(&mut self) -> StepOutcome {
        if self.phase != ArenaPhase::Running {
            return StepOutcome::Idle;
        }

        let occupied: HashSet<HalfPoint> = self
            .player
            .trail
            .iter()
            .chain(self.opponent.trail.iter())
            .copied()
            .collect();
        let opponent_was_down = !self.opponent.alive;
        let player_start = self.player.position;
        let opponent_start = self.opponent.alive.then_some(self.opponent.position);

        if self.opponent.alive {
            self.opponent.facing = self.choose_opponent_facing(&occupied);
        }

        let player_next = player_start.step(self.player.facing);
        let mut player_fate = self.judge(player_next, &occupied, opponent_start);

        let mut opponent_move = None;
        if let Some(start) = opponent_start {
            let next = start.step(self.opponent.facing);
            opponent_move = Some((next, self.judge(next, &occupied, Some(player_start))));
        }

        if let Some((next, opponent_fate)) = opponent_move.as_mut() {
            if player_fate.is_ok() && opponent_fate.is_ok() && *next == player_next {
                player_fate = Err(LossReason::HeadOn);
                *opponent_fate = Err(LossReason::HeadOn);
            }
        }

        let mut outcome = StepOutcome::Continued;
        match opponent_move {
            Some((next, Ok(()))) => self.opponent.advance_to(next),
            Some((_, Err(reason))) => {
                log::info!("arena opponent down: {reason:?}");
                self.opponent.eliminate();
                outcome = StepOutcome::OpponentDown;
            }
            None => {}
        }

        match player_fate {
            Err(reason) => {
                log::info!("arena lost: {reason:?}");
                self.player.alive = false;
                self.phase = ArenaPhase::Lost(reason);
                StepOutcome::Lost(reason)
            }
            Ok(()) => {
                self.player.advance_to(player_next);
                let on_hub = self.map.kind_at(player_next) == Some(CellKind::Hub);
                if on_hub && opponent_was_down {
                    self.record_win()
                } else {
                    outcome
                }
            }
        }
    }

    fn record_win(&mut self) -> StepOutcome {
        self.phase = ArenaPhase::Won;
        if self.win_recorded {
            return StepOutcome::Idle;
        }
        self.win_recorded = true;
        log::info!("arena won");
        StepOutcome::Won
    }

    /// Whether `next` kills the agent moving there.
    fn judge(
        &self,
        next: HalfPoint,
        occupied: &HashSet<HalfPoint>,
        other_agent: Option<HalfPoint>,
    ) -> Result<(), LossReason> {
        match self.map.kind_at(next) {
            None => Err(LossReason::OutOfBounds),
            Some(CellKind::Blocked) => Err(LossReason::HitBuilding),
            _ if occupied.contains(&next) || other_agent == Some(next) => {
                Err(LossReason::HitTrail)
            }
            _ => Ok(()),
        }
    }

    /// Straight, then left, then right, then back; first safe option wins.
    /// With nothing safe the opponent holds course.
    fn choose_opponent_facing(&self, occupied: &HashSet<HalfPoint>) -> Direction {
        let facing = self.opponent.facing;
        let candidates = [
            facing,
            facing.turn_left(),
            facing.turn_right(),
            facing.turn_left().turn_left(),
        ];
        candidates
            .into_iter()
            .find(|&dir| {
                let next = self.opponent.position.step(dir);
                matches!(
                    self.map.kind_at(next),
                    Some(CellKind::Open) | Some(CellKind::Hub)
                ) && !occupied.contains(&next)
            })
            .unwrap_or(facing)
    }

    pub fn phase(&self) -> ArenaPhase {
        self.phase
    }

    pub fn player(&self) -> &Agent {
        &self.player
    }

    pub fn opponent(&self) -> &Agent {
        &self.opponent
    }

    pub fn map(&self) -> &ArenaMap {
        &self.map
    }

    pub fn win_recorded(&self) -> bool {
        self.win_recorded
    }
}

fn pick_starts(map: &ArenaMap, rng: &mut impl Rng) -> Result<(usize, usize), ArenaError> {
    let open = map.open_cells();
    let half = GRID_SIDE / 2;
    let left: Vec<usize> = open.iter().copied().filter(|&i| i % GRID_SIDE < half).collect();

    let player_pool = if left.is_empty() { &open } else { &left };
    let player = *player_pool.choose(rng).ok_or(ArenaError::NoRoom)?;

    let rest: Vec<usize> = open.into_iter().filter(|&i| i != player).collect();
    let right: Vec<usize> = rest.iter().copied().filter(|&i| i % GRID_SIDE >= half).collect();
    let opponent_pool = if right.is_empty() { &rest } else { &right };
    let opponent = *opponent_pool.choose(rng).ok_or(ArenaError::NoRoom)?;

    Ok((player, opponent))
}
