//! Windy gridworld (Sutton & Barto, example 6.5).
//!
//! A shortest-path task used to validate the TD solvers because its optimal
//! path length is known.
//!
//! ## Rules
//!
//! - 7 rows × 10 columns, start (3, 0), goal (3, 7)
//! - Moves: up, down, left, right; a move that would leave the grid is not
//!   offered
//! - After moving, the wind of the column the agent *left* pushes it up by
//!   that many rows, clamped to the grid
//! - Reward −1 per move, 0 for the move that enters the goal
//!
//! ## Grid
//!
//! ```text
//! . . . . . . . . . .
//! . . . . . . . . . .
//! . . . . . . . . . .
//! S . . . . . . G . .
//! . . . . . . . . . .
//! . . . . . . . . . .
//! . . . . . . . . . .
//! 0 0 0 1 1 1 2 2 1 0   <- wind
//! ```
//!
//! **Optimal path**: 15 moves. Without wind: 7 moves.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::{Environment, Reward, Transition};

/// Grid cell as (row, column), row 0 at the top.
pub type Cell = (usize, usize);

/// Standard wind strengths per column.
pub const DEFAULT_WIND: [usize; 10] = [0, 0, 0, 1, 1, 1, 2, 2, 1, 0];

const ROWS: usize = 7;
const COLS: usize = 10;
const STEP_REWARD: Reward = -1.0;
const GOAL_REWARD: Reward = 0.0;

/// Moves in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridAction {
    /// One row up
    Up,
    /// One row down
    Down,
    /// One column left
    Left,
    /// One column right
    Right,
}

impl GridAction {
    /// All moves in enumeration order.
    pub const ALL: [GridAction; 4] = [
        GridAction::Up,
        GridAction::Down,
        GridAction::Left,
        GridAction::Right,
    ];

    /// (row, column) offset of the move.
    pub fn delta(&self) -> (i64, i64) {
        match self {
            GridAction::Up => (-1, 0),
            GridAction::Down => (1, 0),
            GridAction::Left => (0, -1),
            GridAction::Right => (0, 1),
        }
    }

    /// Position in [`GridAction::ALL`].
    pub fn index(&self) -> usize {
        match self {
            GridAction::Up => 0,
            GridAction::Down => 1,
            GridAction::Left => 2,
            GridAction::Right => 3,
        }
    }

    fn arrow(&self) -> char {
        match self {
            GridAction::Up => '↑',
            GridAction::Down => '↓',
            GridAction::Left => '←',
            GridAction::Right => '→',
        }
    }
}

impl fmt::Display for GridAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arrow())
    }
}

/// The windy gridworld environment.
#[derive(Debug, Clone)]
pub struct WindyGridworld {
    wind: Vec<usize>,
    start: Cell,
    goal: Cell,
}

impl Default for WindyGridworld {
    fn default() -> Self {
        Self::new()
    }
}

impl WindyGridworld {
    /// Grid with the standard wind.
    pub fn new() -> Self {
        Self {
            wind: DEFAULT_WIND.to_vec(),
            start: (3, 0),
            goal: (3, 7),
        }
    }

    /// Grid with custom per-column wind.
    ///
    /// # Errors
    /// [`GpiError::InvalidArgument`] unless there is one entry per column.
    pub fn with_wind(wind: Vec<usize>) -> Result<Self> {
        if wind.len() != COLS {
            return Err(GpiError::InvalidArgument(format!(
                "wind needs {} columns, got {}",
                COLS,
                wind.len()
            )));
        }
        Ok(Self {
            wind,
            ..Self::new()
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        ROWS
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        COLS
    }

    /// Start cell.
    pub fn start(&self) -> Cell {
        self.start
    }

    /// Goal cell.
    pub fn goal(&self) -> Cell {
        self.goal
    }

    /// Wind strength per column.
    pub fn wind(&self) -> &[usize] {
        &self.wind
    }

    fn contains(&self, (r, c): Cell) -> bool {
        r < ROWS && c < COLS
    }

    /// Cell reached by the move alone, before wind.
    fn walk(&self, (r, c): Cell, action: &GridAction) -> Option<Cell> {
        let (dr, dc) = action.delta();
        let row = r as i64 + dr;
        let col = c as i64 + dc;
        if row < 0 || col < 0 || row >= ROWS as i64 || col >= COLS as i64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    /// Draw `policy` as a grid of arrows, `G` on the goal, `?` where unmapped.
    pub fn render_policy(&self, policy: &FxHashMap<Cell, GridAction>) -> String {
        let mut out = String::new();
        for r in 0..ROWS {
            let row: Vec<String> = (0..COLS)
                .map(|c| {
                    if (r, c) == self.goal {
                        "G".to_string()
                    } else {
                        policy
                            .get(&(r, c))
                            .map_or("?".to_string(), |a| a.to_string())
                    }
                })
                .collect();
            out.push_str(&row.join(" "));
            out.push('\n');
        }
        out
    }

    /// Draw a trajectory: arrows on visited cells, `G` on the goal.
    pub fn render_path(&self, path: &[(Cell, GridAction)]) -> String {
        let mut grid = vec![vec![".".to_string(); COLS]; ROWS];
        for ((r, c), action) in path {
            if self.contains((*r, *c)) {
                grid[*r][*c] = action.to_string();
            }
        }
        grid[self.goal.0][self.goal.1] = "G".to_string();

        let mut out = String::new();
        for row in grid {
            out.push_str(&row.join(" "));
            out.push('\n');
        }
        out
    }
}

impl Environment for WindyGridworld {
    type State = Cell;
    type Action = GridAction;

    fn state_space(&self) -> Vec<Cell> {
        (0..ROWS)
            .flat_map(|r| (0..COLS).map(move |c| (r, c)))
            .filter(|&cell| cell != self.goal)
            .collect()
    }

    fn terminal_states(&self) -> Vec<Cell> {
        vec![self.goal]
    }

    fn actions(&self, state: &Cell) -> Result<Vec<GridAction>> {
        if !self.contains(*state) {
            return Err(GpiError::OutOfRange(format!("cell {:?}", state)));
        }
        if *state == self.goal {
            return Ok(Vec::new());
        }
        Ok(GridAction::ALL
            .iter()
            .filter(|a| self.walk(*state, a).is_some())
            .copied()
            .collect())
    }

    fn is_terminal(&self, state: &Cell) -> bool {
        *state == self.goal
    }

    fn reset(&mut self) -> Result<Cell> {
        Ok(self.start)
    }

    fn step(&mut self, state: &Cell, action: &GridAction) -> Result<(Cell, Reward)> {
        self.simulate(state, action)
    }

    fn dynamics(&self, state: &Cell, action: &GridAction) -> Result<Vec<Transition<Cell>>> {
        let (next, reward) = self.simulate(state, action)?;
        Ok(vec![Transition::new(next, reward, 1.0)])
    }

    fn simulate(&self, state: &Cell, action: &GridAction) -> Result<(Cell, Reward)> {
        let (row, col) = self
            .walk(*state, action)
            .filter(|_| self.contains(*state))
            .ok_or_else(|| GpiError::OutOfRange(format!("{:?} from {:?}", action, state)))?;

        let pushed = row.saturating_sub(self.wind[state.1]);
        let next = (pushed, col);
        let reward = if next == self.goal {
            GOAL_REWARD
        } else {
            STEP_REWARD
        };
        Ok((next, reward))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_stay_on_grid() {
        let env = WindyGridworld::new();
        assert_eq!(env.actions(&(0, 0)).unwrap(), vec![GridAction::Down, GridAction::Right]);
        assert_eq!(env.actions(&(3, 3)).unwrap().len(), 4);
        assert_eq!(
            env.actions(&(6, 9)).unwrap(),
            vec![GridAction::Up, GridAction::Left]
        );
        assert!(env.actions(&env.goal()).unwrap().is_empty());
        assert!(matches!(env.actions(&(7, 0)), Err(GpiError::OutOfRange(_))));
    }

    #[test]
    fn test_wind_uses_departure_column() {
        let mut env = WindyGridworld::new();

        // Column 2 is calm, moving right into the windy column 3 is not pushed.
        assert_eq!(env.step(&(3, 2), &GridAction::Right).unwrap(), ((3, 3), -1.0));
        // Leaving column 3 pushes one row up.
        assert_eq!(env.step(&(3, 3), &GridAction::Right).unwrap(), ((2, 4), -1.0));
        // Strong wind is clamped at the top row.
        assert_eq!(env.step(&(1, 6), &GridAction::Up).unwrap(), ((0, 6), -1.0));
        // Entering the goal is free.
        assert_eq!(env.step(&(4, 7), &GridAction::Left).unwrap().0, (2, 6));
        assert_eq!(env.step(&(4, 8), &GridAction::Left).unwrap(), ((3, 7), 0.0));
    }

    #[test]
    fn test_state_space_and_dynamics() {
        let env = WindyGridworld::new();
        assert_eq!(env.state_space().len(), 69);
        assert_eq!(env.terminal_states(), vec![(3, 7)]);

        let transitions = env.dynamics(&(3, 0), &GridAction::Right).unwrap();
        assert_eq!(transitions, vec![Transition::new((3, 1), -1.0, 1.0)]);
        assert!(env.simulate(&(0, 0), &GridAction::Up).is_err());
    }

    #[test]
    fn test_known_optimal_path() {
        // The textbook path: right along row 3, then down the east side.
        let mut env = WindyGridworld::new();
        let mut state = env.reset().unwrap();
        let moves = [GridAction::Right; 9]
            .into_iter()
            .chain([GridAction::Down; 4])
            .chain([GridAction::Left; 2]);

        let mut steps = 0;
        for action in moves {
            state = env.step(&state, &action).unwrap().0;
            steps += 1;
        }
        assert_eq!(state, env.goal());
        assert_eq!(steps, 15);
    }

    #[test]
    fn test_custom_wind() {
        assert!(WindyGridworld::with_wind(vec![0; 3]).is_err());
        let mut calm = WindyGridworld::with_wind(vec![0; 10]).unwrap();
        assert_eq!(calm.step(&(3, 6), &GridAction::Right).unwrap(), ((3, 7), 0.0));
    }

    #[test]
    fn test_render() {
        let env = WindyGridworld::new();
        let mut policy = FxHashMap::default();
        policy.insert((0, 0), GridAction::Right);
        let text = env.render_policy(&policy);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("→ ?"));
        assert_eq!(lines[3].split(' ').nth(7), Some("G"));

        let path = env.render_path(&[((3, 0), GridAction::Right)]);
        assert!(path.lines().nth(3).unwrap().starts_with("→ ."));
    }
}
