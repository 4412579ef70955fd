use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    #[default]
    Flat,
}

/// Tick-to-tick price direction with the length of the current run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceMovement {
    /// None until the first price is observed
    pub last_price: Option<f64>,
    pub direction: Direction,
    pub streak: u32,
}

impl PriceMovement {
    /// Feed the next price; returns the percentage change and the new state.
    ///
    /// A reversal restarts the streak at 1, a continuation extends it and an
    /// unchanged price resets to `Flat` with a zero streak.
    pub fn transition(&self, price: f64) -> (f64, PriceMovement) {
        let pct_change = match self.last_price {
            Some(last) if last != 0.0 => (price - last) / last * 100.0,
            _ => 0.0,
        };

        let direction = if pct_change > 0.0 {
            Direction::Up
        } else if pct_change < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        };

        let streak = match direction {
            Direction::Flat => 0,
            d if d == self.direction => self.streak.saturating_add(1),
            _ => 1,
        };

        (
            pct_change,
            PriceMovement {
                last_price: Some(price),
                direction,
                streak,
            },
        )
    }

    /// Streak with the sign of the direction (up positive)
    pub fn signed_streak(&self) -> i64 {
        match self.direction {
            Direction::Up => self.streak as i64,
            Direction::Down => -(self.streak as i64),
            Direction::Flat => 0,
        }
    }
}
