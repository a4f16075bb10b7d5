//! Blackjack (Sutton & Barto, example 5.1).
//!
//! ## Rules
//!
//! - Infinite deck: ace = 1 or 11, face cards = 10
//! - The player is dealt cards until their sum is at least 12
//! - The player hits or sticks; going over 21 loses immediately
//! - On stick, the dealer draws until reaching 17 or more
//! - Reward +1 win, −1 loss, 0 draw; no intermediate rewards
//!
//! ## State
//!
//! `(player sum 12-21, dealer's showing card 1-10, usable ace)`. All finished
//! hands share the terminal state `(0, 0, false)`.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::{Environment, Reward};
use crate::gpi::policy::DeterministicPolicy;

/// (player sum, dealer showing card, player holds a usable ace)
pub type BlackjackState = (u8, u8, bool);

/// Shared state of every finished hand.
pub const TERMINAL: BlackjackState = (0, 0, false);

const MIN_PLAYER_SUM: u8 = 12;
const MAX_SUM: u8 = 21;
const DEALER_STICKS_ON: u8 = 17;
const ACE: u8 = 1;
const FACE_CARD: u8 = 10;

const WIN_REWARD: Reward = 1.0;
const LOSS_REWARD: Reward = -1.0;
const DRAW_REWARD: Reward = 0.0;

/// Player decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Play {
    /// Stop drawing and let the dealer play
    Stick,
    /// Draw another card
    Hit,
}

impl fmt::Display for Play {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Play::Stick => write!(f, "S"),
            Play::Hit => write!(f, "H"),
        }
    }
}

/// Add `card` to a hand, counting an ace as 11 while that does not bust.
fn add_card(sum: u8, usable_ace: bool, card: u8) -> (u8, bool) {
    let (mut sum, mut usable_ace) = if card == ACE && sum + 11 <= MAX_SUM {
        (sum + 11, true)
    } else {
        (sum + card, usable_ace)
    };
    if sum > MAX_SUM && usable_ace {
        sum -= 10;
        usable_ace = false;
    }
    (sum, usable_ace)
}

/// Blackjack against a fixed dealer, infinite deck.
#[derive(Debug, Clone)]
pub struct Blackjack {
    rng: StdRng,
    dealer_sum: u8,
    dealer_usable_ace: bool,
}

impl Blackjack {
    /// Create a table; `seed` fixes the card sequence.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            dealer_sum: 0,
            dealer_usable_ace: false,
        }
    }

    fn draw_card(&mut self) -> u8 {
        self.rng.gen_range(1..=13u8).min(FACE_CARD)
    }

    fn check_state(&self, state: &BlackjackState) -> Result<()> {
        let (sum, dealer, _) = *state;
        if *state == TERMINAL {
            return Ok(());
        }
        if !(MIN_PLAYER_SUM..=MAX_SUM).contains(&sum) || !(ACE..=FACE_CARD).contains(&dealer) {
            return Err(GpiError::OutOfRange(format!("blackjack state {:?}", state)));
        }
        Ok(())
    }

    fn dealer_plays(&mut self) -> u8 {
        while self.dealer_sum < DEALER_STICKS_ON {
            let card = self.draw_card();
            let (sum, usable) = add_card(self.dealer_sum, self.dealer_usable_ace, card);
            self.dealer_sum = sum;
            self.dealer_usable_ace = usable;
        }
        self.dealer_sum
    }

    /// Hit below `threshold`, stick from it on.
    pub fn threshold_policy(&self, threshold: u8) -> DeterministicPolicy<BlackjackState, Play> {
        let mut policy = DeterministicPolicy::new();
        for state in self.state_space() {
            let play = if state.0 < threshold { Play::Hit } else { Play::Stick };
            policy.set(state, play);
        }
        policy
    }

    /// Draw a policy as a table of `H`/`S`, player sum descending, dealer card
    /// across.
    pub fn render_policy(
        &self,
        policy: &DeterministicPolicy<BlackjackState, Play>,
        usable_ace: bool,
    ) -> String {
        let mut out = String::from("     A 2 3 4 5 6 7 8 9 10\n");
        for sum in (MIN_PLAYER_SUM..=MAX_SUM).rev() {
            out.push_str(&format!("{:>3}  ", sum));
            let row: Vec<String> = (ACE..=FACE_CARD)
                .map(|dealer| {
                    policy
                        .get(&(sum, dealer, usable_ace))
                        .map_or("?".to_string(), |p| p.to_string())
                })
                .collect();
            out.push_str(&row.join(" "));
            out.push('\n');
        }
        out
    }
}

impl Environment for Blackjack {
    type State = BlackjackState;
    type Action = Play;

    fn state_space(&self) -> Vec<BlackjackState> {
        let mut states = Vec::with_capacity(200);
        for sum in MIN_PLAYER_SUM..=MAX_SUM {
            for dealer in ACE..=FACE_CARD {
                for usable_ace in [false, true] {
                    states.push((sum, dealer, usable_ace));
                }
            }
        }
        states
    }

    fn terminal_states(&self) -> Vec<BlackjackState> {
        vec![TERMINAL]
    }

    fn actions(&self, state: &BlackjackState) -> Result<Vec<Play>> {
        self.check_state(state)?;
        if self.is_terminal(state) {
            return Ok(Vec::new());
        }
        Ok(vec![Play::Stick, Play::Hit])
    }

    fn is_terminal(&self, state: &BlackjackState) -> bool {
        *state == TERMINAL
    }

    fn reset(&mut self) -> Result<BlackjackState> {
        let (mut sum, mut usable_ace) = (0, false);
        while sum < MIN_PLAYER_SUM {
            let card = self.draw_card();
            (sum, usable_ace) = add_card(sum, usable_ace, card);
        }

        let showing = self.draw_card();
        let hidden = self.draw_card();
        let (dealer_sum, dealer_usable_ace) = add_card(0, false, showing);
        (self.dealer_sum, self.dealer_usable_ace) =
            add_card(dealer_sum, dealer_usable_ace, hidden);

        Ok((sum, showing, usable_ace))
    }

    fn step(&mut self, state: &BlackjackState, action: &Play) -> Result<(BlackjackState, Reward)> {
        if self.actions(state)?.is_empty() {
            return Err(GpiError::NoActions(format!("{:?}", state)));
        }
        let (sum, dealer, usable_ace) = *state;

        match action {
            Play::Hit => {
                let card = self.draw_card();
                let (sum, usable_ace) = add_card(sum, usable_ace, card);
                if sum > MAX_SUM {
                    Ok((TERMINAL, LOSS_REWARD))
                } else {
                    Ok(((sum, dealer, usable_ace), 0.0))
                }
            }
            Play::Stick => {
                let dealer_sum = self.dealer_plays();
                let reward = if dealer_sum > MAX_SUM || sum > dealer_sum {
                    WIN_REWARD
                } else if sum == dealer_sum {
                    DRAW_REWARD
                } else {
                    LOSS_REWARD
                };
                Ok((TERMINAL, reward))
            }
        }
    }
}
