//! Tag game played against an external game server.
//!
//! The agent is one runner in a game of tag simulated by a separate process.
//! Each step sends a velocity command and receives the next observation over a
//! [`Connector`]; the episode ends when the agent is tagged.
//!
//! ## Protocol
//!
//! One JSON document per line in each direction:
//!
//! ```text
//! -> RESET
//! <- {"mp":[120,80],"mv":[0,1],"tp":[300,40],"tv":[-1,0],"t":false}
//! -> {"x":1,"y":-1}
//! <- {"mp":[121,79],"mv":[1,-1],"tp":[298,41],"tv":[-1,1],"t":false}
//! ```
//!
//! `mp`/`mv` are the agent's position and velocity, `tp`/`tv` the tagger's,
//! `t` whether the agent has been tagged.
//!
//! ## State
//!
//! Observations are discretized for tabular learning: both velocities are
//! reduced to their direction (each component −1, 0 or 1) and the distance to
//! the tagger to one of [`DISTANCE_BUCKETS`] bands. Every tagged observation
//! maps to the single terminal state [`TagState::TAGGED`].
//!
//! Reward: +1 for every step survived, −1 for being tagged.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::{Environment, Reward};

/// Default server address.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default server port.
pub const DEFAULT_PORT: u16 = 12345;

/// Message asking the server to start a new round.
pub const RESET_MESSAGE: &str = "RESET";

/// Number of distance bands.
pub const DISTANCE_BUCKETS: u8 = 3;

/// Largest velocity component an action may request.
const MAX_VELOCITY: i8 = 1;

const SURVIVE_REWARD: Reward = 1.0;
const TAGGED_REWARD: Reward = -1.0;

/// Transport to the game server.
pub trait Connector {
    /// Open the connection.
    fn connect(&mut self) -> Result<()>;

    /// Close the connection. Closing twice is not an error.
    fn disconnect(&mut self) -> Result<()>;

    /// Send one message.
    fn send(&mut self, message: &str) -> Result<()>;

    /// Block until the next message arrives.
    fn receive(&mut self) -> Result<String>;
}

/// Line-delimited TCP transport.
#[derive(Debug)]
pub struct TcpConnector {
    host: String,
    port: u16,
    writer: Option<TcpStream>,
    reader: Option<BufReader<TcpStream>>,
}

impl TcpConnector {
    /// Connector for `host:port`; nothing is opened until [`Connector::connect`].
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            writer: None,
            reader: None,
        }
    }

    /// Server address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Connector for TcpConnector {
    fn connect(&mut self) -> Result<()> {
        let address = self.address();
        let stream = TcpStream::connect(&address)?;
        stream.set_nodelay(true)?;
        self.reader = Some(BufReader::new(stream.try_clone()?));
        self.writer = Some(stream);
        info!(address = %address, "connected to game server");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.reader = None;
        if let Some(stream) = self.writer.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                // The server hung up first.
                Err(e) if e.kind() == ErrorKind::NotConnected => {}
                Err(e) => return Err(e.into()),
            }
            info!(address = %self.address(), "disconnected from game server");
        }
        Ok(())
    }

    fn send(&mut self, message: &str) -> Result<()> {
        let stream = self
            .writer
            .as_mut()
            .ok_or_else(|| GpiError::Connector("not connected".into()))?;
        stream.write_all(message.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<String> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| GpiError::Connector("not connected".into()))?;
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(GpiError::Connector("server closed the connection".into()));
        }
        Ok(line.trim_end().to_string())
    }
}

/// Discretized view of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagState {
    /// Direction of the tagger's velocity.
    pub tagger_velocity: (i8, i8),
    /// Direction of the agent's velocity.
    pub my_velocity: (i8, i8),
    /// Distance band, 0 is closest.
    pub distance: u8,
    /// The agent has been tagged.
    pub tagged: bool,
}

impl TagState {
    /// Terminal state shared by every tagged observation.
    pub const TAGGED: TagState = TagState {
        tagger_velocity: (0, 0),
        my_velocity: (0, 0),
        distance: 0,
        tagged: true,
    };

    fn in_range(&self) -> bool {
        let ok = |(x, y): (i8, i8)| x.abs() <= MAX_VELOCITY && y.abs() <= MAX_VELOCITY;
        ok(self.tagger_velocity) && ok(self.my_velocity) && self.distance < DISTANCE_BUCKETS
    }
}

/// Velocity command sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Velocity {
    /// Horizontal component.
    pub x: i8,
    /// Vertical component.
    pub y: i8,
}

/// Raw observation as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Agent position.
    #[serde(rename = "mp")]
    pub my_position: [f64; 2],
    /// Agent velocity.
    #[serde(rename = "mv")]
    pub my_velocity: [f64; 2],
    /// Tagger position.
    #[serde(rename = "tp")]
    pub tagger_position: [f64; 2],
    /// Tagger velocity.
    #[serde(rename = "tv")]
    pub tagger_velocity: [f64; 2],
    /// The agent has been tagged.
    #[serde(rename = "t")]
    pub tagged: bool,
}

fn direction(component: f64) -> i8 {
    if component > 0.5 {
        1
    } else if component < -0.5 {
        -1
    } else {
        0
    }
}

/// Tag game environment over an owned connection.
pub struct TagGame {
    connector: Box<dyn Connector>,
    distance_unit: f64,
    actions: Vec<Velocity>,
    last_observation: Option<Observation>,
}

impl TagGame {
    /// Game over `connector`. The connection is not opened yet.
    pub fn new(connector: Box<dyn Connector>) -> Self {
        let mut actions = Vec::new();
        for x in -MAX_VELOCITY..=MAX_VELOCITY {
            for y in -MAX_VELOCITY..=MAX_VELOCITY {
                if x != 0 || y != 0 {
                    actions.push(Velocity { x, y });
                }
            }
        }
        Self {
            connector,
            distance_unit: 100.0,
            actions,
            last_observation: None,
        }
    }

    /// Set the width in pixels of one distance band.
    ///
    /// # Errors
    /// [`GpiError::InvalidArgument`] unless the width is positive.
    pub fn with_distance_unit(mut self, unit: f64) -> Result<Self> {
        if unit.is_nan() || unit <= 0.0 {
            return Err(GpiError::InvalidArgument(format!(
                "distance unit must be positive, got {}",
                unit
            )));
        }
        self.distance_unit = unit;
        Ok(self)
    }

    /// Open the connection to the server.
    pub fn connect(&mut self) -> Result<()> {
        self.connector.connect()
    }

    /// Close the connection to the server.
    pub fn disconnect(&mut self) -> Result<()> {
        self.connector.disconnect()
    }

    /// Most recent raw observation.
    pub fn last_observation(&self) -> Option<&Observation> {
        self.last_observation.as_ref()
    }

    /// Discretize a raw observation.
    pub fn discretize(&self, observation: &Observation) -> TagState {
        if observation.tagged {
            return TagState::TAGGED;
        }
        let dx = observation.my_position[0] - observation.tagger_position[0];
        let dy = observation.my_position[1] - observation.tagger_position[1];
        let band = (dx.hypot(dy) / self.distance_unit).floor();
        let distance = if band >= f64::from(DISTANCE_BUCKETS - 1) {
            DISTANCE_BUCKETS - 1
        } else {
            band as u8
        };

        TagState {
            tagger_velocity: (
                direction(observation.tagger_velocity[0]),
                direction(observation.tagger_velocity[1]),
            ),
            my_velocity: (
                direction(observation.my_velocity[0]),
                direction(observation.my_velocity[1]),
            ),
            distance,
            tagged: false,
        }
    }

    fn observe(&mut self) -> Result<TagState> {
        let message = self.connector.receive()?;
        let observation: Observation = serde_json::from_str(&message)?;
        debug!(?observation, "received observation");
        let state = self.discretize(&observation);
        self.last_observation = Some(observation);
        Ok(state)
    }
}

impl Drop for TagGame {
    fn drop(&mut self) {
        if let Err(err) = self.connector.disconnect() {
            warn!(error = %err, "failed to close game connection");
        }
    }
}

impl Environment for TagGame {
    type State = TagState;
    type Action = Velocity;

    fn state_space(&self) -> Vec<TagState> {
        let directions: Vec<(i8, i8)> = (-MAX_VELOCITY..=MAX_VELOCITY)
            .flat_map(|x| (-MAX_VELOCITY..=MAX_VELOCITY).map(move |y| (x, y)))
            .collect();

        let mut states = Vec::new();
        for &tagger_velocity in &directions {
            for &my_velocity in &directions {
                for distance in 0..DISTANCE_BUCKETS {
                    states.push(TagState {
                        tagger_velocity,
                        my_velocity,
                        distance,
                        tagged: false,
                    });
                }
            }
        }
        states
    }

    fn terminal_states(&self) -> Vec<TagState> {
        vec![TagState::TAGGED]
    }

    fn actions(&self, state: &TagState) -> Result<Vec<Velocity>> {
        if self.is_terminal(state) {
            return Ok(Vec::new());
        }
        if !state.in_range() {
            return Err(GpiError::OutOfRange(format!("tag state {:?}", state)));
        }
        Ok(self.actions.clone())
    }

    fn is_terminal(&self, state: &TagState) -> bool {
        state.tagged
    }

    fn reset(&mut self) -> Result<TagState> {
        self.connector.send(RESET_MESSAGE)?;
        self.observe()
    }

    fn step(&mut self, state: &TagState, action: &Velocity) -> Result<(TagState, Reward)> {
        if self.actions(state)?.is_empty() {
            return Err(GpiError::NoActions(format!("{:?}", state)));
        }
        self.connector.send(&serde_json::to_string(action)?)?;
        let next = self.observe()?;
        let reward = if next.tagged {
            TAGGED_REWARD
        } else {
            SURVIVE_REWARD
        };
        Ok((next, reward))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpi::config::{Algorithm, SolverConfig};
    use crate::gpi::policy::EpsilonGreedyPolicy;
    use crate::gpi::solver::GpiSolver;
    use crate::gpi::strategy::ValueStrategy;
    use std::cell::RefCell;
    use std::net::TcpListener;
    use std::rc::Rc;
    use std::thread;

    /// Replays canned server replies in a loop and records what it was sent.
    struct ScriptedConnector {
        replies: Vec<String>,
        next: usize,
        sent: Rc<RefCell<Vec<String>>>,
        connected: bool,
    }

    impl ScriptedConnector {
        fn new(replies: &[&str]) -> (Self, Rc<RefCell<Vec<String>>>) {
            let sent = Rc::new(RefCell::new(Vec::new()));
            let connector = Self {
                replies: replies.iter().map(|r| r.to_string()).collect(),
                next: 0,
                sent: Rc::clone(&sent),
                connected: false,
            };
            (connector, sent)
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&mut self) -> Result<()> {
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) -> Result<()> {
            self.connected = false;
            Ok(())
        }

        fn send(&mut self, message: &str) -> Result<()> {
            self.sent.borrow_mut().push(message.to_string());
            Ok(())
        }

        fn receive(&mut self) -> Result<String> {
            if self.replies.is_empty() {
                return Err(GpiError::Connector("script exhausted".into()));
            }
            let reply = self.replies[self.next % self.replies.len()].clone();
            self.next += 1;
            Ok(reply)
        }
    }

    const START: &str = r#"{"mp":[100,100],"mv":[0,0],"tp":[350,100],"tv":[-2,0],"t":false}"#;
    const CLOSE: &str = r#"{"mp":[110,100],"mv":[1,0],"tp":[150,100],"tv":[-3,0.2],"t":false}"#;
    const TAGGED: &str = r#"{"mp":[112,100],"mv":[1,0],"tp":[112,100],"tv":[-1,0],"t":true}"#;

    #[test]
    fn test_reset_and_step_follow_protocol() {
        let (connector, sent) = ScriptedConnector::new(&[START, CLOSE]);
        let mut game = TagGame::new(Box::new(connector));
        game.connect().unwrap();

        let state = game.reset().unwrap();
        assert_eq!(
            state,
            TagState {
                tagger_velocity: (-1, 0),
                my_velocity: (0, 0),
                distance: 2,
                tagged: false,
            }
        );

        let (next, reward) = game.step(&state, &Velocity { x: 1, y: -1 }).unwrap();
        assert_eq!(reward, SURVIVE_REWARD);
        assert_eq!(next.distance, 0);
        assert_eq!(next.my_velocity, (1, 0));
        assert_eq!(game.last_observation().unwrap().tagger_position, [150.0, 100.0]);

        assert_eq!(
            *sent.borrow(),
            vec![RESET_MESSAGE.to_string(), r#"{"x":1,"y":-1}"#.to_string()]
        );
    }

    #[test]
    fn test_tagged_is_terminal() {
        let (connector, _) = ScriptedConnector::new(&[TAGGED]);
        let mut game = TagGame::new(Box::new(connector));
        let state = TagState::TAGGED;
        assert!(game.actions(&state).unwrap().is_empty());

        let start = game.state_space()[0];
        let (next, reward) = game.step(&start, &Velocity { x: 0, y: 1 }).unwrap();
        assert_eq!(next, TagState::TAGGED);
        assert_eq!(reward, TAGGED_REWARD);
        assert!(matches!(
            game.step(&next, &Velocity { x: 0, y: 1 }),
            Err(GpiError::NoActions(_))
        ));
    }

    #[test]
    fn test_state_and_action_spaces() {
        let (connector, _) = ScriptedConnector::new(&[]);
        let game = TagGame::new(Box::new(connector));
        assert_eq!(game.state_space().len(), 9 * 9 * DISTANCE_BUCKETS as usize);

        let actions = game.actions(&game.state_space()[0]).unwrap();
        assert_eq!(actions.len(), 8);
        assert!(!actions.contains(&Velocity { x: 0, y: 0 }));

        let bad = TagState {
            distance: DISTANCE_BUCKETS,
            ..game.state_space()[0]
        };
        assert!(matches!(game.actions(&bad), Err(GpiError::OutOfRange(_))));
        assert!(TagGame::new(Box::new(ScriptedConnector::new(&[]).0))
            .with_distance_unit(0.0)
            .is_err());
    }

    #[test]
    fn test_protocol_errors() {
        let (connector, _) = ScriptedConnector::new(&["not json"]);
        let mut game = TagGame::new(Box::new(connector));
        assert!(matches!(game.reset(), Err(GpiError::Json(_))));

        let (connector, _) = ScriptedConnector::new(&[]);
        let mut game = TagGame::new(Box::new(connector));
        assert!(matches!(game.reset(), Err(GpiError::Connector(_))));

        let mut offline = TcpConnector::default();
        assert!(!offline.is_connected());
        assert!(matches!(offline.send("x"), Err(GpiError::Connector(_))));
        assert!(offline.disconnect().is_ok());
    }

    #[test]
    fn test_td_control_over_scripted_rounds() {
        // Each round: reset, survive two steps, get tagged on the third.
        let (connector, sent) = ScriptedConnector::new(&[START, CLOSE, CLOSE, TAGGED]);
        let mut env = TagGame::new(Box::new(connector));
        let mut policy = EpsilonGreedyPolicy::new(0.1, Some(4)).unwrap();
        let mut values = ValueStrategy::tabular();
        values.initialize(&env).unwrap();

        let config = SolverConfig::default()
            .with_algorithm(Algorithm::TdControl)
            .with_discount(1.0)
            .with_episodes(5);
        let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config).unwrap();
        let stats = solver.train().unwrap();

        assert_eq!(stats.episodes, 5);
        assert_eq!(stats.total_steps, 15);
        assert_eq!(stats.last_return, 1.0);
        let sent = sent.borrow();
        assert_eq!(sent.len(), 20);
        assert_eq!(sent.iter().filter(|m| *m == RESET_MESSAGE).count(), 5);
    }

    #[test]
    fn test_tcp_connector_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line.trim_end(), RESET_MESSAGE);
            writer.write_all(START.as_bytes()).unwrap();
            writer.write_all(b"\n").unwrap();
        });

        let mut game = TagGame::new(Box::new(TcpConnector::new("127.0.0.1", port)));
        game.connect().unwrap();
        let state = game.reset().unwrap();
        assert_eq!(state.distance, 2);
        game.disconnect().unwrap();
        server.join().unwrap();
    }
}
