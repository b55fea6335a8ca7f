//! Retry/circuit-breaker, robots.txt, and anti-bot gates.

pub mod antibot;
pub mod retry;
pub mod robots;

pub use antibot::{AntiBotConfig, AntiBotGate};
pub use retry::{CircuitState, DomainRetryInfo, RetryCoordinator, RetryCoordinatorConfig};
pub use robots::{RobotsFetchOutcome, RobotsFetcher, RobotsGate, RobotsGateConfig};
