use corelib::config::ConfigError;
use market::MarketError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EngineError {
    #[error("{follower}: no weight state for leader {leader}")]
    UnknownLeader { follower: String, leader: String },

    #[error("{leader} -> {follower}: not enough paired history to calibrate")]
    InsufficientHistory { leader: String, follower: String },

    #[error("group {group}: instrument {instrument} not registered")]
    MissingInstrument { group: String, instrument: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Market(#[from] MarketError),
}
