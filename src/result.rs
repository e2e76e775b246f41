use std::fmt::Display;

use thiserror::Error;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T = (), E = AppError> = anyhow::Result<T, E>;

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl AppError {
    pub fn game_error(&self) -> Option<&GameError> {
        return self.0.downcast_ref::<GameError>();
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Lobby not found")]
    LobbyNotFound,

    #[error("Game already started")]
    GameAlreadyStarted,

    #[error("Lobby is full")]
    LobbyFull,

    #[error("Join code already in use")]
    DuplicateJoinCode,

    #[error("Could not generate a unique join code")]
    CodeGenerationExhausted,

    #[error("Only the host may do that")]
    NotHost,

    #[error("Game is not in the right phase for that")]
    WrongPhase,

    #[error("Stats service is unavailable")]
    StatsUnavailable,
}
