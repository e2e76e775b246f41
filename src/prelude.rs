pub use crate::config::Config;
pub use crate::result::{AppError, GameError, Result};
