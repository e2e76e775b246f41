mod game_config;
pub use game_config::*;

mod lobby;
pub use lobby::*;

mod player;
pub use player::*;
