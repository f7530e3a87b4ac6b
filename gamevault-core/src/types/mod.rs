pub mod game;
pub mod ids;

pub use game::{GameEntity, GameMetadata, GameUpdate, NewGame, ProviderKind};
pub use ids::GameId;
