//! インメモリのリポジトリ実装

pub mod room;

pub use room::InMemoryRoomRegistry;
