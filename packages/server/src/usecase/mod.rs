//! UseCase 層
//!
//! ブロードキャストのビジネスロジック。Domain 層の trait にだけ依存し、
//! 具体的な実装は起動時に注入される。

pub mod broadcaster;
pub mod error;
pub mod history;
mod join_room;
mod leave_room;
pub mod reaper;
mod send_message;

pub use broadcaster::Broadcaster;
pub use error::{JoinError, SendError};
pub use history::HistoryStore;
pub use reaper::{Reaper, ReaperHandle};
