pub mod message;
pub mod user;

pub use message::{InteractionRecord, MessageRecord};
pub use user::UserRecord;
