use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of both send and edit requests.
#[derive(Debug, Default, Deserialize)]
pub struct MessageContent {
    pub text: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedMessage {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SeenResponse {
    pub success: bool,
    pub count: u64,
}
