//! Operator View Model
//!
//! Presentation-layer cursor: which chat message shows an operator's
//! pending list and which page of it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorView {
    pub chat_id: i64,
    pub message_id: i64,
    #[serde(default)]
    pub page: u32,
}
