//! External service integrations.

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod crawler {
    pub use crate::crawler::*;
}
