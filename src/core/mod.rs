// Domain-layer modules and shared errors/models
pub mod scraper {
    pub use crate::scraper_service::*;
}

pub mod merge {
    pub use crate::merge::*;
}

pub mod extractor {
    pub use crate::extractor::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
