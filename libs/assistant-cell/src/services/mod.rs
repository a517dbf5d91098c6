pub mod recommendation;
pub mod session;

pub use recommendation::{HttpRecommendationClient, RecommendationClient};
pub use session::AssistantService;
