pub mod admin;
pub mod health;
pub mod params;
pub mod postback;
pub mod response;
pub mod track;

pub use admin::admin_scope;
pub use health::{AppStartTime, HealthService, health_routes};
pub use postback::postback_routes;
pub use response::{ApiResponse, ErrorCode};
pub use track::track_routes;
