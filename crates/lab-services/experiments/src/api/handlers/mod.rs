pub mod datasets;
pub mod experiments;
pub mod health;
pub mod ml;
pub mod models;

pub use datasets::*;
pub use experiments::*;
pub use health::health_check;
pub use ml::*;
pub use models::*;
