pub mod health;
pub mod incident;
pub mod origin;
pub mod query;
pub mod ratelimit;
pub mod upload;
pub mod validation;

pub use health::*;
pub use incident::*;
pub use origin::*;
pub use query::*;
pub use ratelimit::*;
pub use upload::*;
pub use validation::*;
