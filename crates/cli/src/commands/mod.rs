pub mod analyze;
pub mod config;
pub mod resolve;
pub mod results;
pub mod sandbox;

pub use analyze::*;
pub use config::*;
pub use resolve::*;
pub use results::*;
pub use sandbox::*;
