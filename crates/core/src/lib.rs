pub mod error;
pub mod filter;
pub mod local;
pub mod models;
pub mod traits;

pub use error::*;
pub use filter::*;
pub use local::*;
pub use models::*;
pub use traits::*;
