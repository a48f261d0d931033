pub mod error;
pub mod policy;
pub mod traits;
pub mod types;

pub use error::*;
pub use policy::*;
pub use traits::*;
pub use types::*;
