pub mod errors;
pub mod protocol;
pub mod tokens;

pub use errors::*;
pub use protocol::*;
pub use tokens::*;
