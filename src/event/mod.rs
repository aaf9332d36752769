pub mod capture_result;
pub mod mutation;

pub use capture_result::*;
pub use mutation::*;
