pub mod capture;
pub mod page;
pub mod registry;
pub mod replay;
pub mod utils;

pub use capture::*;
pub use page::*;
pub use registry::*;
pub use replay::*;
pub use utils::ExportOrder;
