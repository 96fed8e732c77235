mod dispatch_list;
mod driver;
mod export;

pub use dispatch_list::*;
pub use driver::*;
pub use export::*;
