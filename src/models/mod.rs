mod category;
mod claim;
mod order;
mod product;
mod report;
mod user;

pub use category::*;
pub use claim::*;
pub use order::*;
pub use product::*;
pub use report::*;
pub use user::*;
