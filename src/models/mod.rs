pub mod base;
pub mod response;

pub use base::{BaseEntity, Entity};
pub use response::{RestResponse, ResultCode};
