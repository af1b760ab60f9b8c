mod attribute;
mod types;
pub mod vendor;

pub use attribute::Attribute;
pub use types::AttributeType;
pub use vendor::{VendorAttribute, VendorId};
