mod descriptor;
mod digest;
mod error;
mod reference;

pub use descriptor::{Descriptor, Platform};
pub use digest::Digest;
pub use error::Error;
pub use reference::Reference;
