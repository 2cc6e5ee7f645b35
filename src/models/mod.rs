pub mod cluster;
pub mod event;
pub mod ordered;
pub mod subscription;

pub use cluster::*;
pub use event::*;
pub use ordered::OrderedMap;
pub use subscription::*;
