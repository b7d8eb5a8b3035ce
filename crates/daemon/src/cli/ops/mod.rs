pub mod mirror;
pub mod publish;
pub mod version;

pub use mirror::Mirror;
pub use publish::Publish;
pub use version::Version;
