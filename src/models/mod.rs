pub mod cloudflare;
pub mod credentials;
pub mod endpoint;

pub use cloudflare::*;
pub use credentials::*;
pub use endpoint::*;
