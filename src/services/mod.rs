pub mod analysis;
pub mod redirect;
pub mod session;
