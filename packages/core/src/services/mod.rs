//! Clients for the hosted services the back office talks to.

pub mod ayrshare;
pub mod brevo;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod sanity;

pub use ayrshare::AyrshareClient;
pub use brevo::BrevoClient;
pub use sanity::SanityClient;
