#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod broadcaster;
pub mod events;
pub mod monitor;
pub mod payments;
pub mod wallet;
