//! Domain types and the ports the application layer talks through.

pub mod availability;
pub mod booking;
pub mod money;
pub mod payment;
pub mod ports;
pub mod presence;
pub mod referral;
