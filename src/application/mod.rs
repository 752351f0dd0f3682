//! Application services orchestrating the domain rules over the ports.
//!
//! `BookingService` owns capacity and facility checks, `PaymentReconciler`
//! turns STK push outcomes into bookings, `ReferralService` awards
//! commissions and `PresenceTracker` keeps live viewer counts.

pub mod booking;
pub mod payment;
pub mod presence;
pub mod referral;
