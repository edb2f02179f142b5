pub mod presenter;
pub mod socket;
