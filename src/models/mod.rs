pub mod calendar;
pub mod preferences;
pub mod session;
