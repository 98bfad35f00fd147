//! Apple Notification Center Service wire format.

pub mod builders;
pub mod constants;
pub mod parsers;
