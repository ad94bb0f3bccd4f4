pub mod order;
pub mod otp;
pub mod user;
pub mod voucher;
