pub mod email_service;
pub mod otp_service;
pub mod voucher_service;
