pub(crate) mod auth;
pub(crate) mod auth_otp;
pub(crate) mod orders;
pub(crate) mod vouchers;
