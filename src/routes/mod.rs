pub(crate) mod auth;
pub(crate) mod auth_otp_routes;
pub(crate) mod order_routes;
pub(crate) mod voucher_routes;
