use std::sync::Arc;

use mongodb::Database;

use crate::config::AppConfig;
use crate::services::email_service::EmailService;
use crate::services::otp_service::OtpService;
use crate::services::voucher_service::VoucherService;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub otp_service: OtpService,
    pub voucher_service: VoucherService,
    pub email_service: Arc<EmailService>,
    pub jwt_secret: String,
}

impl AppState {
    /// Services get their handles from an explicit config object; there
    /// are no process-wide singletons to reach for.
    pub fn new(db: Database, config: &AppConfig) -> Self {
        AppState {
            otp_service: OtpService::new(db.clone()),
            voucher_service: VoucherService::new(db.clone()),
            email_service: Arc::new(EmailService::new(config)),
            jwt_secret: config.jwt_secret.clone(),
            db,
        }
    }
}
