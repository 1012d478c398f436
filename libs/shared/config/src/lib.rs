use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base_url: String,
    pub qr_webhook_secret: String,
    pub qr_bank_id: String,
    pub qr_account_number: String,
    pub qr_account_name: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .unwrap_or_else(|_| {
                    warn!("STRIPE_SECRET_KEY not set, using empty value");
                    String::new()
                }),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .unwrap_or_else(|_| {
                    warn!("STRIPE_WEBHOOK_SECRET not set, using empty value");
                    String::new()
                }),
            stripe_api_base_url: env::var("STRIPE_API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("STRIPE_API_BASE_URL not set, using default");
                    "https://api.stripe.com".to_string()
                }),
            qr_webhook_secret: env::var("QR_WEBHOOK_SECRET")
                .unwrap_or_else(|_| {
                    warn!("QR_WEBHOOK_SECRET not set, using empty value");
                    String::new()
                }),
            qr_bank_id: env::var("QR_BANK_ID")
                .unwrap_or_else(|_| {
                    warn!("QR_BANK_ID not set, using empty value");
                    String::new()
                }),
            qr_account_number: env::var("QR_ACCOUNT_NUMBER")
                .unwrap_or_else(|_| {
                    warn!("QR_ACCOUNT_NUMBER not set, using empty value");
                    String::new()
                }),
            qr_account_name: env::var("QR_ACCOUNT_NAME")
                .unwrap_or_else(|_| {
                    warn!("QR_ACCOUNT_NAME not set, using empty value");
                    String::new()
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_stripe_configured(&self) -> bool {
        !self.stripe_secret_key.is_empty() && !self.stripe_webhook_secret.is_empty()
    }

    pub fn is_qr_configured(&self) -> bool {
        !self.qr_bank_id.is_empty()
            && !self.qr_account_number.is_empty()
            && !self.qr_account_name.is_empty()
    }
}
