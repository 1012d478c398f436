// libs/payment-cell/src/services/vietqr.rs
use uuid::Uuid;

/// Builds the VietQR image URL a customer scans with their banking app.
/// The transfer note carries the appointment id so the bank statement can be
/// matched back by hand when the webhook is missing.
pub fn build_payment_url(
    bank_id: &str,
    account_number: &str,
    account_name: &str,
    amount: i64,
    appointment_id: Uuid,
) -> String {
    let add_info = format!("Thanh toan lich hen {}", appointment_id);

    format!(
        "https://img.vietqr.io/image/{}-{}-compact2.png?amount={}&addInfo={}&accountName={}",
        bank_id,
        account_number,
        amount,
        urlencoding::encode(&add_info),
        urlencoding::encode(account_name),
    )
}
