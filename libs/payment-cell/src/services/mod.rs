// libs/payment-cell/src/services/mod.rs
pub mod checkout;
pub mod reconcile;
pub mod stripe;
pub mod vietqr;

pub use checkout::CheckoutService;
pub use reconcile::ReconcileService;
pub use stripe::StripeClient;
