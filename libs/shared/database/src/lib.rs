pub mod supabase;

pub use supabase::{DbConflict, SupabaseClient};
