pub mod supabase;

pub use supabase::{ApiRejection, SupabaseClient};
