pub mod crud;
pub mod supabase;

pub use crud::{CrudRepository, Entity, Filters};
pub use supabase::{DbError, SupabaseClient};
