pub mod handlers;
pub mod handover;
pub mod middleware;
pub mod pkce;
pub mod routes;
pub mod session;
pub mod supabase;
