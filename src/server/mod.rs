pub mod app;
mod routes;

pub use routes::ApiError;
