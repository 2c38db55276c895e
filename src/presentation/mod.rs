pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
