pub mod entities;
pub mod errors;
pub mod repositories;
pub mod route_codes;
