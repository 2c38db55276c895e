pub mod dto;
pub mod server_metadata;
pub mod use_cases;
