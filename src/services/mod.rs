pub mod cart_service;
pub mod media_service;
pub mod order_service;
pub mod prompt_parser;
pub mod report_builder;
pub mod report_export;
pub mod stripe_service;
