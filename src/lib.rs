pub mod api_server;
pub mod app_index;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod file_search;
pub mod folders;
pub mod interpreter;
pub mod llm_gateway;
pub mod media;
pub mod os_actions;
pub mod screen;
pub mod session;
pub mod url_normalizer;
pub mod voice;
