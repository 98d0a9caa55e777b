//! Вспомогательные модули

pub mod logger;
pub mod temp;
pub mod text;
