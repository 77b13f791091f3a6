//! Translation pipeline for a multi-language Telegram storefront bot.
//!
//! English templates are translated into the enabled languages through a
//! tiered lookup (prebuilt store, runtime cache, distributed cache, fallback
//! dictionary, translation backend, source text). The builder precomputes
//! translations to disk; the admin API manages languages and builds.

pub mod backend;
pub mod builder;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod i18n;
pub mod markdown;
pub mod prebuilt;
pub mod resolver;
pub mod retry;
pub mod scheduler;
pub mod security;
pub mod server;
pub mod service;
pub mod state;
