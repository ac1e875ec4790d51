//! Augments LCSC part listings with JLCPCB stock and pricing.
//!
//! The crate is built around three pieces:
//! - [`cache`]: a persistent store and a time-boxed cache over it
//! - [`parts`]: single-flight part lookups and exchange-rate resolution
//! - [`render`]: a mutation-driven state machine that injects the extra
//!   columns through the [`render::Page`] accessor trait
//!
//! [`service::PartsService`] ties the lookups to one store and transport and
//! is handed to the render driver explicitly.

pub mod cache;
pub mod config;
pub mod logging;
pub mod parts;
pub mod price;
pub mod render;
pub mod service;

pub use config::Config;
pub use service::PartsService;
