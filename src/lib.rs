//! gardisto: authentication and abuse prevention.
//!
//! The crate is split into the auth core (`auth`), the declarative input
//! validator (`validation`), the HTTP surface (`api`), and the CLI/bootstrap
//! layer (`cli`). See `DESIGN.md` for the component map.

pub mod api;
pub mod auth;
pub mod cli;
pub mod validation;
