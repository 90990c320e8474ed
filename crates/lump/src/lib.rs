//! Command line front end for [`lump_archive`].

pub mod classify;
pub mod commands;
