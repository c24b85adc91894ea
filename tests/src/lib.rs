//! End-to-end tests: real schedulers driving `sh` with `echo`, `printf` and
//! `sleep` plugins from inline catalogs.

pub mod support;

#[cfg(test)]
mod scheduling;
