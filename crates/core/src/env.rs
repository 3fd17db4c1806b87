//! Typed reads of configuration variables.
//!
//! Values come from a lookup function rather than the process environment
//! directly, so callers can pass `std::env::var(..).ok()` in production and
//! a map in tests.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::CoreError;

/// A source of configuration values keyed by variable name.
pub trait EnvLookup {
    fn get(&self, name: &str) -> Option<String>;
}

impl<F> EnvLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Lookup backed by the process environment.
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Read a variable, treating blank values as unset.
pub fn optional(env: &impl EnvLookup, name: &str) -> Option<String> {
    env.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a required variable.
pub fn required(env: &impl EnvLookup, name: &str) -> Result<String, CoreError> {
    optional(env, name).ok_or_else(|| CoreError::Validation(format!("{name} must be set")))
}

/// Read and parse a variable, falling back to `default` when unset.
pub fn parse_or<T>(env: &impl EnvLookup, name: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(env, name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| CoreError::Validation(format!("{name}={raw:?} is invalid: {e}"))),
    }
}
