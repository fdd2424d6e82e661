//! Configuration Functions
//!
//! The transformer can be configured at runtime using environment variables or
//! by using functions in this module. Options set by calling functions in this
//! module override options set in environment variables, and thread-local
//! options override process-wide ones.
//!
//! ```
//! use geoloc::config::*;
//!
//! // Use the quadtree inverse method for transformers created from now on
//! set_config_option("GDAL_GEOLOC_INVERSE_METHOD", "QUADTREE").unwrap();
//!
//! assert_eq!(get_config_option("GDAL_GEOLOC_INVERSE_METHOD", ""), "QUADTREE");
//!
//! // Back to the default
//! clear_config_option("GDAL_GEOLOC_INVERSE_METHOD").unwrap();
//!
//! assert_eq!(get_config_option("GDAL_GEOLOC_INVERSE_METHOD", "BACKMAP"), "BACKMAP");
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use once_cell::sync::Lazy;

use crate::errors::{CplErrType, GeolocError, Result};

/// Error number used for generic failures reported to the error handler.
pub const CPLE_APP_DEFINED: i32 = 1;
/// Error number used for illegal arguments reported to the error handler.
pub const CPLE_ILLEGAL_ARG: i32 = 5;

static GLOBAL_OPTIONS: Lazy<RwLock<HashMap<String, String>>> = Lazy::new(Default::default);

thread_local! {
    static THREAD_OPTIONS: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

fn normalize_key(key: &str) -> Result<String> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(GeolocError::BadArgument(format!(
            "Invalid characters in config key: '{key}'"
        )));
    }
    Ok(key.to_ascii_uppercase())
}

fn check_value(value: &str) -> Result<()> {
    if value.contains(['\0', '\n', '\r']) {
        return Err(GeolocError::BadArgument(format!(
            "Invalid characters in config value: '{}'",
            value.escape_debug()
        )));
    }
    Ok(())
}

/// Set a configuration option.
pub fn set_config_option(key: &str, value: &str) -> Result<()> {
    let key = normalize_key(key)?;
    check_value(value)?;
    let mut options = match GLOBAL_OPTIONS.write() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    };
    options.insert(key, value.to_string());
    Ok(())
}

/// Get the value of a configuration option.
///
/// Looks at thread-local options first, then process-wide options, then the
/// environment. If the option specified by `key` is not found anywhere, the
/// value passed in the `default` parameter is returned.
pub fn get_config_option(key: &str, default: &str) -> String {
    let Ok(key) = normalize_key(key) else {
        return default.to_string();
    };
    if let Some(value) = THREAD_OPTIONS.with(|options| options.borrow().get(&key).cloned()) {
        return value;
    }
    let global = {
        let options = match GLOBAL_OPTIONS.read() {
            Ok(guard) => guard,
            Err(poison_error) => poison_error.into_inner(),
        };
        options.get(&key).cloned()
    };
    global
        .or_else(|| std::env::var(&key).ok())
        .unwrap_or_else(|| default.to_string())
}

/// Clear the value of a configuration option.
pub fn clear_config_option(key: &str) -> Result<()> {
    let key = normalize_key(key)?;
    let mut options = match GLOBAL_OPTIONS.write() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    };
    options.remove(&key);
    Ok(())
}

/// Set a configuration option with **thread local** scope.
pub fn set_thread_local_config_option(key: &str, value: &str) -> Result<()> {
    let key = normalize_key(key)?;
    check_value(value)?;
    THREAD_OPTIONS.with(|options| options.borrow_mut().insert(key, value.to_string()));
    Ok(())
}

/// Get the value of a configuration option with **thread local** scope.
///
/// If the option specified by `key` is not found, the value passed in the `default` parameter is returned.
pub fn get_thread_local_config_option(key: &str, default: &str) -> String {
    normalize_key(key)
        .ok()
        .and_then(|key| THREAD_OPTIONS.with(|options| options.borrow().get(&key).cloned()))
        .unwrap_or_else(|| default.to_string())
}

/// Clear the value of a configuration option with **thread local** scope.
pub fn clear_thread_local_config_option(key: &str) -> Result<()> {
    let key = normalize_key(key)?;
    THREAD_OPTIONS.with(|options| options.borrow_mut().remove(&key));
    Ok(())
}

/// Interpret a configuration value as a boolean.
///
/// `YES`, `TRUE`, `ON` and `1` (any case) are true, everything else is false.
pub fn test_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "YES" | "TRUE" | "ON" | "1"
    )
}

type ErrorCallbackType = dyn FnMut(CplErrType, i32, &str) + 'static + Send + Sync;

/// Static variable that holds the current error callback function
static ERROR_CALLBACK: Lazy<Mutex<Option<Box<ErrorCallbackType>>>> = Lazy::new(Default::default);

/// Set a custom error handler.
///
/// The handler receives the messages of failures that are otherwise only
/// returned as `Err` or `None` values, e.g. a transformer that could not be
/// constructed from its GEOLOCATION metadata.
///
/// The function must be `Send` and `Sync` since it is potentially called from multiple threads.
pub fn set_error_handler<F>(callback: F)
where
    F: FnMut(CplErrType, i32, &str) + 'static + Send + Sync,
{
    let mut callback_lock = match ERROR_CALLBACK.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    };
    callback_lock.replace(Box::new(callback));
}

/// Remove a custom error handler.
pub fn remove_error_handler() {
    let mut callback_lock = match ERROR_CALLBACK.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    };
    callback_lock.take();
}

/// Deliver a message to the installed error handler, and to the log.
pub(crate) fn report_error(class: CplErrType, number: i32, msg: &str) {
    match class {
        CplErrType::Failure | CplErrType::Fatal => tracing::error!(number, "{msg}"),
        CplErrType::Warning => tracing::warn!(number, "{msg}"),
        _ => tracing::debug!(number, "{msg}"),
    }
    let mut callback_lock = match ERROR_CALLBACK.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    };
    if let Some(callback) = callback_lock.as_mut() {
        callback(class, number, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_options() {
        // Global options are shared by all tests, so only keys private to this test are touched.

        test_set_get_option();

        test_set_option_with_invalid_chars();

        test_clear_option();

        test_set_get_option_thread_local();

        test_clear_option_thread_local();
    }

    fn test_set_get_option() {
        assert!(set_config_option("GEOLOC_TEST_CACHEMAX", "128").is_ok());
        assert_eq!(get_config_option("GEOLOC_TEST_CACHEMAX", ""), "128");
        // keys are case insensitive
        assert_eq!(get_config_option("geoloc_test_cachemax", ""), "128");
        assert_eq!(
            get_config_option("NON_EXISTANT_OPTION", "DEFAULT_VALUE"),
            "DEFAULT_VALUE"
        );
    }

    fn test_set_option_with_invalid_chars() {
        assert!(set_config_option("f\0oo", "valid").is_err());
        assert!(set_config_option("foo", "in\0valid").is_err());
        assert!(set_config_option("foo=bar", "valid").is_err());
        assert!(set_config_option("foo", "multi\nline").is_err());
        assert!(set_config_option("", "valid").is_err());
    }

    fn test_clear_option() {
        assert!(set_config_option("GEOLOC_TEST_OPTION", "256").is_ok());
        assert_eq!(get_config_option("GEOLOC_TEST_OPTION", "DEFAULT"), "256");
        assert!(clear_config_option("GEOLOC_TEST_OPTION").is_ok());
        assert_eq!(get_config_option("GEOLOC_TEST_OPTION", "DEFAULT"), "DEFAULT");
    }

    fn test_set_get_option_thread_local() {
        assert!(set_thread_local_config_option("GEOLOC_TEST_CACHEMAX", "64").is_ok());
        assert_eq!(
            get_thread_local_config_option("GEOLOC_TEST_CACHEMAX", ""),
            "64"
        );
        // thread local value overrides the global one
        assert_eq!(get_config_option("GEOLOC_TEST_CACHEMAX", ""), "64");

        let other_thread = std::thread::spawn(|| get_config_option("GEOLOC_TEST_CACHEMAX", ""))
            .join()
            .unwrap();
        assert_eq!(other_thread, "128");
    }

    fn test_clear_option_thread_local() {
        assert!(clear_thread_local_config_option("GEOLOC_TEST_CACHEMAX").is_ok());
        assert_eq!(
            get_thread_local_config_option("GEOLOC_TEST_CACHEMAX", "DEFAULT"),
            "DEFAULT"
        );
        assert_eq!(get_config_option("GEOLOC_TEST_CACHEMAX", ""), "128");
        assert!(clear_config_option("GEOLOC_TEST_CACHEMAX").is_ok());
    }

    #[test]
    fn test_bool_values() {
        assert!(test_bool("YES"));
        assert!(test_bool("on"));
        assert!(test_bool("1"));
        assert!(test_bool("True"));
        assert!(!test_bool("NO"));
        assert!(!test_bool(""));
        assert!(!test_bool("2"));
    }
}
