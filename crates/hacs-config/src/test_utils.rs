use std::env;

/// Runs `f` with the given variables set (`Some`) or cleared (`None`), restoring the previous
/// environment afterwards. Callers must be `#[serial]`.
pub fn with_env<F>(vars: &[(&str, Option<&str>)], f: F)
where
    F: FnOnce(),
{
    let saved: Vec<_> = vars
        .iter()
        .map(|(key, _)| (key.to_string(), env::var(key).ok()))
        .collect();

    for (key, value) in vars {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    f();

    for (key, value) in saved {
        match value {
            Some(value) => env::set_var(&key, value),
            None => env::remove_var(&key),
        }
    }
}
