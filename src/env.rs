use std::{cell::RefCell, ffi::OsStr};

/// Cycle budget for `run` when neither `--cycles` nor `HACKCHAIN_CYCLES` is given.
pub const DEFAULT_CYCLES: u64 = 10_000_000;

#[derive(Clone, Copy)]
struct Env {
    annotate: bool,
    cycles: u64,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        annotate: var_is("HACKCHAIN_ANNOTATE", "1"),
        cycles: std::env::var("HACKCHAIN_CYCLES")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_CYCLES),
    };
    set_env(value);
}

/// Whether translated assembly should carry the source command as a comment.
pub fn is_annotate_enabled() -> bool {
    with_env(|env| env.annotate)
}

pub fn cycle_budget() -> u64 {
    with_env(|env| env.cycles)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| &v == value.as_ref())
}
