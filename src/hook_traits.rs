//! Typed hook invocations.
//!
//! Each collaborator operation has a struct implementing [`HookArgs`]. The
//! struct is the whole contract with the hook command: which operation name it
//! receives, which flags, which environment variables and what is written to
//! its stdin.
//!
//! Credentials always travel in the environment so they never show up in
//! process listings.

/// One hook command invocation.
///
/// # Contract
///
/// - `operation()` is the first argument after the configured prefix args
/// - `to_cli_args()` follow it verbatim
/// - `get_env_vars()` are added to the hook's environment
/// - `stdin()`, when present, is written to the hook and stdin is closed
pub trait HookArgs {
    fn operation(&self) -> &'static str;

    fn to_cli_args(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn stdin(&self) -> Option<String> {
        None
    }
}

/// `["--name", "value"]`
pub(crate) fn flag(name: &str, value: impl ToString) -> [String; 2] {
    [format!("--{}", name), value.to_string()]
}
