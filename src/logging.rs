use env_logger::{Builder, Env};

/// Filter variable, e.g. `BRIGHTCTL_LOG=debug`.
pub const LOG_ENV: &str = "BRIGHTCTL_LOG";

pub fn init() {
    let env = Env::default().filter_or(LOG_ENV, "info");
    let _ = Builder::from_env(env).format_timestamp_millis().try_init();
}
