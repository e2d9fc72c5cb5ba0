mod backlight;
mod cli;
mod config;
mod cooldown;
mod frame;
mod gestures;
mod landmarks;
mod logging;
mod luminance;
mod overlay;
mod session;
mod trend;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
