//! gpuwatchd - GPU occupancy monitor and Telegram bot
//!
//! See `gpuwatchd --help` and the `gpuwatchd::cli` module for usage.

fn main() -> anyhow::Result<()> {
    gpuwatchd::cli::run()
}
