//! gpuwatchd - GPU occupancy monitor and Telegram bot
//!
//! This crate provides the daemon side of gpuwatch:
//! - `device` - Device query adapter (NVML) and an in-memory stand-in
//! - `poller` - Periodic occupancy polling and change broadcasts
//! - `reservation` - Reservation actor holding device memory blocks
//! - `router` - Chat command dispatch and whitelist checks
//! - `broadcast` - Fan-out of one message to every subscriber
//! - `transport` - Messenger trait and the Telegram Bot API client
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       gpuwatchd                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ TelegramTransport│───▶│     CommandRouter           │   │
//! │  │ (getUpdates)    │     │  (whitelist, validation)    │   │
//! │  └─────────────────┘     └──────┬───────────┬──────────┘   │
//! │                                 │           │               │
//! │                    occ / rel    │           │ set_interval  │
//! │                                 ▼           ▼               │
//! │  ┌─────────────────┐     ┌────────────┐ ┌──────────────┐   │
//! │  │ReservationActor │     │ DeviceQuery│ │IntervalHandle│   │
//! │  │ (block owner)   │     │  (NVML)    │ │   (watch)    │   │
//! │  └─────────────────┘     └─────▲──────┘ └──────┬───────┘   │
//! │                                │               │            │
//! │                          ┌─────┴───────────────▼──────┐     │
//! │                          │          Poller            │     │
//! │                          │  diff → Broadcaster        │     │
//! │                          └────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod device;
pub mod interval;
pub mod poller;
pub mod reservation;
pub mod router;
pub mod transport;
