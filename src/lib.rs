//! Cubelink links a Timeular tracking cube — a Bluetooth Low Energy
//! peripheral that reports which of its eight faces points up — to a Hackaru
//! time-tracking server. Rotating the cube to a face configured in the
//! mapping starts the linked activity; rotating it away, flat, or to an
//! unmapped face stops whatever is running.
//!
//! The daemon (`cubelinkd`) owns a single BLE connection and a single HTTP
//! session. Orientation notifications flow through the [`router`], which
//! decides stop/start, and the [`tracker`] client, which owns the current
//! activity record and talks to the server.

pub mod config;
pub mod cube;
pub mod retry;
pub mod router;
pub mod session;
pub mod tracker;
