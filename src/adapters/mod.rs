//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                 |
//! |----------------|--------------------|-----------------------------|
//! | `instrument`   | TemperaturePort    | VX controller over Modbus   |
//! |                | HeaterPort         |                             |
//! | `sim`          | TemperaturePort    | FOPDT digital twin          |
//! |                | HeaterPort         |                             |
//! | `log_sink`     | EventSink          | `log` facade                |
//! | `time`         | Clock              | Host monotonic / virtual    |
//! | `config_store` | ConfigPort         | TOML file                   |
//!
//! The CSV recorder (`crate::recorder`) is a second `EventSink`.

pub mod config_store;
pub mod instrument;
pub mod log_sink;
pub mod sim;
pub mod time;
