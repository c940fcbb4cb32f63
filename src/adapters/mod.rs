//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter     | Implements / drives      | Connects to               |
//! |-------------|--------------------------|---------------------------|
//! | `gpio_path` | `PowerPath` selection    | Four enable GPIOs         |
//! | `log_sink`  | EventSink                | `log` facade              |

pub mod gpio_path;
pub mod log_sink;
