//! Input handling module
//!
//! Raw input state tracking and a pan/zoom camera controller.

mod pan_zoom;
mod state;

pub use pan_zoom::PanZoomController;
pub use state::Input;
