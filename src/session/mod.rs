//! Interactive session management module
//!
//! This module provides the core components for managing the terminal session:
//! the session event queue, command routing, the active selection, and the
//! session manager that owns the candle windows.

pub mod action_channel;
pub mod command_router;
pub mod selection;
pub mod session_manager;

pub use action_channel::{ActionChannel, SessionEvent};
pub use command_router::{CommandRouter, InteractiveCommand};
pub use selection::ActiveSelection;
pub use session_manager::{SessionManager, SessionState, SessionStats};
