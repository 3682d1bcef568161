//! Domain services used by the websocket route.
//!
//! Service modules own session bookkeeping so the route handler stays
//! focused on transport and framing.

pub mod session;
