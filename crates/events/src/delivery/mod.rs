//! External delivery channels for notifications.

pub mod webhook;
