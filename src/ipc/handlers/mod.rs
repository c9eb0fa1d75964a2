pub mod classes;
pub mod core;
pub mod sessions;
pub mod setup;
pub mod watch;
