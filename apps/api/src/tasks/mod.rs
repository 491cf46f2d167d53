pub mod handlers;
pub mod launcher;
pub mod reporter;
pub mod stages;
